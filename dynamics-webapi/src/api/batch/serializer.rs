//! `multipart/mixed` batch body serialization
//!
//! Consecutive non-GET requests share a changeset (an atomic unit on the
//! server); GET requests always sit directly under the batch boundary. Parts
//! inside a changeset carry a `Content-ID`, numbered from 100001 within each
//! changeset unless the request brings its own.

use log::debug;
use reqwest::Method;
use std::collections::HashMap;

use crate::api::config::ClientConfig;
use crate::api::constants::{
    BATCH_BOUNDARY_PREFIX, CHANGESET_BOUNDARY_PREFIX, CONTENT_ID_SEED, content_types, headers as names,
};
use crate::api::data::process_data;
use crate::api::headers::Headers;
use crate::api::request::{ComposedRequest, set_standard_headers};
use crate::api::utility::generate_uuid;

/// Batch-level options
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// `Some(false)` keeps every request out of changesets
    pub in_change_set: Option<bool>,
    /// Headers for the outer `$batch` request
    pub headers: Headers,
}

/// Serialized batch: outer headers plus the multipart body
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEnvelope {
    pub boundary: String,
    pub headers: Headers,
    pub body: String,
}

/// Serialize composed requests into one batch body
pub fn convert_to_batch(
    requests: &[ComposedRequest],
    config: &ClientConfig,
    options: Option<&BatchOptions>,
    entity_sets: Option<&HashMap<String, String>>,
) -> BatchEnvelope {
    let boundary = format!("{}{}", BATCH_BOUNDARY_PREFIX, generate_uuid());
    let api_url = config.data_api_url();
    let changesets_allowed = options.and_then(|o| o.in_change_set) != Some(false);

    let mut lines: Vec<String> = Vec::new();
    let mut change_set: Option<String> = None;
    let mut content_id = CONTENT_ID_SEED;

    for request in requests {
        let in_change_set = changesets_allowed && request.in_change_set && request.method != Method::GET;

        if !in_change_set {
            if let Some(closed) = change_set.take() {
                lines.push(format!("\n--{}--", closed));
                content_id = CONTENT_ID_SEED;
            }
        }

        if change_set.is_none() {
            lines.push(format!("\n--{}", boundary));

            if in_change_set {
                let opened = format!("{}{}", CHANGESET_BOUNDARY_PREFIX, generate_uuid());
                lines.push(format!("{}: multipart/mixed;boundary={}", names::CONTENT_TYPE, opened));
                change_set = Some(opened);
            }
        }

        if let Some(current) = &change_set {
            lines.push(format!("\n--{}", current));
        }

        lines.push(format!("{}: {}", names::CONTENT_TYPE, content_types::HTTP));
        lines.push("Content-Transfer-Encoding: binary".to_string());

        if change_set.is_some() {
            let id = match request.headers.get(names::CONTENT_ID) {
                Some(id) => id.to_string(),
                None => {
                    content_id += 1;
                    content_id.to_string()
                }
            };
            lines.push(format!("{}: {}", names::CONTENT_ID, id));
        }

        let target = if request.path.starts_with('$') {
            request.path.clone()
        } else {
            format!("{}{}", api_url, request.path)
        };
        lines.push(format!("\n{} {} HTTP/1.1", request.method, target));

        if request.method == Method::GET {
            lines.push(format!("{}: {}", names::ACCEPT, content_types::JSON));
        } else {
            lines.push(format!("{}: {}", names::CONTENT_TYPE, content_types::JSON));
        }

        for (name, value) in request.headers.iter() {
            if name.eq_ignore_ascii_case(names::AUTHORIZATION) || name.eq_ignore_ascii_case(names::CONTENT_ID) {
                continue;
            }
            lines.push(format!("{}: {}", name, value));
        }

        if let Some(data) = &request.data {
            lines.push(format!("\n{}", process_data(data, config, entity_sets).as_text()));
        }
    }

    if let Some(current) = change_set {
        lines.push(format!("\n--{}--", current));
    }
    lines.push(format!("\n--{}--", boundary));

    debug!("Serialized {} request(s) into batch {}", requests.len(), boundary);

    let mut headers = options.map(|o| o.headers.clone()).unwrap_or_default();
    set_standard_headers(&mut headers);
    headers.insert(names::CONTENT_TYPE, format!("multipart/mixed;boundary={}", boundary));

    BatchEnvelope {
        boundary,
        headers,
        body: lines.join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::request::{RequestData, compose_request, WebApiRequest};
    use serde_json::json;

    fn config() -> ClientConfig {
        ClientConfig::builder("https://org.crm.dynamics.com").build()
    }

    fn compose(request: WebApiRequest) -> ComposedRequest {
        compose_request(&request, &config()).unwrap()
    }

    #[test]
    fn test_changesets_split_around_get() {
        let requests = vec![
            compose(WebApiRequest::new("accounts").method(Method::POST).data(json!({"name": "A"}))),
            compose(WebApiRequest::new("accounts").method(Method::POST).data(json!({"name": "B"}))),
            compose(WebApiRequest::new("accounts").select(&["name"])),
            compose(
                WebApiRequest::new("accounts")
                    .method(Method::DELETE)
                    .key("00000000-0000-0000-0000-000000000001"),
            ),
        ];

        let envelope = convert_to_batch(&requests, &config(), None, None);
        let body = &envelope.body;

        assert_eq!(body.matches("boundary=changeset_").count(), 2);
        assert_eq!(body.matches("Content-ID: 100001").count(), 2);
        assert_eq!(body.matches("Content-ID: 100002").count(), 1);
        assert!(body.ends_with(&format!("\n--{}--", envelope.boundary)));

        // the GET sits directly under the batch boundary without a Content-ID
        let get_line = "GET https://org.crm.dynamics.com/api/data/v9.2/accounts?$select=name HTTP/1.1";
        let get_index = body.find(get_line).unwrap();
        let part_start = body[..get_index].rfind("\n--").unwrap();
        let part_header = &body[part_start..get_index];
        assert!(part_header.contains(&envelope.boundary));
        assert!(!part_header.contains("Content-ID"));
        assert!(body[get_index..].starts_with(&format!("{}\nAccept: application/json", get_line)));
    }

    #[test]
    fn test_part_layout() {
        let mut request = compose(WebApiRequest::new("accounts").method(Method::POST).data(json!({"name": "Café"})));
        request.headers.insert("Authorization", "Bearer secret");

        let envelope = convert_to_batch(&[request], &config(), None, None);
        let lines: Vec<&str> = envelope.body.split('\n').collect();

        assert_eq!(lines[0], "");
        assert_eq!(lines[1], format!("--{}", envelope.boundary));
        assert!(lines[2].starts_with("Content-Type: multipart/mixed;boundary=changeset_"));
        assert!(lines[4].starts_with("--changeset_"));
        assert_eq!(lines[5], "Content-Type: application/http");
        assert_eq!(lines[6], "Content-Transfer-Encoding: binary");
        assert_eq!(lines[7], "Content-ID: 100001");
        assert_eq!(lines[9], "POST https://org.crm.dynamics.com/api/data/v9.2/accounts HTTP/1.1");
        assert_eq!(lines[10], "Content-Type: application/json");
        assert!(!envelope.body.contains("Authorization"));
        assert!(envelope.body.contains(r#"{"name":"Caf\u00e9"}"#));
    }

    #[test]
    fn test_explicit_content_id_and_reference_path() {
        let first = compose(
            WebApiRequest::new("accounts")
                .method(Method::POST)
                .content_id("1")
                .data(json!({"name": "A"})),
        );
        let second = compose(
            WebApiRequest::new("contacts")
                .method(Method::POST)
                .content_id("$1")
                .navigation_property("contact_customer_accounts")
                .data(json!({"firstname": "B"})),
        );
        let second = ComposedRequest {
            path: "$1/contact_customer_accounts".to_string(),
            ..second
        };

        let envelope = convert_to_batch(&[first, second], &config(), None, None);
        assert!(envelope.body.contains("Content-ID: 1\n"));
        assert!(envelope.body.contains("Content-ID: 100001"));
        assert!(envelope.body.contains("\nPOST $1/contact_customer_accounts HTTP/1.1"));
    }

    #[test]
    fn test_global_opt_out_of_changesets() {
        let requests = vec![
            compose(WebApiRequest::new("accounts").method(Method::POST).data(json!({}))),
            compose(WebApiRequest::new("accounts").method(Method::POST).data(json!({}))),
        ];
        let options = BatchOptions {
            in_change_set: Some(false),
            ..Default::default()
        };

        let envelope = convert_to_batch(&requests, &config(), Some(&options), None);
        assert!(!envelope.body.contains("changeset_"));
        assert!(!envelope.body.contains("Content-ID"));
    }

    #[test]
    fn test_outer_headers() {
        let options = BatchOptions {
            headers: [("Prefer", "odata.continue-on-error")].into_iter().collect(),
            ..Default::default()
        };
        let requests = vec![compose(WebApiRequest::new("accounts"))];

        let envelope = convert_to_batch(&requests, &config(), Some(&options), None);
        assert_eq!(envelope.headers.get("Prefer"), Some("odata.continue-on-error"));
        assert_eq!(
            envelope.headers.get("Content-Type"),
            Some(format!("multipart/mixed;boundary={}", envelope.boundary).as_str())
        );
        assert_eq!(envelope.headers.get("OData-Version"), Some("4.0"));
        assert!(envelope.boundary.starts_with("dwa_batch_"));
    }

    #[test]
    fn test_binary_data_in_part() {
        let mut request = compose(WebApiRequest::new("accounts").method(Method::PATCH));
        request.data = Some(RequestData::Binary(b"raw".to_vec()));

        let envelope = convert_to_batch(&[request], &config(), None, None);
        assert!(envelope.body.contains("\nraw\n"));
    }
}
