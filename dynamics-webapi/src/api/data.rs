//! Request payload serialization
//!
//! Records are serialized with three rewrites applied:
//! - `@odata.bind` / `@odata.id` references are normalized (braces removed from
//!   GUIDs, entity names mapped to collection names, base URL handling);
//! - helper fields added by the response parser (`oData*`, `*_Formatted`,
//!   `*_NavigationProperty`, `*_LogicalName`) are dropped, so a retrieved
//!   record can be modified and sent back as-is;
//! - every character outside printable ASCII is written as `\uXXXX`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::config::ClientConfig;
use super::request::RequestData;
use super::utility::remove_leading_slash;

const BIND_SUFFIX: &str = "@odata.bind";
const ID_SUFFIX: &str = "@odata.id";

/// Prefix and suffixes of fields injected by the response parser
const HELPER_FIELD_PREFIX: &str = "oData";
const HELPER_FIELD_SUFFIXES: &[&str] = &["_Formatted", "_NavigationProperty", "_LogicalName"];

static BRACED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.+)\(\{([\w-]+)\}\)").expect("valid braced key regex"));

static TRAILING_ENTITY_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)(\([\w-]+\))$").expect("valid entity reference regex"));

/// Serialized payload ready for the wire
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Text(text) => text.into_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    /// Text form used inside batch bodies; binary payloads are decoded lossily
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Payload::Text(text) => std::borrow::Cow::Borrowed(text),
            Payload::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }
}

/// Serialize a request payload
///
/// `entity_sets` maps entity logical names to collection names and is only
/// consulted when `config.use_entity_names` is set.
pub fn process_data(
    data: &RequestData,
    config: &ClientConfig,
    entity_sets: Option<&HashMap<String, String>>,
) -> Payload {
    match data {
        RequestData::Binary(bytes) => Payload::Binary(bytes.clone()),
        RequestData::Json(value) => {
            let context = ProcessContext {
                api_url: config.data_api_url(),
                entity_sets: if config.use_entity_names { entity_sets } else { None },
            };
            let processed = context.process_value(value);
            Payload::Text(escape_non_ascii(&processed.to_string()))
        }
    }
}

struct ProcessContext<'a> {
    api_url: String,
    entity_sets: Option<&'a HashMap<String, String>>,
}

impl ProcessContext<'_> {
    fn process_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(obj) => Value::Object(self.process_object(obj)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.process_value(v)).collect()),
            other => other.clone(),
        }
    }

    fn process_object(&self, obj: &Map<String, Value>) -> Map<String, Value> {
        let mut result = Map::with_capacity(obj.len());

        for (key, value) in obj {
            if is_helper_field(key) {
                continue;
            }

            let value = match value {
                Value::String(reference)
                    if (key.ends_with(BIND_SUFFIX) || key.ends_with(ID_SUFFIX))
                        && !reference.starts_with('$') =>
                {
                    Value::String(self.normalize_reference(key, reference))
                }
                other => self.process_value(other),
            };

            result.insert(key.clone(), value);
        }

        result
    }

    fn normalize_reference(&self, key: &str, reference: &str) -> String {
        let mut value = BRACED_KEY.replace_all(reference, "$1($2)").into_owned();

        if let Some(entity_sets) = self.entity_sets {
            if let Some(caps) = TRAILING_ENTITY_REFERENCE.captures(&value) {
                if let Some(collection) = entity_sets.get(&caps[1]) {
                    let replacement = format!("{}{}", collection, &caps[2]);
                    value = TRAILING_ENTITY_REFERENCE
                        .replace(&value, replacement.as_str())
                        .into_owned();
                }
            }
        }

        if value.starts_with(&self.api_url) {
            return value;
        }

        if key.ends_with(BIND_SUFFIX) {
            if value.starts_with('/') {
                value
            } else {
                format!("/{}", value)
            }
        } else {
            format!("{}{}", self.api_url, remove_leading_slash(&value))
        }
    }
}

fn is_helper_field(key: &str) -> bool {
    key.starts_with(HELPER_FIELD_PREFIX)
        || HELPER_FIELD_SUFFIXES.iter().any(|suffix| key.ends_with(suffix))
}

/// Escape every UTF-16 code unit at or above U+007F as `\uXXXX`
pub fn escape_non_ascii(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if (ch as u32) < 0x7F {
            escaped.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ClientConfig {
        ClientConfig::builder("https://org.crm.dynamics.com").build()
    }

    fn text(payload: Payload) -> String {
        match payload {
            Payload::Text(text) => text,
            Payload::Binary(_) => panic!("expected text payload"),
        }
    }

    #[test]
    fn test_bind_reference_gets_leading_slash_and_no_braces() {
        let data = RequestData::Json(json!({
            "name": "Contoso",
            "primarycontactid@odata.bind": "contacts({00000000-0000-0000-0000-000000000001})"
        }));

        let body = text(process_data(&data, &config(), None));
        assert_eq!(
            body,
            r#"{"name":"Contoso","primarycontactid@odata.bind":"/contacts(00000000-0000-0000-0000-000000000001)"}"#
        );
    }

    #[test]
    fn test_odata_id_becomes_absolute() {
        let data = RequestData::Json(json!({"@odata.id": "/contacts(00000000-0000-0000-0000-000000000001)"}));
        let body = text(process_data(&data, &config(), None));
        assert_eq!(
            body,
            r#"{"@odata.id":"https://org.crm.dynamics.com/api/data/v9.2/contacts(00000000-0000-0000-0000-000000000001)"}"#
        );
    }

    #[test]
    fn test_absolute_and_content_id_references_untouched() {
        let data = RequestData::Json(json!({
            "a@odata.bind": "https://org.crm.dynamics.com/api/data/v9.2/accounts(00000000-0000-0000-0000-000000000001)",
            "b@odata.bind": "$1"
        }));
        let body: Value = serde_json::from_str(&text(process_data(&data, &config(), None))).unwrap();
        assert_eq!(
            body["a@odata.bind"],
            "https://org.crm.dynamics.com/api/data/v9.2/accounts(00000000-0000-0000-0000-000000000001)"
        );
        assert_eq!(body["b@odata.bind"], "$1");
    }

    #[test]
    fn test_entity_names_mapped_to_collections() {
        let config = ClientConfig::builder("https://org.crm.dynamics.com")
            .use_entity_names(true)
            .build();
        let mut sets = HashMap::new();
        sets.insert("contact".to_string(), "contacts".to_string());

        let data = RequestData::Json(json!({
            "primarycontactid@odata.bind": "contact(00000000-0000-0000-0000-000000000001)",
            "ownerid@odata.bind": "systemuser(00000000-0000-0000-0000-000000000002)"
        }));
        let body: Value = serde_json::from_str(&text(process_data(&data, &config, Some(&sets)))).unwrap();

        assert_eq!(body["primarycontactid@odata.bind"], "/contacts(00000000-0000-0000-0000-000000000001)");
        // no mapping cached: the original name is kept
        assert_eq!(body["ownerid@odata.bind"], "/systemuser(00000000-0000-0000-0000-000000000002)");
    }

    #[test]
    fn test_helper_fields_dropped_at_every_depth() {
        let data = RequestData::Json(json!({
            "oDataContext": "https://org/$metadata#accounts/$entity",
            "name": "Contoso",
            "statecode": 0,
            "statecode_Formatted": "Active",
            "_ownerid_value_NavigationProperty": "ownerid",
            "_ownerid_value_LogicalName": "systemuser",
            "contact_customer_accounts": [{"fullname": "A", "fullname_Formatted": "A"}]
        }));

        let body = text(process_data(&data, &config(), None));
        assert_eq!(
            body,
            r#"{"name":"Contoso","statecode":0,"contact_customer_accounts":[{"fullname":"A"}]}"#
        );
    }

    #[test]
    fn test_non_ascii_escaped() {
        let data = RequestData::Json(json!({"name": "Café ✓ 😀"}));
        let body = text(process_data(&data, &config(), None));
        assert_eq!(body, r#"{"name":"Caf\u00e9 \u2713 \ud83d\ude00"}"#);

        let decoded: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(decoded["name"], "Café ✓ 😀");
    }

    #[test]
    fn test_binary_passthrough() {
        let data = RequestData::Binary(vec![0, 159, 146, 150]);
        assert_eq!(
            process_data(&data, &config(), None),
            Payload::Binary(vec![0, 159, 146, 150])
        );
    }
}
