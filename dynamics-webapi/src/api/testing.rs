//! Scripted transport for client and operation tests

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::config::ClientConfig;
use super::error::{Result, WebApiError};
use super::headers::Headers;
use super::transport::{Transport, TransportRequest, TransportResponse};

/// Replays queued responses in order and records every request it receives
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<TransportResponse>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        init_logging();
        Arc::new(Self::default())
    }

    pub fn push(&self, response: TransportResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Body of the `index`-th request as text
    pub fn body(&self, index: usize) -> String {
        let requests = self.requests.lock().unwrap();
        String::from_utf8(requests[index].body.clone().unwrap_or_default()).unwrap()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| WebApiError::Network("no scripted response left".to_string()))
    }
}

/// Route `log` output through the test harness; `RUST_LOG=debug` shows it
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn test_config() -> ClientConfig {
    ClientConfig::builder("https://org.crm.dynamics.com").build()
}

pub fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        206 => "Partial Content",
        400 => "Bad Request",
        404 => "Not Found",
        412 => "Precondition Failed",
        _ => "",
    }
}

pub fn response(status: u16, headers: &[(&str, &str)], body: &[u8]) -> TransportResponse {
    TransportResponse {
        status,
        status_text: reason(status).to_string(),
        headers: headers.iter().map(|(name, value)| (*name, *value)).collect(),
        body: body.to_vec(),
    }
}

pub fn json_response(status: u16, body: Value) -> TransportResponse {
    response(
        status,
        &[("Content-Type", "application/json; odata.metadata=minimal")],
        body.to_string().as_bytes(),
    )
}

pub fn empty_response(status: u16, headers: &[(&str, &str)]) -> TransportResponse {
    response(status, headers, b"")
}

/// Multipart batch response with one part per `(status line, JSON body)`
pub fn batch_response(parts: &[(&str, Option<Value>)]) -> TransportResponse {
    let boundary = "batchresponse_00000000-0000-0000-0000-000000000000";
    let mut body = String::new();

    for (status, json) in parts {
        body.push_str(&format!("--{}\r\n", boundary));
        body.push_str("Content-Type: application/http\r\nContent-Transfer-Encoding: binary\r\n\r\n");
        body.push_str(&format!("HTTP/1.1 {}\r\n", status));
        match json {
            Some(json) => {
                body.push_str("Content-Type: application/json; odata.metadata=minimal\r\nOData-Version: 4.0\r\n\r\n");
                body.push_str(&json.to_string());
                body.push_str("\r\n");
            }
            None => body.push_str("OData-Version: 4.0\r\n\r\n\r\n"),
        }
    }
    body.push_str(&format!("--{}--\r\n", boundary));

    let mut headers = Headers::new();
    headers.insert("Content-Type", format!("multipart/mixed; boundary={}", boundary));

    TransportResponse {
        status: 200,
        status_text: "OK".to_string(),
        headers,
        body: body.into_bytes(),
    }
}
