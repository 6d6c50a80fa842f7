//! `multipart/mixed` batch response parsing
//!
//! Parts are matched to their requests by position. Changeset responses are
//! nested multiparts and are flattened in place.

use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::api::constants::{CHANGESET_RESPONSE_MARKER, content_types, headers};
use crate::api::context::ParseParams;
use crate::api::error::{Result, ServerError, WebApiError};
use crate::api::headers::Headers;
use crate::api::response::{parse_data, parse_scalar};
use crate::api::utility::extract_uuid_from_url;

static STATUS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^HTTP/?\s*[\d.]*\s+(\d{3})\s*(.*)$").expect("valid status line regex"));

/// Result of one batch part: the parsed value, or the server error it carried
pub type BatchItem = std::result::Result<Value, ServerError>;

/// Parse a batch response body into one item per part
pub fn parse_batch_response(body: &str, params: &[ParseParams]) -> Result<Vec<BatchItem>> {
    let mut parser = BatchResponseParser {
        params,
        request_number: 0,
        items: Vec::new(),
    };
    parser.parse_multipart(body)?;
    Ok(parser.items)
}

struct BatchResponseParser<'a> {
    params: &'a [ParseParams],
    request_number: usize,
    items: Vec<BatchItem>,
}

impl BatchResponseParser<'_> {
    fn parse_multipart(&mut self, body: &str) -> Result<()> {
        let body = body.trim_start();
        let delimiter = first_line(body).trim_end();
        if delimiter.is_empty() {
            return Err(WebApiError::Parse("batch response has no boundary".to_string()));
        }

        let segments: Vec<&str> = body.split(delimiter).collect();
        if segments.len() < 2 {
            return Ok(());
        }

        // first segment precedes the opening boundary, last follows the closing one
        for segment in &segments[1..segments.len() - 1] {
            if segment.contains(CHANGESET_RESPONSE_MARKER) {
                let nested = skip_first_line(segment.trim());
                self.parse_multipart(nested)?;
            } else {
                let part = ResponsePart::parse(segment)?;
                let item = self.materialize(part)?;
                self.items.push(item);
                self.request_number += 1;
            }
        }

        Ok(())
    }

    fn materialize(&self, part: ResponsePart) -> Result<BatchItem> {
        let params = self.params.get(self.request_number);
        trace!("Batch part {} returned {}", self.request_number, part.status);

        let Some(json) = json_span(&part.body) else {
            return Ok(Ok(part.value_without_json(params)));
        };

        let value = parse_data(serde_json::from_str(json)?, params)?;
        if part.status >= 400 {
            return Ok(Err(ServerError::new(part.status, part.status_text, part.headers, Some(value))));
        }

        Ok(Ok(value))
    }
}

enum PartState {
    /// `Content-Type: application/http` and friends, before the status line
    PartHeaders,
    HttpHeaders,
    Body,
}

/// One embedded HTTP response
struct ResponsePart {
    status: u16,
    status_text: String,
    headers: Headers,
    body: String,
}

impl ResponsePart {
    fn parse(segment: &str) -> Result<Self> {
        let mut state = PartState::PartHeaders;
        let mut status = None;
        let mut status_text = String::new();
        let mut part_headers = Headers::new();
        let mut body_lines = Vec::new();

        for line in segment.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);

            match state {
                PartState::PartHeaders => {
                    if let Some(caps) = STATUS_LINE.captures(line) {
                        status = caps[1].parse::<u16>().ok();
                        status_text = caps[2].trim().to_string();
                        state = PartState::HttpHeaders;
                    }
                }
                PartState::HttpHeaders => {
                    if line.trim().is_empty() {
                        state = PartState::Body;
                    } else if let Some((name, value)) = line.split_once(':') {
                        part_headers.insert(name.trim(), value.trim());
                    }
                }
                PartState::Body => body_lines.push(line),
            }
        }

        let status = status.ok_or_else(|| WebApiError::Parse("batch part has no HTTP status line".to_string()))?;

        Ok(Self {
            status,
            status_text,
            headers: part_headers,
            body: body_lines.join("\n"),
        })
    }

    fn value_without_json(&self, params: Option<&ParseParams>) -> Value {
        let is_text = self
            .headers
            .get(headers::CONTENT_TYPE)
            .is_some_and(|content_type| content_type.starts_with(content_types::TEXT_PLAIN));

        if is_text {
            return parse_scalar(self.body.trim());
        }

        if let Some(value) = params.and_then(|p| p.value_if_empty.clone()) {
            return value;
        }

        self.headers
            .get(headers::ODATA_ENTITY_ID)
            .and_then(extract_uuid_from_url)
            .map(Value::String)
            .unwrap_or(Value::Null)
    }
}

fn first_line(text: &str) -> &str {
    text.split('\n').next().unwrap_or_default()
}

fn skip_first_line(text: &str) -> &str {
    text.split_once('\n').map(|(_, rest)| rest).unwrap_or_default()
}

/// Text between the first `{` and the last `}`
fn json_span(body: &str) -> Option<&str> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start <= end).then(|| &body[start..=end])
}
