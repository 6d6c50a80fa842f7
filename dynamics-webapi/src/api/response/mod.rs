//! Response parsing
//!
//! [`parse_response`] turns a raw response (body plus headers) into a
//! [`ResponseValue`], dispatching on what the body looks like: empty, a
//! multipart batch, a file download, JSON, or a plain scalar.

pub mod annotations;
pub mod paging;

use log::debug;
use serde_json::{Number, Value, json};

use super::batch::{BatchItem, parse_batch_response};
use super::constants::{BATCH_RESPONSE_MARKER, content_types, headers};
use super::context::ParseParams;
use super::error::{Result, WebApiError};
use super::headers::Headers;
use super::utility::extract_uuid_from_url;

pub use annotations::parse_data;
pub use paging::{PagingInfo, fetch_xml_paging_cookie};

/// A downloaded file chunk
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileResponse {
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub location: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseValue {
    /// Empty body with nothing to derive a value from
    Empty,
    /// JSON record or collection, a scalar, or an id taken from `OData-EntityId`
    Value(Value),
    /// Empty body with a `Location` header (file upload sessions)
    Location {
        location: String,
        chunk_size: Option<u64>,
    },
    File(FileResponse),
    /// One entry per batch part, in request order
    Batch(Vec<BatchItem>),
}

impl ResponseValue {
    /// Collapse into a JSON value; batch errors become their error details
    pub fn into_value(self) -> Value {
        match self {
            ResponseValue::Empty => Value::Null,
            ResponseValue::Value(value) => value,
            ResponseValue::Location { location, chunk_size } => {
                json!({"location": location, "chunkSize": chunk_size})
            }
            ResponseValue::File(file) => json!({
                "fileName": file.file_name,
                "fileSize": file.file_size,
                "location": file.location,
            }),
            ResponseValue::Batch(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| match item {
                        Ok(value) => value,
                        Err(err) => Value::Object(err.details),
                    })
                    .collect(),
            ),
        }
    }
}

/// Parse a successful response
///
/// `params` holds one entry per request; single requests use the first.
pub fn parse_response(body: &[u8], response_headers: &Headers, params: &[ParseParams]) -> Result<ResponseValue> {
    let first = params.first();

    if body.is_empty() {
        return Ok(parse_empty(response_headers, first));
    }

    // Downloaded bytes are returned as they are, even when they contain a
    // batch marker, so the attachment check runs before the batch check.
    if let Some(disposition) = response_headers.get(headers::CONTENT_DISPOSITION) {
        return Ok(ResponseValue::File(FileResponse {
            file_name: file_name_from_disposition(disposition),
            file_size: response_headers
                .get(headers::FILE_SIZE)
                .and_then(|size| size.trim().parse().ok()),
            location: response_headers.get(headers::LOCATION).map(String::from),
            data: body.to_vec(),
        }));
    }

    let text = String::from_utf8_lossy(body);

    if text.contains(BATCH_RESPONSE_MARKER) {
        let items = parse_batch_response(&text, params)?;

        if first.is_some_and(|p| p.converted_to_batch) {
            debug!("Unwrapping response of a request sent as a batch");
            return match items.into_iter().next() {
                Some(Ok(value)) => Ok(ResponseValue::Value(value)),
                Some(Err(err)) => Err(WebApiError::Server(err)),
                None => Err(WebApiError::Parse("batch response contains no parts".to_string())),
            };
        }

        return Ok(ResponseValue::Batch(items));
    }

    let is_json = response_headers
        .get(headers::CONTENT_TYPE)
        .is_some_and(|content_type| content_type.starts_with(content_types::JSON));

    if is_json {
        let value: Value = serde_json::from_str(&text)?;
        return Ok(ResponseValue::Value(parse_data(value, first)?));
    }

    Ok(ResponseValue::Value(parse_scalar(&text)))
}

fn parse_empty(response_headers: &Headers, params: Option<&ParseParams>) -> ResponseValue {
    if let Some(value) = params.and_then(|p| p.value_if_empty.clone()) {
        return ResponseValue::Value(value);
    }

    if let Some(entity_id) = response_headers.get(headers::ODATA_ENTITY_ID) {
        let id = extract_uuid_from_url(entity_id).unwrap_or_else(|| entity_id.to_string());
        return ResponseValue::Value(Value::String(id));
    }

    if let Some(location) = response_headers.get(headers::LOCATION) {
        return ResponseValue::Location {
            location: location.to_string(),
            chunk_size: response_headers
                .get(headers::CHUNK_SIZE)
                .and_then(|size| size.trim().parse().ok()),
        };
    }

    ResponseValue::Empty
}

/// A number when the text is numeric, otherwise the text itself
pub fn parse_scalar(text: &str) -> Value {
    let trimmed = text.trim();

    if let Ok(integer) = trimmed.parse::<i64>() {
        return Value::from(integer);
    }
    if let Some(number) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }

    Value::String(text.to_string())
}

fn file_name_from_disposition(disposition: &str) -> Option<String> {
    disposition.split(';').find_map(|part| {
        let (name, value) = part.split_once('=')?;
        (name.trim().eq_ignore_ascii_case("filename")).then(|| value.trim().trim_matches('"').to_string())
    })
}
