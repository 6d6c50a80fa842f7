//! Parameter checks applied while composing a request
//!
//! Each check names the originating operation and the offending parameter so
//! the caller can tell which field of which call was malformed.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::api::error::{Result, WebApiError};
use crate::api::utility::extract_uuid;

static ALTERNATE_KEY_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+=(.+)$").expect("valid alternate key regex"));

pub const KEY_TYPE: &str = "String representing GUID or Alternate Key";
pub const GUID_TYPE: &str = "GUID String";
pub const ARRAY_TYPE: &str = "Array";

/// Normalize a primary or alternate key
///
/// A GUID (braced or not) becomes its bare form. A comma-separated alternate
/// key (`field1='a',field2=123`) has double quotes normalized to single quotes.
pub fn key_parameter_check(value: &str, function: &str, parameter: &str) -> Result<String> {
    if let Some(guid) = extract_uuid(value) {
        return Ok(guid);
    }

    let mut parts = Vec::new();
    for part in value.split(',') {
        let part = part.trim().replace('"', "'");
        if !ALTERNATE_KEY_PART.is_match(&part) {
            return Err(WebApiError::parameter(function, parameter, KEY_TYPE));
        }
        parts.push(part);
    }

    Ok(parts.join(","))
}

pub fn guid_parameter_check(value: &str, function: &str, parameter: &str) -> Result<String> {
    extract_uuid(value).ok_or_else(|| WebApiError::parameter(function, parameter, GUID_TYPE))
}

/// Arrays given to the composer must not be empty
pub fn array_parameter_check<T>(values: &[T], function: &str, parameter: &str) -> Result<()> {
    if values.is_empty() {
        return Err(WebApiError::parameter(function, parameter, ARRAY_TYPE));
    }
    Ok(())
}

/// An empty string is treated the same as an absent value
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
