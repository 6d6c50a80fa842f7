//! Error types for request composition, transport and response parsing

use serde_json::{Map, Value};
use std::time::Duration;

use super::headers::Headers;

pub type Result<T> = std::result::Result<T, WebApiError>;

/// Error returned by the server for a non-2xx response
///
/// The server's error body is kept verbatim in `details`; when the body has
/// the usual `{"error": {...}}` envelope the inner object is used.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerError {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub details: Map<String, Value>,
}

impl ServerError {
    pub fn new(status: u16, status_text: impl Into<String>, headers: Headers, body: Option<Value>) -> Self {
        let details = match body {
            Some(Value::Object(mut obj)) => match obj.remove("error") {
                Some(Value::Object(inner)) => inner,
                Some(other) => {
                    obj.insert("error".to_string(), other);
                    obj
                }
                None => obj,
            },
            Some(Value::String(text)) if !text.is_empty() => {
                let mut obj = Map::new();
                obj.insert("message".to_string(), Value::String(text));
                obj
            }
            _ => Map::new(),
        };

        Self {
            status,
            status_text: status_text.into(),
            headers,
            details,
        }
    }

    /// Server-provided error message, falling back to the status text
    pub fn message(&self) -> &str {
        self.details
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(&self.status_text)
    }

    /// Server-provided error code (e.g. `0x80040217`)
    pub fn code(&self) -> Option<&str> {
        self.details.get("code").and_then(Value::as_str)
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.status, self.status_text, self.message())
    }
}

impl std::error::Error for ServerError {}

#[derive(Debug)]
pub enum WebApiError {
    /// A request field failed its type or shape check
    Parameter {
        function: String,
        parameter: String,
        expected: String,
    },
    /// The request as a whole is not valid (conflicting or missing fields)
    InvalidRequest { function: String, message: String },
    /// Non-2xx response from the server
    Server(ServerError),
    /// The request never produced a response
    Network(String),
    Timeout(Duration),
    Aborted,
    /// `execute_batch` was called without any accumulated requests
    EmptyBatch,
    /// A linked-entity alias collides with a regular attribute of the same name
    AliasNotUnique { alias: String },
    /// The response body did not have the expected shape
    Parse(String),
    Json(serde_json::Error),
    /// The caller-supplied token provider failed
    Token(String),
}

impl WebApiError {
    pub fn parameter(
        function: impl Into<String>,
        parameter: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        WebApiError::Parameter {
            function: function.into(),
            parameter: parameter.into(),
            expected: expected.into(),
        }
    }

    pub fn invalid_request(function: impl Into<String>, message: impl Into<String>) -> Self {
        WebApiError::InvalidRequest {
            function: function.into(),
            message: message.into(),
        }
    }

    /// HTTP status of a server error, if this is one
    pub fn status(&self) -> Option<u16> {
        match self {
            WebApiError::Server(err) => Some(err.status),
            _ => None,
        }
    }
}

impl std::fmt::Display for WebApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebApiError::Parameter {
                function,
                parameter,
                expected,
            } => write!(
                f,
                "{} requires the {} parameter to be of type {}",
                function, parameter, expected
            ),
            WebApiError::InvalidRequest { function, message } => {
                write!(f, "{}: {}", function, message)
            }
            WebApiError::Server(err) => write!(f, "Server error {}", err),
            WebApiError::Network(message) => write!(f, "Network error: {}", message),
            WebApiError::Timeout(duration) => {
                write!(f, "Request timed out after {}ms", duration.as_millis())
            }
            WebApiError::Aborted => write!(f, "Request was aborted"),
            WebApiError::EmptyBatch => {
                write!(f, "Batch contains no requests - add at least one operation before executing")
            }
            WebApiError::AliasNotUnique { alias } => write!(
                f,
                "The alias name of the linked entity must be unique: '{}' is already used by an attribute",
                alias
            ),
            WebApiError::Parse(message) => write!(f, "Failed to parse response: {}", message),
            WebApiError::Json(err) => write!(f, "Invalid JSON: {}", err),
            WebApiError::Token(message) => write!(f, "Failed to acquire access token: {}", message),
        }
    }
}

impl std::error::Error for WebApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WebApiError::Server(err) => Some(err),
            WebApiError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for WebApiError {
    fn from(err: serde_json::Error) -> Self {
        WebApiError::Json(err)
    }
}

impl From<ServerError> for WebApiError {
    fn from(err: ServerError) -> Self {
        WebApiError::Server(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_error_unwraps_error_envelope() {
        let body = json!({"error": {"code": "0x80040217", "message": "account Does Not Exist"}});
        let err = ServerError::new(404, "Not Found", Headers::new(), Some(body));

        assert_eq!(err.code(), Some("0x80040217"));
        assert_eq!(err.message(), "account Does Not Exist");
        assert_eq!(err.to_string(), "404 Not Found: account Does Not Exist");
    }

    #[test]
    fn test_server_error_without_body_uses_status_text() {
        let err = ServerError::new(503, "Service Unavailable", Headers::new(), None);
        assert_eq!(err.message(), "Service Unavailable");
        assert!(err.details.is_empty());
    }

    #[test]
    fn test_parameter_error_message() {
        let err = WebApiError::parameter("WebApiClient.retrieve", "request.key", "String representing GUID or Alternate Key");
        assert_eq!(
            err.to_string(),
            "WebApiClient.retrieve requires the request.key parameter to be of type String representing GUID or Alternate Key"
        );
    }
}
