//! Declarative request descriptors and their composed form
//!
//! A [`WebApiRequest`] describes one logical operation (collection, key,
//! query options, `Prefer` inputs, concurrency tokens, payload). The composer
//! turns it into a [`ComposedRequest`]: an encoded path plus ordered headers,
//! ready for the transport or for inclusion in a batch.

pub mod compose;
pub mod parameters;
pub mod prefer;
pub mod validation;

use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

use super::config::ApiKind;
use super::headers::Headers;
use super::transport::AbortSignal;

pub use compose::{compose_headers, compose_request, compose_url, set_standard_headers};
pub use parameters::{FunctionParameters, build_function_parameters};
pub use prefer::{PreferOptions, compose_prefer_header};

/// A value that callers may give either as one comma-separated string or as a list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringOrList {
    Scalar(String),
    List(Vec<String>),
}

impl StringOrList {
    /// Canonical list form; a scalar is split on `,` and each item trimmed
    pub fn to_list(&self) -> Vec<String> {
        match self {
            StringOrList::Scalar(value) => value
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
            StringOrList::List(items) => items.iter().map(|item| item.trim().to_string()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            StringOrList::Scalar(value) => value.is_empty(),
            StringOrList::List(items) => items.is_empty(),
        }
    }
}

impl From<&str> for StringOrList {
    fn from(value: &str) -> Self {
        StringOrList::Scalar(value.to_string())
    }
}

impl From<String> for StringOrList {
    fn from(value: String) -> Self {
        StringOrList::Scalar(value)
    }
}

impl From<Vec<String>> for StringOrList {
    fn from(value: Vec<String>) -> Self {
        StringOrList::List(value)
    }
}

impl From<Vec<&str>> for StringOrList {
    fn from(value: Vec<&str>) -> Self {
        StringOrList::List(value.into_iter().map(String::from).collect())
    }
}

/// `$expand` either as a raw OData string or as structured nested requests
#[derive(Debug, Clone, PartialEq)]
pub enum Expand {
    Raw(String),
    List(Vec<ExpandRequest>),
}

impl Expand {
    pub fn is_empty(&self) -> bool {
        match self {
            Expand::Raw(value) => value.is_empty(),
            Expand::List(items) => items.is_empty(),
        }
    }
}

/// One navigation property to expand, with its own nested query options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpandRequest {
    /// Navigation property name; entries without one are skipped
    pub property: Option<String>,
    pub select: Option<Vec<String>>,
    pub filter: Option<String>,
    pub top: Option<u32>,
    pub order_by: Option<Vec<String>>,
    pub expand: Option<Expand>,
}

impl ExpandRequest {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: Some(property.into()),
            ..Default::default()
        }
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    pub fn order_by(mut self, order: &[&str]) -> Self {
        self.order_by = Some(order.iter().map(|o| o.to_string()).collect());
        self
    }
}

/// Request payload: a JSON record or raw bytes (file chunks)
#[derive(Debug, Clone, PartialEq)]
pub enum RequestData {
    Json(Value),
    Binary(Vec<u8>),
}

/// Declarative description of one Web API operation
#[derive(Debug, Clone)]
pub struct WebApiRequest {
    /// Operation name used in diagnostics (e.g. `retrieve`)
    pub function_name: String,
    pub method: Method,
    pub api: ApiKind,
    /// Full or base-relative URL; bypasses collection/key composition
    pub url: Option<String>,
    pub collection: Option<String>,
    /// GUID (optionally braced) or alternate key expression
    pub key: Option<String>,
    pub navigation_property: Option<String>,
    pub navigation_property_key: Option<String>,
    /// Appended after `/Attributes` on `EntityDefinitions` requests
    pub metadata_attribute_type: Option<String>,
    /// Function/action suffix appended to the path
    pub additional_path: Option<String>,
    /// Single property segment (`collection(key)/property`)
    pub property: Option<String>,
    pub select: Option<Vec<String>>,
    pub filter: Option<String>,
    pub expand: Option<Expand>,
    pub order_by: Option<Vec<String>>,
    pub top: Option<u32>,
    pub count: bool,
    pub apply: Option<String>,
    pub saved_query: Option<String>,
    pub user_query: Option<String>,
    pub partition_id: Option<String>,
    pub download_size: Option<String>,
    /// Raw query parameters, appended without URI encoding
    pub query_params: Option<Vec<String>>,
    pub file_name: Option<String>,
    pub fetch_xml: Option<String>,
    pub page_number: Option<u32>,
    pub paging_cookie: Option<String>,
    pub prefer: Option<StringOrList>,
    pub return_representation: Option<bool>,
    pub include_annotations: Option<String>,
    pub max_page_size: Option<u32>,
    pub track_changes: bool,
    pub continue_on_error: bool,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub impersonate: Option<String>,
    pub impersonate_aad: Option<String>,
    pub token: Option<String>,
    /// Ask the server to run duplicate detection rules
    pub duplicate_detection: bool,
    pub bypass_custom_plugin_execution: bool,
    pub no_cache: bool,
    pub merge_labels: bool,
    pub transfer_mode: Option<String>,
    /// `$n` references an earlier changeset part; anything else becomes a `Content-ID` header
    pub content_id: Option<String>,
    pub content_range: Option<String>,
    pub range: Option<String>,
    /// Changeset membership inside a batch; `None` means "default for the method"
    pub in_change_set: Option<bool>,
    /// Unbound functions/actions have no collection
    pub unbound: bool,
    pub data: Option<RequestData>,
    pub headers: Headers,
    pub timeout: Option<Duration>,
    pub abort_signal: Option<AbortSignal>,
}

impl Default for WebApiRequest {
    fn default() -> Self {
        Self {
            function_name: "request".to_string(),
            method: Method::GET,
            api: ApiKind::Data,
            url: None,
            collection: None,
            key: None,
            navigation_property: None,
            navigation_property_key: None,
            metadata_attribute_type: None,
            additional_path: None,
            property: None,
            select: None,
            filter: None,
            expand: None,
            order_by: None,
            top: None,
            count: false,
            apply: None,
            saved_query: None,
            user_query: None,
            partition_id: None,
            download_size: None,
            query_params: None,
            file_name: None,
            fetch_xml: None,
            page_number: None,
            paging_cookie: None,
            prefer: None,
            return_representation: None,
            include_annotations: None,
            max_page_size: None,
            track_changes: false,
            continue_on_error: false,
            if_match: None,
            if_none_match: None,
            impersonate: None,
            impersonate_aad: None,
            token: None,
            duplicate_detection: false,
            bypass_custom_plugin_execution: false,
            no_cache: false,
            merge_labels: false,
            transfer_mode: None,
            content_id: None,
            content_range: None,
            range: None,
            in_change_set: None,
            unbound: false,
            data: None,
            headers: Headers::new(),
            timeout: None,
            abort_signal: None,
        }
    }
}

impl WebApiRequest {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: Some(collection.into()),
            ..Default::default()
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn expand(mut self, expand: Vec<ExpandRequest>) -> Self {
        self.expand = Some(Expand::List(expand));
        self
    }

    pub fn order_by(mut self, order: &[&str]) -> Self {
        self.order_by = Some(order.iter().map(|o| o.to_string()).collect());
        self
    }

    pub fn top(mut self, top: u32) -> Self {
        self.top = Some(top);
        self
    }

    /// Ask for `$count=true` alongside the records
    pub fn count(mut self, enabled: bool) -> Self {
        self.count = enabled;
        self
    }

    pub fn navigation_property(mut self, property: impl Into<String>) -> Self {
        self.navigation_property = Some(property.into());
        self
    }

    pub fn prefer(mut self, prefer: impl Into<StringOrList>) -> Self {
        self.prefer = Some(prefer.into());
        self
    }

    pub fn max_page_size(mut self, size: u32) -> Self {
        self.max_page_size = Some(size);
        self
    }

    pub fn include_annotations(mut self, annotations: impl Into<String>) -> Self {
        self.include_annotations = Some(annotations.into());
        self
    }

    pub fn return_representation(mut self, enabled: bool) -> Self {
        self.return_representation = Some(enabled);
        self
    }

    pub fn if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match = Some(etag.into());
        self
    }

    pub fn if_none_match(mut self, etag: impl Into<String>) -> Self {
        self.if_none_match = Some(etag.into());
        self
    }

    pub fn content_id(mut self, id: impl Into<String>) -> Self {
        self.content_id = Some(id.into());
        self
    }

    pub fn in_change_set(mut self, in_change_set: bool) -> Self {
        self.in_change_set = Some(in_change_set);
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(RequestData::Json(data));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort_signal = Some(signal);
        self
    }

    pub(crate) fn with_function(mut self, name: &str) -> Self {
        self.function_name = name.to_string();
        self
    }

    /// Qualified name used in parameter errors
    pub(crate) fn function_label(&self) -> String {
        format!("WebApiClient.{}", self.function_name)
    }
}

/// Output of composition: everything the transport or batch serializer needs
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedRequest {
    pub method: Method,
    pub api: ApiKind,
    /// Path relative to the API base URL, query string included
    pub path: String,
    pub headers: Headers,
    pub data: Option<RequestData>,
    pub in_change_set: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_or_list_canonical_form() {
        let scalar = StringOrList::from("return=representation, odata.maxpagesize=10");
        assert_eq!(
            scalar.to_list(),
            vec!["return=representation", "odata.maxpagesize=10"]
        );

        let list = StringOrList::from(vec!["odata.track-changes"]);
        assert_eq!(list.to_list(), vec!["odata.track-changes"]);
    }

    #[test]
    fn test_builder_sets_fields() {
        let request = WebApiRequest::new("accounts")
            .key("00000000-0000-0000-0000-000000000001")
            .select(&["name"])
            .top(5);

        assert_eq!(request.collection.as_deref(), Some("accounts"));
        assert_eq!(request.select, Some(vec!["name".to_string()]));
        assert_eq!(request.top, Some(5));
        assert_eq!(request.method, Method::GET);
    }
}
