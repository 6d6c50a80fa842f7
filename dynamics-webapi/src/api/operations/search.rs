//! Dataverse search (query, suggest, autocomplete) and CSDL metadata

use reqwest::Method;
use serde_json::{Value, json};

use super::Prepared;
use crate::api::client::WebApiClient;
use crate::api::config::ApiKind;
use crate::api::constants::annotations;
use crate::api::context::ParseParams;
use crate::api::error::{Result, WebApiError};
use crate::api::request::{RequestData, WebApiRequest};

/// Search input: a bare search term or a full request body
#[derive(Debug, Clone, PartialEq)]
pub enum SearchQuery {
    Term(String),
    Body(Value),
}

impl SearchQuery {
    fn into_body(self) -> Value {
        match self {
            SearchQuery::Term(term) => json!({ "search": term }),
            SearchQuery::Body(body) => body,
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            SearchQuery::Term(term) => term.is_empty(),
            SearchQuery::Body(body) => body.is_null(),
        }
    }
}

impl From<&str> for SearchQuery {
    fn from(term: &str) -> Self {
        SearchQuery::Term(term.to_string())
    }
}

impl From<String> for SearchQuery {
    fn from(term: String) -> Self {
        SearchQuery::Term(term)
    }
}

impl From<Value> for SearchQuery {
    fn from(body: Value) -> Self {
        match body {
            Value::String(term) => SearchQuery::Term(term),
            body => SearchQuery::Body(body),
        }
    }
}

pub(crate) fn prepare_search(endpoint: &str, function: &str, query: SearchQuery) -> Result<Prepared> {
    let mut request = WebApiRequest::new(endpoint)
        .with_function(function)
        .method(Method::POST);
    if query.is_empty() {
        return Err(WebApiError::parameter(request.function_label(), "query", "String or Object"));
    }

    request.api = ApiKind::Search;
    request.data = Some(RequestData::Json(query.into_body()));
    Ok((request, ParseParams::default()))
}

impl WebApiClient {
    /// Full-text search across the tables enabled for Dataverse search
    pub async fn search(&self, query: impl Into<SearchQuery>) -> Result<Value> {
        let (request, params) = prepare_search("query", "search", query.into())?;
        Ok(self.make_request(request, params).await?.into_value())
    }

    pub async fn suggest(&self, query: impl Into<SearchQuery>) -> Result<Value> {
        let (request, params) = prepare_search("suggest", "suggest", query.into())?;
        Ok(self.make_request(request, params).await?.into_value())
    }

    pub async fn autocomplete(&self, query: impl Into<SearchQuery>) -> Result<Value> {
        let (request, params) = prepare_search("autocomplete", "autocomplete", query.into())?;
        Ok(self.make_request(request, params).await?.into_value())
    }

    /// The CSDL `$metadata` document as XML text
    pub async fn retrieve_csdl_metadata(&self, add_annotations: bool) -> Result<String> {
        let mut request = WebApiRequest::new("$metadata")
            .with_function("retrieveCsdlMetadata")
            .method(Method::GET);
        if add_annotations {
            request.include_annotations = Some(annotations::ALL.to_string());
        }

        match self.make_request(request, ParseParams::default()).await?.into_value() {
            Value::String(xml) => Ok(xml),
            Value::Null => Ok(String::new()),
            other => Ok(other.to_string()),
        }
    }
}
