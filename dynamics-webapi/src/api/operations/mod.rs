//! Web API operations
//!
//! Each operation is a thin wrapper: it fills in the method, path pieces and
//! parse parameters of a [`WebApiRequest`] and hands it to
//! [`WebApiClient::make_request`](crate::api::WebApiClient::make_request).
//! The same preparation is used when the operation is queued in a [`Batch`].

pub mod batch;
pub mod crud;
pub mod fetch;
pub mod files;
pub mod functions;
pub mod query;
pub mod relationships;
pub mod search;

pub use batch::Batch;
pub use fetch::FetchResult;
pub use files::DownloadedFile;
pub use query::EntityCollection;

use super::context::ParseParams;
use super::error::{Result, WebApiError};
use super::request::WebApiRequest;
use super::request::validation::KEY_TYPE;

/// A request ready for `make_request` or a batch, with its parse parameters
pub(crate) type Prepared = (WebApiRequest, ParseParams);

fn require_key(request: &WebApiRequest) -> Result<()> {
    match request.key.as_deref() {
        Some(key) if !key.is_empty() => Ok(()),
        _ => Err(WebApiError::parameter(request.function_label(), "request.key", KEY_TYPE)),
    }
}

fn require_data(request: &WebApiRequest) -> Result<()> {
    if request.data.is_none() {
        return Err(WebApiError::parameter(request.function_label(), "request.data", "Object"));
    }
    Ok(())
}

fn require_navigation_property(request: &WebApiRequest) -> Result<()> {
    match request.navigation_property.as_deref() {
        Some(property) if !property.is_empty() => Ok(()),
        _ => Err(WebApiError::parameter(
            request.function_label(),
            "request.navigationProperty",
            "String",
        )),
    }
}

/// A follow-up request (next page, upload chunk) that keeps the caller's
/// headers, tokens and `Prefer` settings but none of the query options
fn continuation(request: &WebApiRequest, url: String) -> WebApiRequest {
    WebApiRequest {
        function_name: request.function_name.clone(),
        api: request.api,
        url: Some(url),
        prefer: request.prefer.clone(),
        return_representation: request.return_representation,
        include_annotations: request.include_annotations.clone(),
        max_page_size: request.max_page_size,
        track_changes: request.track_changes,
        impersonate: request.impersonate.clone(),
        impersonate_aad: request.impersonate_aad.clone(),
        token: request.token.clone(),
        bypass_custom_plugin_execution: request.bypass_custom_plugin_execution,
        headers: request.headers.clone(),
        timeout: request.timeout,
        abort_signal: request.abort_signal.clone(),
        ..Default::default()
    }
}

/// Server error with the given status
fn is_status(err: &WebApiError, status: u16) -> bool {
    err.status() == Some(status)
}
