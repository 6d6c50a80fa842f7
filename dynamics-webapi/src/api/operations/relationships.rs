//! Associate and disassociate records through navigation properties

use reqwest::Method;
use serde_json::json;

use super::{Prepared, require_key, require_navigation_property};
use crate::api::client::WebApiClient;
use crate::api::context::ParseParams;
use crate::api::error::{Result, WebApiError};
use crate::api::request::{RequestData, WebApiRequest};

const REF_SEGMENT: &str = "$ref";

/// `request` names the primary record (`collection`, `key`) and the
/// relationship (`navigation_property`); `related` is the related record's
/// path, e.g. `contacts(00000000-...)`, or an absolute URL
pub(crate) fn prepare_associate(request: WebApiRequest, related: &str, single_valued: bool) -> Result<Prepared> {
    let mut request = if single_valued {
        request.with_function("associateSingleValued").method(Method::PUT)
    } else {
        request.with_function("associate").method(Method::POST)
    };
    check_reference(&request)?;
    if related.is_empty() {
        return Err(WebApiError::parameter(request.function_label(), "related", "String"));
    }

    request.additional_path = Some(REF_SEGMENT.to_string());
    request.data = Some(RequestData::Json(json!({ "@odata.id": related })));
    Ok((request, ParseParams::default()))
}

/// `related_key` is required for collection-valued relationships and must
/// be absent for single-valued ones
pub(crate) fn prepare_disassociate(request: WebApiRequest, related_key: Option<&str>) -> Result<Prepared> {
    let mut request = match related_key {
        Some(key) => {
            let mut request = request.with_function("disassociate");
            request.navigation_property_key = Some(key.to_string());
            request
        }
        None => request.with_function("disassociateSingleValued"),
    };
    request.method = Method::DELETE;
    check_reference(&request)?;

    request.additional_path = Some(REF_SEGMENT.to_string());
    Ok((request, ParseParams::default()))
}

fn check_reference(request: &WebApiRequest) -> Result<()> {
    require_key(request)?;
    require_navigation_property(request)
}

impl WebApiClient {
    /// Add a record to a collection-valued navigation property
    pub async fn associate(&self, request: WebApiRequest, related: &str) -> Result<()> {
        let (request, params) = prepare_associate(request, related, false)?;
        self.make_request(request, params).await.map(|_| ())
    }

    /// Set a single-valued navigation property (lookup)
    pub async fn associate_single_valued(&self, request: WebApiRequest, related: &str) -> Result<()> {
        let (request, params) = prepare_associate(request, related, true)?;
        self.make_request(request, params).await.map(|_| ())
    }

    /// Remove a record from a collection-valued navigation property
    pub async fn disassociate(&self, request: WebApiRequest, related_key: &str) -> Result<()> {
        let (request, params) = prepare_disassociate(request, Some(related_key))?;
        self.make_request(request, params).await.map(|_| ())
    }

    /// Clear a single-valued navigation property
    pub async fn disassociate_single_valued(&self, request: WebApiRequest) -> Result<()> {
        let (request, params) = prepare_disassociate(request, None)?;
        self.make_request(request, params).await.map(|_| ())
    }
}
