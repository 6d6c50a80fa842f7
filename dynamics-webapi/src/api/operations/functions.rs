//! Web API functions (GET) and actions (POST), bound or unbound
//!
//! A request with a `collection` (and usually a `key`) calls the operation
//! bound to that entity; without one the operation is unbound.

use reqwest::Method;
use serde_json::{Map, Value};

use super::Prepared;
use crate::api::client::WebApiClient;
use crate::api::context::ParseParams;
use crate::api::error::{Result, WebApiError};
use crate::api::request::{RequestData, WebApiRequest, build_function_parameters};

pub(crate) fn prepare_function(
    request: WebApiRequest,
    name: &str,
    parameters: Option<&Map<String, Value>>,
) -> Result<Prepared> {
    let mut request = request.with_function("callFunction").method(Method::GET);
    check_name(&request, name, "name")?;

    let parameters = build_function_parameters(parameters);
    request.additional_path = Some(format!("{}{}", name, parameters.signature));
    if !parameters.aliases.is_empty() {
        request
            .query_params
            .get_or_insert_with(Vec::new)
            .extend(parameters.aliases);
    }
    mark_unbound(&mut request);

    Ok((request, ParseParams::default()))
}

pub(crate) fn prepare_action(request: WebApiRequest, name: &str, parameters: Option<Value>) -> Result<Prepared> {
    let mut request = request.with_function("callAction").method(Method::POST);
    check_name(&request, name, "actionName")?;

    request.additional_path = Some(name.to_string());
    request.data = parameters.map(RequestData::Json);
    mark_unbound(&mut request);

    Ok((request, ParseParams::default()))
}

fn check_name(request: &WebApiRequest, name: &str, parameter: &str) -> Result<()> {
    if name.is_empty() {
        return Err(WebApiError::parameter(request.function_label(), parameter, "String"));
    }
    Ok(())
}

fn mark_unbound(request: &mut WebApiRequest) {
    if request.collection.as_deref().is_none_or(str::is_empty) {
        request.unbound = true;
    }
}

impl WebApiClient {
    /// Call a function; parameters are passed as `@pN` aliases
    pub async fn call_function(
        &self,
        request: WebApiRequest,
        name: &str,
        parameters: Option<&Map<String, Value>>,
    ) -> Result<Value> {
        let (request, params) = prepare_function(request, name, parameters)?;
        Ok(self.make_request(request, params).await?.into_value())
    }

    /// Call an action; `parameters` is sent as the JSON body
    pub async fn call_action(&self, request: WebApiRequest, name: &str, parameters: Option<Value>) -> Result<Value> {
        let (request, params) = prepare_action(request, name, parameters)?;
        Ok(self.make_request(request, params).await?.into_value())
    }
}
