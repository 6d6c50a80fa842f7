//! Create, retrieve, update, upsert and delete

use log::debug;
use reqwest::Method;
use serde_json::{Value, json};

use super::{Prepared, is_status, require_data, require_key};
use crate::api::client::WebApiClient;
use crate::api::context::ParseParams;
use crate::api::error::Result;
use crate::api::request::WebApiRequest;

pub(crate) fn prepare_create(request: WebApiRequest) -> Result<Prepared> {
    let mut request = request.with_function("create");
    request.method = Method::POST;
    require_data(&request)?;
    Ok((request, ParseParams::default()))
}

/// Update with `If-Match: *` unless a concurrency token is given, so a
/// missing record is never created
pub(crate) fn prepare_update(request: WebApiRequest) -> Result<Prepared> {
    let mut request = request.with_function("update");
    request.method = Method::PATCH;
    require_key(&request)?;
    require_data(&request)?;

    if request.if_match.is_none() && request.if_none_match.is_none() {
        request.if_match = Some("*".to_string());
    }

    Ok((request, ParseParams::value_if_empty(Value::Bool(true))))
}

pub(crate) fn prepare_update_single_property(
    request: WebApiRequest,
    field: &str,
    value: Value,
) -> Result<Prepared> {
    let mut request = request.with_function("updateSingleProperty");
    request.method = Method::PUT;
    require_key(&request)?;

    request.property = Some(field.to_string());
    request.data = Some(crate::api::request::RequestData::Json(json!({ "value": value })));

    Ok((request, ParseParams::default()))
}

pub(crate) fn prepare_upsert(request: WebApiRequest) -> Result<Prepared> {
    let mut request = request.with_function("upsert");
    request.method = Method::PATCH;
    require_key(&request)?;
    require_data(&request)?;
    Ok((request, ParseParams::default()))
}

pub(crate) fn prepare_delete(request: WebApiRequest) -> Result<Prepared> {
    let mut request = request.with_function("deleteRecord");
    request.method = Method::DELETE;
    require_key(&request)?;
    Ok((request, ParseParams::value_if_empty(Value::Bool(true))))
}

pub(crate) fn prepare_retrieve(request: WebApiRequest) -> Result<Prepared> {
    let mut request = request.with_function("retrieve");
    request.method = Method::GET;

    let is_ref = request
        .select
        .as_deref()
        .is_some_and(|select| select.len() == 1 && select[0].ends_with("/$ref"));

    Ok((
        request,
        ParseParams {
            is_ref,
            ..Default::default()
        },
    ))
}

impl WebApiClient {
    /// Create a record; returns its id, or the record when a representation is requested
    pub async fn create(&self, request: WebApiRequest) -> Result<Value> {
        let (request, params) = prepare_create(request)?;
        Ok(self.make_request(request, params).await?.into_value())
    }

    /// Update a record
    ///
    /// Returns `true` (or the updated record when a representation is
    /// requested), and `false` when the `If-Match` precondition failed.
    pub async fn update(&self, request: WebApiRequest) -> Result<Value> {
        let (request, params) = prepare_update(request)?;
        let conditional = request.if_match.is_some();

        match self.make_request(request, params).await {
            Ok(response) => Ok(response.into_value()),
            Err(err) if conditional && is_status(&err, 412) => {
                debug!("Update skipped: record changed on the server");
                Ok(Value::Bool(false))
            }
            Err(err) => Err(err),
        }
    }

    /// Set one field with `PUT collection(key)/field`
    pub async fn update_single_property(&self, request: WebApiRequest, field: &str, value: Value) -> Result<Value> {
        let (request, params) = prepare_update_single_property(request, field, value)?;
        Ok(self.make_request(request, params).await?.into_value())
    }

    /// Create or update a record by key
    ///
    /// Returns `None` when `If-None-Match` prevented an update (412) or
    /// `If-Match` prevented a create (404).
    pub async fn upsert(&self, request: WebApiRequest) -> Result<Option<Value>> {
        let (request, params) = prepare_upsert(request)?;
        let if_match = request.if_match.is_some();
        let if_none_match = request.if_none_match.is_some();

        match self.make_request(request, params).await {
            Ok(response) => Ok(Some(response.into_value())),
            Err(err) if (if_none_match && is_status(&err, 412)) || (if_match && is_status(&err, 404)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Delete a record, or a single property when `request.property` is set
    ///
    /// Returns `false` when the `If-Match` precondition failed.
    pub async fn delete_record(&self, request: WebApiRequest) -> Result<bool> {
        let (request, params) = prepare_delete(request)?;
        let conditional = request.if_match.is_some();

        match self.make_request(request, params).await {
            Ok(response) => Ok(response.into_value().as_bool().unwrap_or(true)),
            Err(err) if conditional && is_status(&err, 412) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn retrieve(&self, request: WebApiRequest) -> Result<Value> {
        let (request, params) = prepare_retrieve(request)?;
        Ok(self.make_request(request, params).await?.into_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::WebApiError;
    use crate::api::testing::{MockTransport, empty_response, json_response, test_config};

    const ID: &str = "00000000-0000-0000-0000-000000000001";
    const ENTITY_ID: &str = "https://org.crm.dynamics.com/api/data/v9.2/accounts(00000000-0000-0000-0000-000000000001)";

    fn precondition_failed() -> crate::api::transport::TransportResponse {
        json_response(
            412,
            json!({"error": {"code": "0x80060882", "message": "The version of the existing record doesn't match"}}),
        )
    }

    #[tokio::test]
    async fn test_create_returns_id() {
        let transport = MockTransport::new();
        transport.push(empty_response(204, &[("OData-EntityId", ENTITY_ID)]));
        let client = WebApiClient::with_transport(test_config(), transport.clone());

        let id = client
            .create(WebApiRequest::new("accounts").data(json!({"name": "Contoso"})))
            .await
            .unwrap();

        assert_eq!(id, json!(ID));
        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::POST);
        assert_eq!(transport.body(0), r#"{"name":"Contoso"}"#);
    }

    #[tokio::test]
    async fn test_create_requires_data() {
        let client = WebApiClient::with_transport(test_config(), MockTransport::new());
        let err = client.create(WebApiRequest::new("accounts")).await.unwrap_err();
        assert!(matches!(err, WebApiError::Parameter { ref parameter, .. } if parameter == "request.data"));
    }

    #[tokio::test]
    async fn test_update_defaults_to_if_match_any() {
        let transport = MockTransport::new();
        transport.push(empty_response(204, &[("OData-EntityId", ENTITY_ID)]));
        let client = WebApiClient::with_transport(test_config(), transport.clone());

        let result = client
            .update(WebApiRequest::new("accounts").key(ID).data(json!({"name": "New"})))
            .await
            .unwrap();

        assert_eq!(result, json!(true));
        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::PATCH);
        assert_eq!(sent.headers.get("If-Match"), Some("*"));
        assert_eq!(sent.uri, ENTITY_ID);
    }

    #[tokio::test]
    async fn test_update_precondition_failed_returns_false() {
        let transport = MockTransport::new();
        transport.push(precondition_failed());
        let client = WebApiClient::with_transport(test_config(), transport);

        let result = client
            .update(
                WebApiRequest::new("accounts")
                    .key(ID)
                    .if_match("W/\"1234\"")
                    .data(json!({"name": "New"})),
            )
            .await
            .unwrap();

        assert_eq!(result, json!(false));
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_update_default_if_match_precondition_failed_returns_false() {
        let transport = MockTransport::new();
        transport.push(precondition_failed());
        let client = WebApiClient::with_transport(test_config(), transport.clone());

        let result = client
            .update(WebApiRequest::new("accounts").key(ID).data(json!({"name": "New"})))
            .await
            .unwrap();

        assert_eq!(result, json!(false));
        assert_eq!(transport.requests()[0].headers.get("If-Match"), Some("*"));
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_update_other_errors_propagate() {
        let transport = MockTransport::new();
        transport.push(json_response(400, json!({"error": {"message": "bad"}})));
        let client = WebApiClient::with_transport(test_config(), transport);

        let err = client
            .update(WebApiRequest::new("accounts").key(ID).data(json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
    }

    #[tokio::test]
    async fn test_upsert_prevented_update_returns_none() {
        let transport = MockTransport::new();
        transport.push(precondition_failed());
        let client = WebApiClient::with_transport(test_config(), transport.clone());

        let result = client
            .upsert(
                WebApiRequest::new("accounts")
                    .key("accountnumber='A-1'")
                    .if_none_match("*")
                    .data(json!({"name": "Contoso"})),
            )
            .await
            .unwrap();

        assert_eq!(result, None);
        assert_eq!(
            transport.requests()[0].uri,
            "https://org.crm.dynamics.com/api/data/v9.2/accounts(accountnumber='A-1')"
        );
    }

    #[tokio::test]
    async fn test_upsert_without_conditions_propagates_412() {
        let transport = MockTransport::new();
        transport.push(precondition_failed());
        let client = WebApiClient::with_transport(test_config(), transport);

        let err = client
            .upsert(WebApiRequest::new("accounts").key(ID).data(json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(412));
    }

    #[tokio::test]
    async fn test_delete_record() {
        let transport = MockTransport::new();
        transport.push(empty_response(204, &[]));
        transport.push(precondition_failed());
        let client = WebApiClient::with_transport(test_config(), transport.clone());

        assert!(client.delete_record(WebApiRequest::new("accounts").key(ID)).await.unwrap());
        assert!(
            !client
                .delete_record(WebApiRequest::new("accounts").key(ID).if_match("W/\"1\""))
                .await
                .unwrap()
        );
        assert_eq!(transport.requests()[0].method, Method::DELETE);
    }

    #[tokio::test]
    async fn test_update_single_property() {
        let transport = MockTransport::new();
        transport.push(empty_response(204, &[]));
        let client = WebApiClient::with_transport(test_config(), transport.clone());

        client
            .update_single_property(WebApiRequest::new("accounts").key(ID), "name", json!("Renamed"))
            .await
            .unwrap();

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::PUT);
        assert_eq!(sent.uri, format!("{}/name", ENTITY_ID));
        assert_eq!(transport.body(0), r#"{"value":"Renamed"}"#);
    }

    #[tokio::test]
    async fn test_retrieve_reference() {
        let transport = MockTransport::new();
        transport.push(json_response(
            200,
            json!({
                "@odata.context": "https://org.crm.dynamics.com/api/data/v9.2/$metadata#$ref",
                "@odata.id": "https://org.crm.dynamics.com/api/data/v9.2/contacts(00000000-0000-0000-0000-000000000002)"
            }),
        ));
        let client = WebApiClient::with_transport(test_config(), transport.clone());

        let reference = client
            .retrieve(WebApiRequest::new("accounts").key(ID).select(&["primarycontactid/$ref"]))
            .await
            .unwrap();

        assert_eq!(reference["collection"], "contacts");
        assert_eq!(reference["id"], "00000000-0000-0000-0000-000000000002");
        assert_eq!(transport.requests()[0].uri, format!("{}/primarycontactid/$ref", ENTITY_ID));
    }

    #[tokio::test]
    async fn test_retrieved_record_round_trips() {
        let transport = MockTransport::new();
        transport.push(json_response(
            200,
            json!({
                "@odata.context": "https://org.crm.dynamics.com/api/data/v9.2/$metadata#accounts/$entity",
                "@odata.etag": "W/\"1\"",
                "name": "Contoso",
                "statecode": 0,
                "statecode@OData.Community.Display.V1.FormattedValue": "Active"
            }),
        ));
        transport.push(empty_response(204, &[]));
        let client = WebApiClient::with_transport(test_config(), transport.clone());

        let mut record = client.retrieve(WebApiRequest::new("accounts").key(ID)).await.unwrap();
        assert_eq!(record["statecode_Formatted"], "Active");

        record["name"] = json!("Contoso Ltd");
        client
            .update(WebApiRequest::new("accounts").key(ID).data(record))
            .await
            .unwrap();

        let body: Value = serde_json::from_str(&transport.body(1)).unwrap();
        assert_eq!(body["name"], "Contoso Ltd");
        assert!(body.get("oDataContext").is_none());
        assert!(body.get("statecode_Formatted").is_none());
    }
}
