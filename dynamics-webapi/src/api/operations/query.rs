//! Collection queries: retrieve multiple, paging and counting

use futures::stream::{self, Stream, TryStreamExt};
use reqwest::Method;
use serde_json::Value;

use super::{Prepared, continuation};
use crate::api::client::WebApiClient;
use crate::api::context::ParseParams;
use crate::api::error::{Result, WebApiError};
use crate::api::request::WebApiRequest;

/// One page (or all pages) of a collection query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityCollection {
    pub value: Vec<Value>,
    pub context: Option<String>,
    pub count: Option<i64>,
    pub next_link: Option<String>,
    pub delta_link: Option<String>,
}

impl EntityCollection {
    /// Read a parsed collection response
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut obj) = value else {
            return Err(WebApiError::Parse("collection response is not an object".to_string()));
        };

        let value = match obj.remove("value") {
            Some(Value::Array(items)) => items,
            _ => return Err(WebApiError::Parse("collection response has no value array".to_string())),
        };

        let text = |key: &str| obj.get(key).and_then(Value::as_str).map(String::from);

        Ok(Self {
            context: text("oDataContext"),
            next_link: text("oDataNextLink"),
            delta_link: text("oDataDeltaLink"),
            count: obj.get("oDataCount").and_then(Value::as_i64),
            value,
        })
    }
}

pub(crate) fn prepare_retrieve_multiple(request: WebApiRequest, next_page_link: Option<String>) -> Result<Prepared> {
    let mut request = match next_page_link {
        Some(link) => continuation(&request, link),
        None => request,
    };
    request.function_name = "retrieveMultiple".to_string();
    request.method = Method::GET;
    Ok((request, ParseParams::default()))
}

/// Count with `/$count` when there is no filter, otherwise with `$count=true`
pub(crate) fn prepare_count(request: WebApiRequest) -> Result<Prepared> {
    let mut request = request.with_function("count");
    request.method = Method::GET;

    if request.filter.as_deref().is_none_or(str::is_empty) {
        request.navigation_property = Some("$count".to_string());
        return Ok((request, ParseParams::default()));
    }

    request.count = true;
    Ok((
        request,
        ParseParams {
            to_count: true,
            ..Default::default()
        },
    ))
}

impl WebApiClient {
    /// Retrieve one page; pass the previous page's `next_link` to continue
    pub async fn retrieve_multiple(
        &self,
        request: WebApiRequest,
        next_page_link: Option<String>,
    ) -> Result<EntityCollection> {
        let (request, params) = prepare_retrieve_multiple(request, next_page_link)?;
        EntityCollection::from_value(self.make_request(request, params).await?.into_value())
    }

    /// Pages of a collection query, following `@odata.nextLink`
    pub fn retrieve_pages(&self, request: WebApiRequest) -> impl Stream<Item = Result<EntityCollection>> + '_ {
        stream::try_unfold(Some((request, None)), move |state| async move {
            let Some((request, link)) = state else {
                return Ok(None);
            };

            let page = self.retrieve_multiple(request.clone(), link).await?;
            let next = page.next_link.clone().map(|link| (request, Some(link)));
            Ok::<_, WebApiError>(Some((page, next)))
        })
    }

    /// Retrieve every page of a collection query
    ///
    /// The result has no `next_link`; `delta_link` is taken from the last page.
    pub async fn retrieve_all(&self, request: WebApiRequest) -> Result<EntityCollection> {
        let mut pages = Box::pin(self.retrieve_pages(request));
        let mut all = EntityCollection::default();

        while let Some(page) = pages.try_next().await? {
            all.value.extend(page.value);
            all.context = all.context.or(page.context);
            all.count = all.count.or(page.count);
            all.delta_link = page.delta_link;
        }

        Ok(all)
    }

    /// Number of records in a collection, optionally filtered
    pub async fn count(&self, request: WebApiRequest) -> Result<u64> {
        let (request, params) = prepare_count(request)?;
        let value = self.make_request(request, params).await?.into_value();
        value
            .as_u64()
            .ok_or_else(|| WebApiError::Parse(format!("expected a record count, got {}", value)))
    }

    /// Count by retrieving every page; not limited to 5000 records like `$count`
    pub async fn count_all(&self, request: WebApiRequest) -> Result<u64> {
        let all = self.retrieve_all(request).await?;
        Ok(all.value.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{MockTransport, json_response, response, test_config};
    use serde_json::json;

    const BASE: &str = "https://org.crm.dynamics.com/api/data/v9.2/";

    #[tokio::test]
    async fn test_retrieve_multiple_page() {
        let transport = MockTransport::new();
        transport.push(json_response(
            200,
            json!({
                "@odata.context": "ctx",
                "@odata.count": 3,
                "@odata.nextLink": format!("{}accounts?$select=name&$skiptoken=abc", BASE),
                "value": [{"name": "A"}]
            }),
        ));
        let client = WebApiClient::with_transport(test_config(), transport.clone());

        let page = client
            .retrieve_multiple(WebApiRequest::new("accounts").select(&["name"]).count(true), None)
            .await
            .unwrap();

        assert_eq!(page.value, vec![json!({"name": "A"})]);
        assert_eq!(page.count, Some(3));
        assert_eq!(page.context.as_deref(), Some("ctx"));
        assert!(page.next_link.unwrap().ends_with("$skiptoken=abc"));
        assert_eq!(
            transport.requests()[0].uri,
            format!("{}accounts?$select=name&$count=true", BASE)
        );
    }

    #[tokio::test]
    async fn test_retrieve_all_follows_next_links() {
        let transport = MockTransport::new();
        transport.push(json_response(
            200,
            json!({
                "value": [{"name": "A"}, {"name": "B"}],
                "@odata.nextLink": format!("{}accounts?$select=name&$skiptoken=page2", BASE)
            }),
        ));
        transport.push(json_response(
            200,
            json!({
                "value": [{"name": "C"}],
                "@odata.deltaLink": format!("{}accounts?$deltatoken=1", BASE)
            }),
        ));
        let client = WebApiClient::with_transport(test_config(), transport.clone());

        let all = client
            .retrieve_all(WebApiRequest::new("accounts").select(&["name"]).max_page_size(2))
            .await
            .unwrap();

        assert_eq!(all.value.len(), 3);
        assert_eq!(all.next_link, None);
        assert_eq!(all.delta_link, Some(format!("{}accounts?$deltatoken=1", BASE)));

        let sent = transport.requests();
        assert_eq!(sent.len(), 2);
        // the next link is used verbatim, with the Prefer settings kept
        assert_eq!(sent[1].uri, format!("{}accounts?$select=name&$skiptoken=page2", BASE));
        assert_eq!(sent[1].headers.get("Prefer"), Some("odata.maxpagesize=2"));
    }

    #[tokio::test]
    async fn test_count_without_filter_uses_count_segment() {
        let transport = MockTransport::new();
        transport.push(response(200, &[("Content-Type", "text/plain")], b"42"));
        let client = WebApiClient::with_transport(test_config(), transport.clone());

        assert_eq!(client.count(WebApiRequest::new("accounts")).await.unwrap(), 42);
        assert_eq!(transport.requests()[0].uri, format!("{}accounts/$count", BASE));
    }

    #[tokio::test]
    async fn test_count_with_filter_uses_count_option() {
        let transport = MockTransport::new();
        transport.push(json_response(200, json!({"@odata.count": 7, "value": []})));
        let client = WebApiClient::with_transport(test_config(), transport.clone());

        let count = client
            .count(WebApiRequest::new("accounts").filter("statecode eq 0"))
            .await
            .unwrap();

        assert_eq!(count, 7);
        assert_eq!(
            transport.requests()[0].uri,
            format!("{}accounts?$filter=statecode%20eq%200&$count=true", BASE)
        );
    }

    #[tokio::test]
    async fn test_count_all() {
        let transport = MockTransport::new();
        transport.push(json_response(
            200,
            json!({"value": [{}, {}], "@odata.nextLink": format!("{}accounts?$skiptoken=2", BASE)}),
        ));
        transport.push(json_response(200, json!({"value": [{}]})));
        let client = WebApiClient::with_transport(test_config(), transport);

        assert_eq!(client.count_all(WebApiRequest::new("accounts")).await.unwrap(), 3);
    }

    #[test]
    fn test_collection_requires_value_array() {
        assert!(EntityCollection::from_value(json!({"name": "x"})).is_err());
        assert!(EntityCollection::from_value(json!(5)).is_err());
    }
}
