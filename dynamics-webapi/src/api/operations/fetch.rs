//! FetchXML queries with paging-cookie based paging

use log::debug;
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use reqwest::Method;
use serde_json::Value;

use super::Prepared;
use crate::api::client::WebApiClient;
use crate::api::constants::annotations;
use crate::api::context::ParseParams;
use crate::api::error::{Result, WebApiError};
use crate::api::request::{PreferOptions, WebApiRequest};
use crate::api::response::PagingInfo;

static FETCH_ELEMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*<fetch").expect("valid fetch element regex"));

/// One page of FetchXML results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResult {
    pub value: Vec<Value>,
    pub context: Option<String>,
    /// Cookie and page number to request the next page with
    pub paging_info: Option<PagingInfo>,
    pub more_records: bool,
}

impl FetchResult {
    fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut obj) = value else {
            return Err(WebApiError::Parse("FetchXML response is not an object".to_string()));
        };

        let value = match obj.remove("value") {
            Some(Value::Array(items)) => items,
            _ => return Err(WebApiError::Parse("FetchXML response has no value array".to_string())),
        };

        let paging_info = obj
            .remove("PagingInfo")
            .map(serde_json::from_value::<PagingInfo>)
            .transpose()?;

        Ok(Self {
            value,
            context: obj.get("oDataContext").and_then(Value::as_str).map(String::from),
            paging_info,
            more_records: obj
                .get(&format!("@{}", annotations::MORE_RECORDS))
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

/// Add `page` and `paging-cookie` attributes to the `<fetch>` element
pub fn inject_paging(fetch_xml: &str, page: u32, paging_cookie: Option<&str>) -> String {
    let mut attributes = format!("<fetch page=\"{}\"", page);
    if let Some(cookie) = paging_cookie.filter(|cookie| !cookie.is_empty()) {
        attributes.push_str(&format!(" paging-cookie=\"{}\"", cookie));
    }
    FETCH_ELEMENT.replace(fetch_xml, NoExpand(&attributes)).into_owned()
}

/// Whether an `include-annotations` list (`*`, exact names, `Namespace.*`) covers `annotation`
fn annotations_cover(list: &str, annotation: &str) -> bool {
    list.split(',').map(str::trim).any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => annotation.starts_with(prefix),
        None => pattern == annotation,
    })
}

/// Add the paging cookie annotation to the annotations the caller already asks for
fn with_paging_cookie_annotation(mut request: WebApiRequest, default: Option<&str>) -> WebApiRequest {
    let requested = request
        .include_annotations
        .clone()
        .or_else(|| {
            request
                .prefer
                .as_ref()
                .and_then(|prefer| PreferOptions::parse(&prefer.to_list()).include_annotations)
        })
        .or_else(|| default.map(String::from))
        .filter(|list| !list.is_empty());

    request.include_annotations = match requested {
        Some(list) if annotations_cover(&list, annotations::FETCHXML_PAGING_COOKIE) => Some(list),
        Some(list) => Some(format!("{},{}", list, annotations::FETCHXML_PAGING_COOKIE)),
        None => Some(annotations::FETCHXML_PAGING_COOKIE.to_string()),
    };
    request
}

/// `request.fetch_xml` holds the query, `request.page_number` and
/// `request.paging_cookie` select the page (first page by default)
pub(crate) fn prepare_fetch(request: WebApiRequest) -> Result<Prepared> {
    let mut request = request.with_function("fetch").method(Method::GET);

    let Some(fetch_xml) = request.fetch_xml.take().filter(|xml| !xml.is_empty()) else {
        return Err(WebApiError::parameter(request.function_label(), "request.fetchXml", "String"));
    };

    let page = request.page_number.unwrap_or(1);
    request.fetch_xml = Some(inject_paging(&fetch_xml, page, request.paging_cookie.as_deref()));
    request.page_number = Some(page);

    Ok((
        request,
        ParseParams {
            page_number: Some(page),
            ..Default::default()
        },
    ))
}

impl WebApiClient {
    /// Execute one page of a FetchXML query
    pub async fn fetch(&self, request: WebApiRequest) -> Result<FetchResult> {
        // the paging cookie annotation is only returned when asked for
        let request = with_paging_cookie_annotation(request, self.config().include_annotations.as_deref());

        let (request, params) = prepare_fetch(request)?;
        FetchResult::from_value(self.make_request(request, params).await?.into_value())
    }

    /// Execute a FetchXML query page by page until the server reports no more records
    pub async fn fetch_all(&self, request: WebApiRequest) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        let mut page = request.page_number.unwrap_or(1);
        let mut cookie = request.paging_cookie.clone();

        loop {
            let mut next = request.clone();
            next.page_number = Some(page);
            next.paging_cookie = cookie.take();

            let result = self.fetch(next).await?;
            records.extend(result.value);

            if !result.more_records {
                break;
            }

            let paging = result.paging_info.unwrap_or(PagingInfo {
                cookie: String::new(),
                page,
                next_page: page.saturating_add(1),
            });
            if paging.next_page <= page {
                return Err(WebApiError::Parse(format!(
                    "FetchXML paging cannot continue past page {}",
                    page
                )));
            }
            debug!("FetchXML has more records, continuing with page {}", paging.next_page);
            page = paging.next_page;
            cookie = Some(paging.cookie).filter(|c| !c.is_empty());
        }

        Ok(records)
    }
}
