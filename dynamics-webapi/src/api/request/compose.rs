//! Request composer
//!
//! Turns a [`WebApiRequest`] into a [`ComposedRequest`]: the path (collection,
//! key, navigation, OData system query options) and the ordered header set.

use log::debug;
use reqwest::Method;

use super::prefer::compose_prefer_header;
use super::validation::{array_parameter_check, guid_parameter_check, key_parameter_check, non_empty};
use super::{ComposedRequest, Expand, ExpandRequest, WebApiRequest};
use crate::api::config::ClientConfig;
use crate::api::constants::{content_types, headers as names};
use crate::api::error::{Result, WebApiError};
use crate::api::headers::Headers;
use crate::api::utility::remove_guid_brackets_in_filter;

/// Compose the full request: path, query string and headers
pub fn compose_request(request: &WebApiRequest, config: &ClientConfig) -> Result<ComposedRequest> {
    let path = match non_empty(&request.url) {
        Some(url) => {
            let base = config.api_url_for(request.api);
            let relative = url.strip_prefix(base.as_str()).unwrap_or(url);
            compose_url(request, relative.to_string(), "&")?
        }
        None => {
            let base_path = compose_base_path(request)?;
            let mut path = compose_url(request, base_path, "&")?;

            if let Some(fetch_xml) = non_empty(&request.fetch_xml) {
                let join = if path.contains('?') { '&' } else { '?' };
                path.push(join);
                path.push_str("fetchXml=");
                path.push_str(&urlencoding::encode(fetch_xml));
            }
            path
        }
    };

    let headers = compose_headers(request, config)?;
    let in_change_set =
        request.method != Method::GET && request.in_change_set.unwrap_or(true);

    debug!("Composed {} request: {} {}", request.function_name, request.method, path);

    Ok(ComposedRequest {
        method: request.method.clone(),
        api: request.api,
        path,
        headers,
        data: request.data.clone(),
        in_change_set,
    })
}

/// `$contentId` reference, collection and key
fn compose_base_path(request: &WebApiRequest) -> Result<String> {
    let function = request.function_label();
    let collection = non_empty(&request.collection);
    let content_id = non_empty(&request.content_id);

    if collection.is_none() && content_id.is_none() && !request.unbound {
        return Err(WebApiError::invalid_request(function, "request.collection is required"));
    }

    let mut path = String::new();

    if let Some(reference) = content_id.filter(|id| id.starts_with('$')) {
        path.push_str(reference);
    }

    if let Some(collection) = collection {
        if !path.is_empty() {
            path.push('/');
        }
        path.push_str(collection);

        if let Some(key) = non_empty(&request.key) {
            let key = key_parameter_check(key, &function, "request.key")?;
            path.push('(');
            path.push_str(&key);
            path.push(')');
        }
    }

    Ok(path)
}

/// How the `select` list is applied to the URL
#[derive(Debug, PartialEq)]
enum SelectShape<'a> {
    /// `retrieve` with a single `.../$ref` entry: appended to the path
    Reference(&'a str),
    /// Regular `$select`, optionally with a raw path segment taken from the first entry
    Fields {
        path_segment: Option<&'a str>,
        fields: &'a [String],
    },
}

/// Split a select list into its path and query parts
///
/// A first entry starting with `/` is a raw path segment: it is taken out of
/// the list and appended to the path, or dropped when a navigation property
/// already determines the path.
fn shape_select<'a>(request: &WebApiRequest, select: &'a [String]) -> SelectShape<'a> {
    if request.function_name == "retrieve" && select.len() == 1 && select[0].ends_with("/$ref") {
        return SelectShape::Reference(select[0].as_str());
    }

    match select.split_first() {
        Some((first, rest)) if first.starts_with('/') => {
            let has_navigation = non_empty(&request.navigation_property).is_some();
            SelectShape::Fields {
                path_segment: if has_navigation { None } else { Some(first.as_str()) },
                fields: rest,
            }
        }
        _ => SelectShape::Fields {
            path_segment: None,
            fields: select,
        },
    }
}

/// Append navigation segments and the query string to `url`
///
/// `join` is `&` for a top-level request; nested `$expand` options are joined
/// with `;` and returned without the leading `?`.
pub fn compose_url(request: &WebApiRequest, mut url: String, join: &str) -> Result<String> {
    let function = request.function_label();
    let mut query: Vec<String> = Vec::new();

    if let Some(navigation) = non_empty(&request.navigation_property) {
        url.push('/');
        url.push_str(navigation);

        if let Some(key) = non_empty(&request.navigation_property_key) {
            let key = key_parameter_check(key, &function, "request.navigationPropertyKey")?;
            url.push('(');
            url.push_str(&key);
            url.push(')');
        }

        if navigation == "Attributes" {
            if let Some(attribute_type) = non_empty(&request.metadata_attribute_type) {
                url.push('/');
                url.push_str(attribute_type);
            }
        }
    }

    if let Some(additional) = non_empty(&request.additional_path) {
        if !url.is_empty() {
            url.push('/');
        }
        url.push_str(additional);
    }

    if let Some(select) = &request.select {
        array_parameter_check(select, &function, "request.select")?;
        match shape_select(request, select) {
            SelectShape::Reference(segment) => {
                url.push('/');
                url.push_str(segment);
            }
            SelectShape::Fields { path_segment, fields } => {
                if let Some(segment) = path_segment {
                    url.push_str(segment);
                }
                if !fields.is_empty() {
                    query.push(format!("$select={}", fields.join(",")));
                }
            }
        }
    }

    if let Some(filter) = non_empty(&request.filter) {
        let filter = remove_guid_brackets_in_filter(filter);
        query.push(format!("$filter={}", urlencoding::encode(&filter)));
    }

    if let Some(property) = non_empty(&request.property) {
        url.push('/');
        url.push_str(property);
    }

    if let Some(saved_query) = non_empty(&request.saved_query) {
        let id = guid_parameter_check(saved_query, &function, "request.savedQuery")?;
        query.push(format!("savedQuery={}", id));
    }

    if let Some(user_query) = non_empty(&request.user_query) {
        let id = guid_parameter_check(user_query, &function, "request.userQuery")?;
        query.push(format!("userQuery={}", id));
    }

    if let Some(apply) = non_empty(&request.apply) {
        query.push(format!("$apply={}", apply));
    }

    if request.count {
        query.push("$count=true".to_string());
    }

    if let Some(top) = request.top.filter(|top| *top > 0) {
        query.push(format!("$top={}", top));
    }

    if let Some(order_by) = &request.order_by {
        array_parameter_check(order_by, &function, "request.orderBy")?;
        query.push(format!("$orderby={}", order_by.join(",")));
    }

    if let Some(partition_id) = non_empty(&request.partition_id) {
        query.push(format!("partitionid='{}'", urlencoding::encode(partition_id)));
    }

    if let Some(size) = non_empty(&request.download_size) {
        query.push(format!("size={}", size));
    }

    // Passed through as-is; callers pre-encode these.
    if let Some(params) = &request.query_params {
        array_parameter_check(params, &function, "request.queryParams")?;
        query.push(params.join("&"));
    }

    if let Some(file_name) = non_empty(&request.file_name) {
        query.push(format!("{}={}", names::FILE_NAME, urlencoding::encode(file_name)));
    }

    if let Some(expand) = &request.expand {
        if expand.is_empty() {
            return Err(WebApiError::parameter(&function, "request.expand", "String or Array"));
        }
        if let Some(expand) = compose_expand(request, expand)? {
            query.push(format!("$expand={}", expand));
        }
    }

    if query.is_empty() {
        return Ok(url);
    }
    if join == "&" {
        url.push('?');
    }
    url.push_str(&query.join(join));
    Ok(url)
}

fn compose_expand(parent: &WebApiRequest, expand: &Expand) -> Result<Option<String>> {
    let items = match expand {
        Expand::Raw(raw) => return Ok(Some(raw.clone())),
        Expand::List(items) => items,
    };

    let mut parts = Vec::new();
    for item in items {
        let Some(property) = non_empty(&item.property) else {
            continue;
        };
        let nested = expand_as_request(parent, item);
        let options = compose_url(&nested, String::new(), ";")?;
        if options.is_empty() {
            parts.push(property.to_string());
        } else {
            parts.push(format!("{}({})", property, options));
        }
    }

    Ok(if parts.is_empty() { None } else { Some(parts.join(",")) })
}

fn expand_as_request(parent: &WebApiRequest, item: &ExpandRequest) -> WebApiRequest {
    WebApiRequest {
        function_name: format!("{} $expand", parent.function_name),
        select: item.select.clone(),
        filter: item.filter.clone(),
        top: item.top,
        order_by: item.order_by.clone(),
        expand: item.expand.clone(),
        ..Default::default()
    }
}

/// Merge default and request headers and attach the conditional ones
pub fn compose_headers(request: &WebApiRequest, config: &ClientConfig) -> Result<Headers> {
    let function = request.function_label();

    let mut headers = config.headers.clone();
    headers.extend(&request.headers);

    let prefer = compose_prefer_header(request, config);
    if !prefer.is_empty() {
        headers.insert(names::PREFER, prefer);
    }

    if request.collection.as_deref() == Some("$metadata") {
        headers.insert(names::ACCEPT, content_types::XML);
    }

    if let Some(mode) = non_empty(&request.transfer_mode) {
        headers.insert(names::TRANSFER_MODE, mode);
    }

    if request.if_match.is_some() && request.if_none_match.is_some() {
        return Err(WebApiError::invalid_request(
            function,
            "Either one of request.ifmatch or request.ifnonematch parameters should be used in a call, not both.",
        ));
    }

    if let Some(etag) = non_empty(&request.if_match) {
        headers.insert(names::IF_MATCH, etag);
    }

    if let Some(etag) = non_empty(&request.if_none_match) {
        headers.insert(names::IF_NONE_MATCH, etag);
    }

    let impersonate = non_empty(&request.impersonate).or(non_empty(&config.impersonate));
    if let Some(caller) = impersonate {
        let caller = guid_parameter_check(caller, &function, "request.impersonate")?;
        headers.insert(names::CALLER_ID, caller);
    }

    let impersonate_aad = non_empty(&request.impersonate_aad).or(non_empty(&config.impersonate_aad));
    if let Some(caller) = impersonate_aad {
        let caller = guid_parameter_check(caller, &function, "request.impersonateAAD")?;
        headers.insert(names::CALLER_OBJECT_ID, caller);
    }

    if let Some(token) = non_empty(&request.token) {
        headers.insert(names::AUTHORIZATION, format!("Bearer {}", token));
    }

    if request.duplicate_detection {
        headers.insert(names::SUPPRESS_DUPLICATE_DETECTION, "false");
    }

    if request.bypass_custom_plugin_execution {
        headers.insert(names::BYPASS_CUSTOM_PLUGIN_EXECUTION, "true");
    }

    if request.no_cache {
        headers.insert(names::CACHE_CONTROL, "no-cache");
    }

    if request.merge_labels {
        headers.insert(names::MERGE_LABELS, "true");
    }

    // A `$`-prefixed id is a reference already consumed into the path
    if let Some(content_id) = non_empty(&request.content_id) {
        if !content_id.starts_with('$') {
            headers.insert(names::CONTENT_ID, content_id);
        }
    }

    if let Some(range) = non_empty(&request.content_range) {
        headers.insert(names::CONTENT_RANGE, range);
    }

    if let Some(range) = non_empty(&request.range) {
        headers.insert(names::RANGE, range);
    }

    Ok(headers)
}

/// Fill in the OData headers every request carries unless already set
pub fn set_standard_headers(headers: &mut Headers) {
    headers.insert_if_absent(names::ACCEPT, content_types::JSON);
    headers.insert_if_absent(names::ODATA_MAX_VERSION, "4.0");
    headers.insert_if_absent(names::ODATA_VERSION, "4.0");

    if headers.contains(names::CONTENT_RANGE) {
        headers.insert(names::CONTENT_TYPE, content_types::OCTET_STREAM);
    } else {
        headers.insert_if_absent(names::CONTENT_TYPE, content_types::JSON_UTF8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::request::{ExpandRequest, StringOrList};

    fn config() -> ClientConfig {
        ClientConfig::builder("https://org.crm.dynamics.com").build()
    }

    fn path(request: &WebApiRequest) -> String {
        compose_request(request, &config()).unwrap().path
    }

    #[test]
    fn test_select_and_filter_scenario() {
        let request = WebApiRequest::new("leads")
            .select(&["fullname", "subject"])
            .filter("revenue gt 1000");
        assert_eq!(
            path(&request),
            "leads?$select=fullname,subject&$filter=revenue%20gt%201000"
        );
    }

    #[test]
    fn test_braced_guid_key_is_canonicalized() {
        let request = WebApiRequest::new("accounts").key("{AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE}");
        assert_eq!(path(&request), "accounts(AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE)");
    }

    #[test]
    fn test_alternate_key_in_path() {
        let request = WebApiRequest::new("contacts").key("emailaddress1=\"a@b.com\"");
        assert_eq!(path(&request), "contacts(emailaddress1='a@b.com')");
    }

    #[test]
    fn test_invalid_key_fails_before_dispatch() {
        let request = WebApiRequest::new("contacts").key("bogus").with_function("retrieve");
        let err = compose_request(&request, &config()).unwrap_err();
        assert!(matches!(
            err,
            WebApiError::Parameter { ref function, ref parameter, .. }
                if function == "WebApiClient.retrieve" && parameter == "request.key"
        ));
    }

    #[test]
    fn test_filter_guid_unwrapped_then_encoded() {
        let request = WebApiRequest::new("contacts")
            .filter("_parentcustomerid_value eq {00000000-0000-0000-0000-000000000001}");
        let composed = path(&request);
        let encoded = composed.split("$filter=").nth(1).unwrap();
        assert_eq!(
            urlencoding::decode(encoded).unwrap(),
            "_parentcustomerid_value eq 00000000-0000-0000-0000-000000000001"
        );
    }

    #[test]
    fn test_query_option_order() {
        let mut request = WebApiRequest::new("accounts")
            .select(&["name"])
            .filter("statecode eq 0")
            .order_by(&["name asc"])
            .top(10);
        request.count = true;
        request.apply = Some("groupby((statecode))".to_string());
        request.query_params = Some(vec!["@p1='raw value'".to_string()]);
        request.expand = Some(Expand::Raw("primarycontactid".to_string()));

        assert_eq!(
            path(&request),
            "accounts?$select=name&$filter=statecode%20eq%200&$apply=groupby((statecode))&$count=true&$top=10&$orderby=name asc&@p1='raw value'&$expand=primarycontactid"
        );
    }

    #[test]
    fn test_nested_expand() {
        let request = WebApiRequest::new("accounts").expand(vec![
            ExpandRequest::new("primarycontactid").select(&["fullname", "emailaddress1"]),
            ExpandRequest::new("contact_customer_accounts")
                .filter("statecode eq 0")
                .top(3),
            ExpandRequest::new("owninguser"),
            ExpandRequest::default().select(&["skipped"]),
        ]);

        assert_eq!(
            path(&request),
            "accounts?$expand=primarycontactid($select=fullname,emailaddress1),contact_customer_accounts($filter=statecode%20eq%200;$top=3),owninguser"
        );
    }

    #[test]
    fn test_retrieve_reference_select() {
        let request = WebApiRequest::new("accounts")
            .key("00000000-0000-0000-0000-000000000001")
            .select(&["primarycontactid/$ref"])
            .with_function("retrieve");
        assert_eq!(
            path(&request),
            "accounts(00000000-0000-0000-0000-000000000001)/primarycontactid/$ref"
        );
    }

    #[test]
    fn test_leading_slash_select_becomes_path_segment() {
        let request = WebApiRequest::new("accounts")
            .key("00000000-0000-0000-0000-000000000001")
            .select(&["/primarycontactid", "fullname"]);
        assert_eq!(
            path(&request),
            "accounts(00000000-0000-0000-0000-000000000001)/primarycontactid?$select=fullname"
        );
    }

    #[test]
    fn test_leading_slash_select_dropped_with_navigation_property() {
        let request = WebApiRequest::new("accounts")
            .key("00000000-0000-0000-0000-000000000001")
            .navigation_property("contact_customer_accounts")
            .select(&["/ignored", "fullname"]);
        assert_eq!(
            path(&request),
            "accounts(00000000-0000-0000-0000-000000000001)/contact_customer_accounts?$select=fullname"
        );
    }

    #[test]
    fn test_metadata_attribute_type_segment() {
        let mut request = WebApiRequest::new("EntityDefinitions")
            .key("LogicalName='account'")
            .navigation_property("Attributes");
        request.navigation_property_key = Some("LogicalName='name'".to_string());
        request.metadata_attribute_type = Some("Microsoft.Dynamics.CRM.StringAttributeMetadata".to_string());

        assert_eq!(
            path(&request),
            "EntityDefinitions(LogicalName='account')/Attributes(LogicalName='name')/Microsoft.Dynamics.CRM.StringAttributeMetadata"
        );
    }

    #[test]
    fn test_content_id_reference_prefix() {
        let mut request = WebApiRequest::default().content_id("$1");
        request.navigation_property = Some("contact_customer_accounts".to_string());
        let composed = compose_request(&request, &config()).unwrap();
        assert_eq!(composed.path, "$1/contact_customer_accounts");
        assert!(!composed.headers.contains("Content-ID"));
    }

    #[test]
    fn test_plain_content_id_becomes_header() {
        let request = WebApiRequest::new("accounts").content_id("7");
        let composed = compose_request(&request, &config()).unwrap();
        assert_eq!(composed.headers.get("Content-ID"), Some("7"));
    }

    #[test]
    fn test_url_request_strips_base() {
        let mut request = WebApiRequest::from_url(
            "https://org.crm.dynamics.com/api/data/v9.2/accounts?$skiptoken=abc",
        );
        request.max_page_size = Some(10);
        let composed = compose_request(&request, &config()).unwrap();
        assert_eq!(composed.path, "accounts?$skiptoken=abc");
        assert_eq!(composed.headers.get("Prefer"), Some("odata.maxpagesize=10"));
    }

    #[test]
    fn test_fetch_xml_appended_encoded() {
        let mut request = WebApiRequest::new("accounts");
        request.fetch_xml = Some("<fetch><entity name=\"account\"/></fetch>".to_string());
        assert_eq!(
            path(&request),
            "accounts?fetchXml=%3Cfetch%3E%3Centity%20name%3D%22account%22%2F%3E%3C%2Ffetch%3E"
        );
    }

    #[test]
    fn test_missing_collection_is_error() {
        let request = WebApiRequest::default();
        let err = compose_request(&request, &config()).unwrap_err();
        assert!(err.to_string().contains("request.collection is required"));
    }

    #[test]
    fn test_empty_select_is_error() {
        let mut request = WebApiRequest::new("accounts");
        request.select = Some(vec![]);
        assert!(matches!(
            compose_request(&request, &config()),
            Err(WebApiError::Parameter { .. })
        ));
    }

    #[test]
    fn test_if_match_and_if_none_match_conflict() {
        let request = WebApiRequest::new("accounts").if_match("*").if_none_match("*");
        assert!(matches!(
            compose_request(&request, &config()),
            Err(WebApiError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_conditional_headers() {
        let mut request = WebApiRequest::new("$metadata")
            .prefer(StringOrList::from("return=representation"))
            .if_match("W/\"123\"");
        request.impersonate = Some("{00000000-0000-0000-0000-000000000009}".to_string());
        request.token = Some("abc".to_string());
        request.bypass_custom_plugin_execution = true;
        request.duplicate_detection = true;
        request.no_cache = true;
        request.merge_labels = true;
        request.range = Some("bytes=0-10".to_string());

        let headers = compose_headers(&request, &config()).unwrap();
        assert_eq!(headers.get("Prefer"), Some("return=representation"));
        assert_eq!(headers.get("Accept"), Some("application/xml"));
        assert_eq!(headers.get("If-Match"), Some("W/\"123\""));
        assert_eq!(headers.get("MSCRMCallerID"), Some("00000000-0000-0000-0000-000000000009"));
        assert_eq!(headers.get("Authorization"), Some("Bearer abc"));
        assert_eq!(headers.get("MSCRM.BypassCustomPluginExecution"), Some("true"));
        assert_eq!(headers.get("MSCRM.SuppressDuplicateDetection"), Some("false"));
        assert_eq!(headers.get("Cache-Control"), Some("no-cache"));
        assert_eq!(headers.get("MSCRM.MergeLabels"), Some("true"));
        assert_eq!(headers.get("Range"), Some("bytes=0-10"));
    }

    #[test]
    fn test_invalid_impersonation_rejected() {
        let mut request = WebApiRequest::new("accounts");
        request.impersonate = Some("someone".to_string());
        assert!(matches!(
            compose_headers(&request, &config()),
            Err(WebApiError::Parameter { ref parameter, .. }) if parameter == "request.impersonate"
        ));
    }

    #[test]
    fn test_request_headers_override_config_headers() {
        let config = ClientConfig::builder("https://org.crm.dynamics.com")
            .header("x-source", "config")
            .header("x-keep", "1")
            .build();
        let request = WebApiRequest::new("accounts").header("x-source", "request");

        let headers = compose_headers(&request, &config).unwrap();
        assert_eq!(headers.get("x-source"), Some("request"));
        assert_eq!(headers.get("x-keep"), Some("1"));
    }

    #[test]
    fn test_standard_headers() {
        let mut headers = Headers::new();
        set_standard_headers(&mut headers);
        assert_eq!(headers.get("Accept"), Some("application/json"));
        assert_eq!(headers.get("OData-MaxVersion"), Some("4.0"));
        assert_eq!(headers.get("OData-Version"), Some("4.0"));
        assert_eq!(headers.get("Content-Type"), Some("application/json; charset=utf-8"));

        let mut chunk = Headers::new();
        chunk.insert("Content-Range", "bytes 0-9/100");
        set_standard_headers(&mut chunk);
        assert_eq!(chunk.get("Content-Type"), Some("application/octet-stream"));
    }

    #[test]
    fn test_shape_select_keeps_plain_list() {
        let request = WebApiRequest::new("accounts");
        let select = vec!["name".to_string(), "revenue".to_string()];
        assert_eq!(
            shape_select(&request, &select),
            SelectShape::Fields {
                path_segment: None,
                fields: &select[..]
            }
        );
    }
}
