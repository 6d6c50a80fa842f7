//! Response record shaping
//!
//! OData annotations are copied into plain sibling fields so callers do not
//! need to know the annotation names:
//!
//! | annotation                                          | field            |
//! |-----------------------------------------------------|------------------|
//! | `@odata.context`                                    | `oDataContext`   |
//! | `@odata.count`                                      | `oDataCount`     |
//! | `@odata.nextLink`                                   | `oDataNextLink`  |
//! | `@odata.deltaLink`                                  | `oDataDeltaLink` |
//! | `x@OData.Community.Display.V1.FormattedValue`       | `x_Formatted`    |
//! | `x@Microsoft.Dynamics.CRM.associatednavigationproperty` | `x_NavigationProperty` |
//! | `x@Microsoft.Dynamics.CRM.lookuplogicalname`        | `x_LogicalName`  |
//!
//! Linked-entity attributes named `alias_x002e_field` are additionally
//! grouped under an `alias` object.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::HashSet;

use super::paging::fetch_xml_paging_cookie;
use crate::api::constants::{ALIAS_SEPARATOR, annotations};
use crate::api::context::ParseParams;
use crate::api::error::{Result, WebApiError};

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)/(\w+)\(([0-9A-F]{8}-?(?:[0-9A-F]{4}-?){3}[0-9A-F]{12})")
        .expect("valid entity reference regex")
});

enum Rewrite {
    /// Replace the whole key
    Fixed(&'static str),
    /// Replace the whole key and coerce the value to an integer
    Count(&'static str),
    /// Append to the annotated property name
    Suffix(&'static str),
}

const ANNOTATION_RULES: &[(&str, Rewrite)] = &[
    ("odata.context", Rewrite::Fixed("oDataContext")),
    ("odata.count", Rewrite::Count("oDataCount")),
    ("odata.nextLink", Rewrite::Fixed("oDataNextLink")),
    ("odata.deltaLink", Rewrite::Fixed("oDataDeltaLink")),
    (annotations::FORMATTED_VALUE, Rewrite::Suffix("_Formatted")),
    (annotations::ASSOCIATED_NAVIGATION_PROPERTY, Rewrite::Suffix("_NavigationProperty")),
    (annotations::LOOKUP_LOGICAL_NAME, Rewrite::Suffix("_LogicalName")),
];

const ODATA_ID: &str = "@odata.id";
const ODATA_COUNT: &str = "@odata.count";
const ODATA_CONTEXT: &str = "@odata.context";

/// Shape a parsed JSON response according to its parse parameters
pub fn parse_data(mut value: Value, params: Option<&ParseParams>) -> Result<Value> {
    if let Some(params) = params {
        if params.is_ref {
            if let Some(reference) = reference_object(&value) {
                return Ok(reference);
            }
        }
        if params.to_count {
            return Ok(Value::from(count_value(value.get(ODATA_COUNT))));
        }
    }

    visit(&mut value)?;

    if let (Some(page), Value::Object(obj)) = (params.and_then(|p| p.page_number), &mut value) {
        let key = format!("@{}", annotations::FETCHXML_PAGING_COOKIE);
        if let Some(raw) = obj.get(&key).and_then(Value::as_str) {
            let paging = fetch_xml_paging_cookie(raw, page);
            obj.insert("PagingInfo".to_string(), serde_json::to_value(paging)?);
        }
    }

    Ok(value)
}

/// `{id, collection, oDataContext}` for an `@odata.id` response
fn reference_object(value: &Value) -> Option<Value> {
    let id_url = value.get(ODATA_ID)?.as_str()?;
    let caps = REFERENCE.captures(id_url)?;

    Some(json!({
        "id": &caps[2],
        "collection": &caps[1],
        "oDataContext": value.get(ODATA_CONTEXT).cloned().unwrap_or(Value::Null),
    }))
}

fn count_value(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Some(Value::String(s)) => leading_integer(s),
        _ => 0,
    }
}

fn leading_integer(text: &str) -> i64 {
    let trimmed = text.trim_start();
    let end = trimmed
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    trimmed[..end].parse().unwrap_or(0)
}

fn visit(value: &mut Value) -> Result<()> {
    match value {
        Value::Array(items) => items.iter_mut().try_for_each(visit),
        Value::Object(obj) => visit_object(obj),
        _ => Ok(()),
    }
}

fn visit_object(obj: &mut Map<String, Value>) -> Result<()> {
    let keys: Vec<String> = obj.keys().cloned().collect();
    // alias containers created during this walk, as opposed to attributes from the server
    let mut alias_containers: HashSet<String> = HashSet::new();

    for key in keys {
        if let Some(child) = obj.get_mut(&key) {
            visit(child)?;
        }

        let Some(value) = obj.get(&key).cloned() else {
            continue;
        };

        if let Some((field, rewritten)) = rewrite_annotation(&key, &value) {
            obj.insert(field, rewritten);
        }

        let Some((alias, field)) = key.split_once(ALIAS_SEPARATOR) else {
            continue;
        };

        if !alias_containers.contains(alias) {
            if obj.contains_key(alias) {
                return Err(WebApiError::AliasNotUnique {
                    alias: alias.to_string(),
                });
            }
            obj.insert(alias.to_string(), Value::Object(Map::new()));
            alias_containers.insert(alias.to_string());
        }

        if let Some(Value::Object(container)) = obj.get_mut(alias) {
            if let Some((nested_field, rewritten)) = rewrite_annotation(field, &value) {
                container.insert(nested_field, rewritten);
            }
            container.insert(field.to_string(), value);
        }
    }

    Ok(())
}

/// Sibling field for an annotated key, if the annotation is one we expose
fn rewrite_annotation(key: &str, value: &Value) -> Option<(String, Value)> {
    let (property, annotation) = key.split_once('@')?;

    ANNOTATION_RULES
        .iter()
        .find(|(name, _)| *name == annotation)
        .map(|(_, rule)| match rule {
            Rewrite::Fixed(field) => (field.to_string(), value.clone()),
            Rewrite::Count(field) => (field.to_string(), Value::from(count_value(Some(value)))),
            Rewrite::Suffix(suffix) => (format!("{}{}", property, suffix), value.clone()),
        })
}
