//! FetchXML paging cookie extraction

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::api::utility::escape_paging_cookie;

static PAGING_COOKIE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"pagingcookie="(<cookie page="(\d+)".+</cookie>)"#).expect("valid paging cookie regex")
});

/// Paging state to pass to the next FetchXML request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagingInfo {
    /// XML-escaped cookie, ready to be placed in a `paging-cookie` attribute
    pub cookie: String,
    pub page: u32,
    pub next_page: u32,
}

/// Extract the paging cookie from a `fetchxmlpagingcookie` annotation
///
/// The annotation value is percent-encoded twice. When no cookie can be
/// found, paging continues from `current_page` without one.
pub fn fetch_xml_paging_cookie(raw: &str, current_page: u32) -> PagingInfo {
    let decoded = decode_twice(raw);

    match PAGING_COOKIE.captures(&decoded) {
        Some(caps) => {
            let page = caps[2].parse::<u32>().unwrap_or(current_page);
            PagingInfo {
                cookie: escape_paging_cookie(&caps[1]),
                page,
                next_page: page.saturating_add(1),
            }
        }
        None => PagingInfo {
            cookie: String::new(),
            page: current_page,
            next_page: current_page.saturating_add(1),
        },
    }
}

fn decode_twice(raw: &str) -> String {
    let once = urlencoding::decode(raw).map(|s| s.into_owned()).unwrap_or_else(|_| raw.to_string());
    urlencoding::decode(&once).map(|s| s.into_owned()).unwrap_or(once)
}
