//! Small string helpers shared by composition and parsing

use once_cell::sync::Lazy;
use regex::Regex;

static UUID_EXACT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\{?([0-9A-F]{8}-[0-9A-F]{4}-[0-9A-F]{4}-[0-9A-F]{4}-[0-9A-F]{12})\}?$")
        .expect("valid uuid regex")
});

static UUID_ANYWHERE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[0-9A-F]{8}-[0-9A-F]{4}-[0-9A-F]{4}-[0-9A-F]{4}-[0-9A-F]{12}")
        .expect("valid uuid regex")
});

static BRACED_GUID_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\{([0-9A-Fa-f]{8}-?(?:[0-9A-Fa-f]{4}-?){3}[0-9A-Fa-f]{12})\}")
        .expect("valid braced guid regex")
});

/// Extract a GUID from a string that is a GUID, optionally wrapped in curly braces
pub fn extract_uuid(value: &str) -> Option<String> {
    UUID_EXACT
        .captures(value.trim())
        .map(|caps| caps[1].to_string())
}

pub fn is_uuid(value: &str) -> bool {
    UUID_EXACT.is_match(value.trim())
}

/// Extract the last GUID found in a URL such as an `OData-EntityId` header value
pub fn extract_uuid_from_url(url: &str) -> Option<String> {
    UUID_ANYWHERE
        .find_iter(url)
        .last()
        .map(|m| m.as_str().to_string())
}

pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn remove_leading_slash(value: &str) -> &str {
    value.strip_prefix('/').unwrap_or(value)
}

pub fn remove_double_quotes(value: &str) -> String {
    value.replace('"', "")
}

/// HTML-escape a FetchXML paging cookie so it can be embedded in an attribute
pub fn escape_paging_cookie(cookie: &str) -> String {
    cookie
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Unwrap `{GUID}` literals in an OData filter, leaving quoted string literals untouched
pub fn remove_guid_brackets_in_filter(filter: &str) -> String {
    let mut result = String::with_capacity(filter.len());
    let mut quote: Option<char> = None;
    let mut index = 0;

    while index < filter.len() {
        let rest = &filter[index..];
        let ch = match rest.chars().next() {
            Some(ch) => ch,
            None => break,
        };

        match quote {
            Some(open) => {
                if ch == open {
                    quote = None;
                }
            }
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            None if ch == '{' => {
                if let Some(caps) = BRACED_GUID_PREFIX.captures(rest) {
                    result.push_str(&caps[1]);
                    index += caps[0].len();
                    continue;
                }
            }
            None => {}
        }

        result.push(ch);
        index += ch.len_utf8();
    }

    result
}
