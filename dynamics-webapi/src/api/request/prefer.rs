//! `Prefer` header negotiation
//!
//! The header is always rebuilt from parsed options in a fixed order, never
//! echoed from the caller's raw input.

use super::WebApiRequest;
use crate::api::config::ClientConfig;
use crate::api::utility::remove_double_quotes;

const RETURN_REPRESENTATION: &str = "return=representation";
const INCLUDE_ANNOTATIONS: &str = "odata.include-annotations=";
const MAX_PAGE_SIZE: &str = "odata.maxpagesize=";
const TRACK_CHANGES: &str = "odata.track-changes";
const CONTINUE_ON_ERROR: &str = "odata.continue-on-error";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferOptions {
    pub return_representation: Option<bool>,
    pub include_annotations: Option<String>,
    pub max_page_size: Option<u32>,
    pub track_changes: bool,
    pub continue_on_error: bool,
}

impl PreferOptions {
    /// Recognise the known tokens of a `Prefer` value; unknown tokens are ignored
    pub fn parse(tokens: &[String]) -> Self {
        let mut options = PreferOptions::default();

        for token in tokens {
            let token = token.trim();
            if token == RETURN_REPRESENTATION {
                options.return_representation = Some(true);
            } else if let Some(value) = token.strip_prefix(INCLUDE_ANNOTATIONS) {
                options.include_annotations = Some(remove_double_quotes(value));
            } else if let Some(value) = token.strip_prefix(MAX_PAGE_SIZE) {
                options.max_page_size = remove_double_quotes(value).trim().parse().ok();
            } else if token.contains(TRACK_CHANGES) {
                options.track_changes = true;
            } else if token.contains(CONTINUE_ON_ERROR) {
                options.continue_on_error = true;
            }
        }

        options
    }

    /// Render in fixed order: representation, annotations, page size, tracking, errors
    pub fn render(&self) -> String {
        let mut parts = Vec::new();

        if self.return_representation == Some(true) {
            parts.push(RETURN_REPRESENTATION.to_string());
        }
        if let Some(annotations) = self.include_annotations.as_deref().filter(|a| !a.is_empty()) {
            parts.push(format!("{}\"{}\"", INCLUDE_ANNOTATIONS, annotations));
        }
        if let Some(size) = self.max_page_size.filter(|size| *size > 0) {
            parts.push(format!("{}{}", MAX_PAGE_SIZE, size));
        }
        if self.track_changes {
            parts.push(TRACK_CHANGES.to_string());
        }
        if self.continue_on_error {
            parts.push(CONTINUE_ON_ERROR.to_string());
        }

        parts.join(",")
    }
}

/// Resolve the effective `Prefer` options for a request
///
/// Explicit request fields win over tokens parsed from `request.prefer`,
/// which in turn win over the client-wide defaults.
pub fn resolve_prefer(request: &WebApiRequest, config: &ClientConfig) -> PreferOptions {
    let parsed = request
        .prefer
        .as_ref()
        .map(|prefer| PreferOptions::parse(&prefer.to_list()))
        .unwrap_or_default();

    PreferOptions {
        return_representation: request
            .return_representation
            .or(parsed.return_representation)
            .or(config.return_representation),
        include_annotations: request
            .include_annotations
            .clone()
            .or(parsed.include_annotations)
            .or_else(|| config.include_annotations.clone()),
        max_page_size: request
            .max_page_size
            .or(parsed.max_page_size)
            .or(config.max_page_size),
        track_changes: request.track_changes || parsed.track_changes,
        continue_on_error: request.continue_on_error || parsed.continue_on_error,
    }
}

pub fn compose_prefer_header(request: &WebApiRequest, config: &ClientConfig) -> String {
    resolve_prefer(request, config).render()
}
