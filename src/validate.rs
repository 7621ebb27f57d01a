//! Validation of user-supplied identifiers and URLs.
//!
//! Runs before anything touches the network: document ids must be UUIDs,
//! and ad-hoc image URLs may only point at the Outline API of the configured
//! origin.

use crate::error::OutlinePdfError;
use crate::pipeline::images::belongs_to_origin;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});

/// Path prefix a relative URL must start with to be proxied.
pub const ALLOWED_RELATIVE_PREFIX: &str = "/api/";

/// Trim and check that `id` is a UUID. Returns the trimmed id.
pub fn validate_document_id(id: &str) -> Result<String, OutlinePdfError> {
    let trimmed = id.trim();
    if RE_UUID.is_match(trimmed) {
        Ok(trimmed.to_string())
    } else {
        Err(OutlinePdfError::InvalidDocumentId { id: id.to_string() })
    }
}

/// Check that `url` may be fetched with origin credentials and return its
/// absolute form.
///
/// * relative URLs must start with `/api/` and are joined onto `origin_url`
/// * absolute URLs must lie under `origin_url`
/// * `..` segments, backslashes and control characters (NUL included) are
///   rejected outright
pub fn validate_proxy_url(url: &str, origin_url: &str) -> Result<String, OutlinePdfError> {
    let reject = |reason: &str| OutlinePdfError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let url_trimmed = url.trim();
    if url_trimmed.is_empty() {
        return Err(reject("empty URL"));
    }
    if url_trimmed.chars().any(char::is_control) {
        return Err(reject("control characters are not allowed"));
    }
    if url_trimmed.contains('\\') {
        return Err(reject("backslashes are not allowed"));
    }
    if has_parent_segment(url_trimmed) {
        return Err(reject("path traversal is not allowed"));
    }

    if url_trimmed.starts_with('/') && !url_trimmed.starts_with("//") {
        if !url_trimmed.starts_with(ALLOWED_RELATIVE_PREFIX) {
            return Err(reject("relative URLs must start with /api/"));
        }
        if origin_url.is_empty() {
            return Err(reject("no origin configured"));
        }
        return Ok(format!("{origin_url}{url_trimmed}"));
    }

    if belongs_to_origin(url_trimmed, origin_url) {
        Ok(url_trimmed.to_string())
    } else {
        Err(reject("only URLs of the configured Outline instance are allowed"))
    }
}

fn has_parent_segment(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let decoded = path.replace("%2e", ".").replace("%2E", ".");
    decoded.split('/').any(|segment| segment == "..")
}
