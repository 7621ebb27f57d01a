//! Image reference scanning and rewriting.
//!
//! Two independent passes, one per syntax:
//!
//! * markdown: `![alt](target "optional title")`
//! * HTML:     `<img … src="target" …>`
//!
//! Each pass exposes a lazy scanner yielding [`ImageReference`]s and a
//! rewriter that substitutes the target of every match for which a lookup
//! returns a replacement. Matches the lookup declines are copied through
//! byte-for-byte, so a failed or malformed reference never alters the text.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::ops::Range;

/// Syntax an image reference was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// `![alt](url)`
    Markdown,
    /// `<img src="url">`
    Html,
}

/// One image reference found in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference<'a> {
    pub kind: ReferenceKind,
    /// Byte range of the whole match in the scanned text.
    pub span: Range<usize>,
    /// URL as written, with any markdown title removed and whitespace trimmed.
    /// Empty for malformed references.
    pub raw_url: &'a str,
    /// Alt text (markdown references only).
    pub alt: Option<&'a str>,
}

// ── Markdown pass ────────────────────────────────────────────────────────────

static RE_MARKDOWN_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

/// Extract the URL from a markdown image target, dropping a quoted title.
///
/// `url "title"` → `url`; `url` → `url`; blank → `None`.
pub fn markdown_target_url(target: &str) -> Option<&str> {
    let target = target.trim();
    let url = match target.split_once('"') {
        Some((before, _title)) => before.trim(),
        None => target.split_whitespace().next().unwrap_or(""),
    };
    (!url.is_empty()).then_some(url)
}

/// Lazily yield every markdown image reference in `text`.
pub fn scan_markdown(text: &str) -> impl Iterator<Item = ImageReference<'_>> + '_ {
    RE_MARKDOWN_IMAGE.captures_iter(text).map(|caps| {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let alt = caps.get(1).map(|m| m.as_str());
        let raw_url = caps
            .get(2)
            .and_then(|m| markdown_target_url(m.as_str()))
            .unwrap_or("");
        ImageReference {
            kind: ReferenceKind::Markdown,
            span: whole,
            raw_url,
            alt,
        }
    })
}

/// Replace the target of every markdown image for which `lookup` returns a
/// new path. The alt text is kept; a quoted title is dropped.
pub fn rewrite_markdown<F>(text: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    RE_MARKDOWN_IMAGE
        .replace_all(text, |caps: &Captures<'_>| {
            match markdown_target_url(&caps[2]).and_then(&mut lookup) {
                Some(local) => format!("![{}]({})", &caps[1], local),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

// ── HTML pass ────────────────────────────────────────────────────────────────

// Group 1 holds everything between `<img` and `src=` (at least the separating
// whitespace), group 3 everything after the closing quote. `data-src=` does
// not match because `src` must follow whitespace.
static RE_HTML_IMG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img((?:\s+[^>]*?)?\s)src="([^"]*)"([^>]*)>"#).unwrap()
});

/// Lazily yield every `<img src="…">` reference in `text`.
pub fn scan_html(text: &str) -> impl Iterator<Item = ImageReference<'_>> + '_ {
    RE_HTML_IMG.captures_iter(text).map(|caps| {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let raw_url = caps.get(2).map_or("", |m| m.as_str().trim());
        ImageReference {
            kind: ReferenceKind::Html,
            span: whole,
            raw_url,
            alt: None,
        }
    })
}

/// Replace the `src` of every `<img>` for which `lookup` returns a new path.
/// All other attributes, before and after `src`, are kept verbatim.
pub fn rewrite_html<F>(text: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    RE_HTML_IMG
        .replace_all(text, |caps: &Captures<'_>| {
            let url = caps[2].trim();
            let replacement = if url.is_empty() { None } else { lookup(url) };
            match replacement {
                Some(local) => format!("<img{}src=\"{}\"{}>", &caps[1], local, &caps[3]),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// All references in `text`, markdown pass first.
pub fn scan_all(text: &str) -> impl Iterator<Item = ImageReference<'_>> + '_ {
    scan_markdown(text).chain(scan_html(text))
}

// ── Tests ────────────────────────────────────────────────────────────────────
