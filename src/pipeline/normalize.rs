//! Normalisation: deterministic cleanup of Outline markdown before typesetting.
//!
//! Outline exports markdown that renders fine in the browser but trips up
//! pandoc's markdown reader in a few predictable ways: headings glued to the
//! previous paragraph are read as paragraph text, `<div>` wrappers have no
//! LaTeX counterpart, and invisible Unicode ends up as missing-glyph boxes in
//! the PDF.
//!
//! Every rule is a pure `&str → String` function. The whole chain is
//! idempotent: `normalize(normalize(x)) == normalize(x)`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules in order.
///
/// Rules:
/// 1. Normalise line endings (CRLF → LF)
/// 2. Replace literal `\n` escape sequences with a space
/// 3. NBSP → space; drop zero-width characters and BOM
/// 4. Strip `<div …>` / `</div>` wrappers
/// 5. Remove indentation in front of heading markers
/// 6. Ensure a blank line before every heading that follows text
///
/// Div stripping runs before the heading rules so a heading that was wrapped
/// in a `<div>` still gets its blank line on the first pass.
///
/// Removing characters can bring a `\` next to an `n` (or a `#` to the start
/// of a line), so the chain is repeated until the text stops changing.
pub fn normalize(input: &str) -> String {
    let mut current = apply_rules(input);
    loop {
        let next = apply_rules(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn apply_rules(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = replace_literal_newline_escapes(&s);
    let s = replace_invisible_chars(&s);
    let s = strip_div_tags(&s);
    let s = dedent_headings(&s);
    ensure_blank_line_before_headings(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Literal escape sequences ─────────────────────────────────────────

fn replace_literal_newline_escapes(input: &str) -> String {
    input.replace("\\n", " ")
}

// ── Rule 3: Invisible Unicode ────────────────────────────────────────────────

fn replace_invisible_chars(input: &str) -> String {
    input
        .replace('\u{00A0}', " ")
        .replace(['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}'], "")
}

// ── Rule 4: Strip <div> wrappers ─────────────────────────────────────────────

static RE_DIV_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?div(?:\s[^>]*)?>").unwrap());

fn strip_div_tags(input: &str) -> String {
    RE_DIV_TAG.replace_all(input, "").into_owned()
}

// ── Rule 5: Dedent headings ──────────────────────────────────────────────────

static RE_INDENTED_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]+(#+[ \t])").unwrap());

fn dedent_headings(input: &str) -> String {
    RE_INDENTED_HEADING.replace_all(input, "${1}").into_owned()
}

// ── Rule 6: Blank line before headings ───────────────────────────────────────

static RE_GLUED_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([^\n])\n(#+[ \t])").unwrap());

fn ensure_blank_line_before_headings(input: &str) -> String {
    RE_GLUED_HEADING
        .replace_all(input, "${1}\n\n${2}")
        .into_owned()
}

// ── Tests ────────────────────────────────────────────────────────────────────
