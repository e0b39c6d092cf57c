//! Interpretation of dashboard response bodies for diagnostics.
//!
//! The dashboard normally answers with JSON, but proxies and error handlers in
//! front of it answer with HTML pages. Both are turned into something
//! loggable; interpretation never fails.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::OnceLock;
use tracing::warn;

/// Title reported for markup without a usable `<title>`.
pub const NO_TITLE: &str = "No Title";

/// Elements that never have a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Structured view of a response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParsedResponse {
    Json(Value),
    Markup { markup: MarkupSummary },
}

/// Title and indented rendering of a markup body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkupSummary {
    pub title: String,
    pub content: String,
}

impl fmt::Display for ParsedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

/// Parses `body` as JSON, falling back to a markup summary.
pub fn parse_response(body: &str) -> ParsedResponse {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => ParsedResponse::Json(value),
        Err(_) => {
            warn!("Response is not JSON. Attempting to parse as HTML.");
            ParsedResponse::Markup {
                markup: MarkupSummary {
                    title: extract_title(body),
                    content: prettify(body),
                },
            }
        }
    }
}

fn title_regex() -> &'static Regex {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    TITLE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").unwrap())
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"(?s)<!--.*?-->|<[^>]*>|[^<]+").unwrap())
}

fn tag_name_regex() -> &'static Regex {
    static TAG_NAME: OnceLock<Regex> = OnceLock::new();
    TAG_NAME.get_or_init(|| Regex::new(r"^<\s*/?\s*([A-Za-z][A-Za-z0-9:-]*)").unwrap())
}

fn extract_title(markup: &str) -> String {
    title_regex()
        .captures(markup)
        .and_then(|captures| captures.get(1))
        .map(|title| decode_entities(title.as_str().trim()))
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| NO_TITLE.to_string())
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// One tag or text run per line, indented one space per open element.
fn prettify(markup: &str) -> String {
    let mut lines = Vec::new();
    let mut depth = 0usize;

    for token in token_regex().find_iter(markup) {
        let token = token.as_str();

        if !token.starts_with('<') {
            let text = token.trim();
            if !text.is_empty() {
                lines.push(format!("{}{}", " ".repeat(depth), text));
            }
            continue;
        }

        if token.starts_with("<!") || token.starts_with("<?") {
            lines.push(format!("{}{}", " ".repeat(depth), token));
            continue;
        }

        if token.starts_with("</") {
            depth = depth.saturating_sub(1);
            lines.push(format!("{}{}", " ".repeat(depth), token));
            continue;
        }

        lines.push(format!("{}{}", " ".repeat(depth), token));
        let name = tag_name_regex()
            .captures(token)
            .and_then(|captures| captures.get(1))
            .map(|name| name.as_str().to_ascii_lowercase());
        let self_closing = token.ends_with("/>");
        let void = name
            .as_deref()
            .is_some_and(|name| VOID_ELEMENTS.contains(&name));
        if name.is_some() && !self_closing && !void {
            depth += 1;
        }
    }

    lines.join("\n")
}
