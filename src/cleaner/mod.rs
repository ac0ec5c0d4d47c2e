//! Email body cleanup.
//!
//! Newsletters arrive as HTML soup full of layout tables and divider art.
//! This module flattens the HTML into plain text (keeping link targets,
//! dropping images) and then scrubs the leftover table/divider noise.


use fancy_regex::Regex;
use scraper::{ElementRef, Html};
use std::sync::LazyLock;

/// Tags whose entire subtree is noise in an email body.
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "head", "title", "meta", "link", "noscript", "template", "img",
];

/// Tags that terminate a line of text when rendered.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "hr", "li", "ul", "ol", "table", "tr", "td", "th", "h1", "h2", "h3", "h4",
    "h5", "h6", "blockquote", "pre", "section", "article", "header", "footer", "center",
];

static TABLE_RUBBLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[-|]+\s*\n\s*[-|]+").expect("valid regex")
});
static PIPES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[|]").expect("valid regex"));
static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid regex"));
static RULE_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*-+\s*$").expect("valid regex"));

/// Flatten an HTML email body into plain text.
///
/// Link targets are kept inline as `text (url)`; images and non-content
/// subtrees (scripts, styles, heads) are dropped.
#[inline]
pub fn extract_clean_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();
    render_element(document.root_element(), &mut out);
    collapse_spaces(&out)
}

/// Scrub divider art and layout leftovers from flattened email text.
///
/// Removes `|--|--` table rubble, stray pipes, and hyphen-only rule lines,
/// then collapses repeated blank lines.
#[inline]
pub fn clean_email_text(text: &str) -> String {
    let text = TABLE_RUBBLE.replace_all(text, "");
    let text = PIPES.replace_all(&text, "");
    let text = RULE_LINES.replace_all(&text, "");
    let text = BLANK_LINES.replace_all(&text, "\n");
    text.trim().to_string()
}

/// Convenience wrapper: HTML in, scrubbed plain text out.
#[inline]
pub fn html_to_text(html: &str) -> String {
    clean_email_text(&extract_clean_text(html))
}

fn render_element(element: ElementRef, out: &mut String) {
    let tag = element.value().name();

    if SKIPPED_TAGS.contains(&tag) {
        return;
    }

    for child in element.children() {
        match child.value() {
            scraper::node::Node::Text(text) => {
                out.push_str(&text.text);
            }
            scraper::node::Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    render_element(child_element, out);
                }
            }
            _ => {} // Skip comments, processing instructions, etc.
        }
    }

    // Keep the destination of a link next to its anchor text.
    if tag == "a" {
        if let Some(href) = element.value().attr("href") {
            let href = href.trim();
            if !href.is_empty() && !href.starts_with('#') && !out.ends_with(href) {
                out.push_str(" (");
                out.push_str(href);
                out.push(')');
            }
        }
    }

    if BLOCK_TAGS.contains(&tag) && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Collapse runs of spaces and tabs within lines, preserving line breaks.
fn collapse_spaces(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        lines.push(line.split_whitespace().collect::<Vec<_>>().join(" "));
    }
    lines.join("\n").trim().to_string()
}
