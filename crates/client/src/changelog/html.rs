//! Reduce an HTML changelog page to Markdown-ish text.
//!
//! Headings become `#` lines so version sections can be found the same way
//! as in a Markdown file; list items become `- ` lines; paragraphs and
//! preformatted blocks are kept as plain text.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

static CONTENT_ROOT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("main, article, [role=main]").expect("invalid selector"));

static BLOCKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4, h5, h6, p, li, pre, dt, dd").expect("invalid selector"));

/// Collapse whitespace and drop permalink markers.
fn clean(text: &str) -> String {
    text.split_whitespace()
        .filter(|word| *word != "¶" && *word != "#")
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches('¶')
        .to_string()
}

/// Text of `element` without text that belongs to nested blocks.
fn own_text(element: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let nested = node
            .ancestors()
            .take_while(|ancestor| ancestor.id() != element.id())
            .any(|ancestor| {
                ancestor.value().as_element().is_some_and(|e| matches!(e.name(), "ul" | "ol" | "p" | "pre" | "dl"))
            });
        if !nested {
            parts.push(&**text);
        }
    }
    parts.concat()
}

/// Convert an HTML document to text lines.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = document.select(&CONTENT_ROOT).next().unwrap_or_else(|| document.root_element());

    let mut lines = Vec::new();
    for element in root.select(&BLOCKS) {
        let name = element.value().name();
        let line = match name {
            "pre" => element.text().collect::<String>().trim_end().to_string(),
            "li" => {
                let text = clean(&own_text(element));
                if text.is_empty() { continue } else { format!("- {text}") }
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(2);
                let text = clean(&element.text().collect::<String>());
                if text.is_empty() { continue } else { format!("{} {text}", "#".repeat(level)) }
            }
            _ => {
                let text = clean(&own_text(element));
                if text.is_empty() { continue } else { text }
            }
        };
        lines.push(line);
    }
    lines.join("\n")
}

/// Whether a body looks like HTML when the content type is missing or generic.
pub fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start().get(..256).unwrap_or(body.trim_start()).to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.contains("<body")
}
