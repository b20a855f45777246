//! Markdown to HTML, a thin pass-through to pulldown-cmark

use pulldown_cmark::{html, Options, Parser};

/// Marker separating a summary from the rest of a document
const MORE_MARKER: &str = "<!-- more -->";

/// Render markdown to HTML
///
/// Front matter must already be stripped; YAML metadata blocks are not enabled.
pub fn render_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_SMART_PUNCTUATION
        | Options::ENABLE_HEADING_ATTRIBUTES;
    let parser = Parser::new_ext(markdown, options);

    let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut html_output, parser);
    html_output
}

/// Split a body at `<!-- more -->` into (summary, full body without the marker)
pub fn split_excerpt(content: &str) -> (Option<String>, String) {
    if let Some(pos) = content.find(MORE_MARKER) {
        let excerpt = content[..pos].trim().to_string();
        let remaining = content[pos + MORE_MARKER.len()..].trim().to_string();
        let full = format!("{}\n\n{}", excerpt, remaining);
        (Some(excerpt), full)
    } else {
        (None, content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_basic_markdown() {
        let html = render_html("# Hello World\n\nThis is a test.");
        assert!(html.contains("<h1>Hello World</h1>"));
        assert!(html.contains("<p>This is a test.</p>"));
    }

    #[test]
    fn test_split_excerpt() {
        let content = "This is excerpt.\n<!-- more -->\nThis is more content.";
        let (excerpt, full) = split_excerpt(content);
        assert_eq!(excerpt, Some("This is excerpt.".to_string()));
        assert!(full.contains("This is excerpt."));
        assert!(full.contains("This is more content."));
        assert!(!full.contains(MORE_MARKER));

        let (excerpt, full) = split_excerpt("No marker");
        assert!(excerpt.is_none());
        assert_eq!(full, "No marker");
    }
}
