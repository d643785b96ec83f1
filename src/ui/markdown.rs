//! Markdown rendering for assistant replies.

use pulldown_cmark::{Event, Options, Parser, Tag, html};

/// Escape text for HTML bodies and double-quoted attribute values.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a String cannot fail.
    let _ = pulldown_cmark_escape::escape_html(&mut out, text);
    out
}

/// Render model output as HTML.
///
/// Raw HTML in the source is shown as text, and links or images pointing at
/// anything other than http(s), mailto or a relative path are neutralized.
#[must_use]
pub fn render_markdown(text: &str) -> String {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;
    let parser = Parser::new_ext(text, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) if !is_safe_url(&dest_url) => Event::Start(Tag::Link {
            link_type,
            dest_url: "#".into(),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) if !is_safe_url(&dest_url) => Event::Start(Tag::Image {
            link_type,
            dest_url: "#".into(),
            title,
            id,
        }),
        other => other,
    });

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn is_safe_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    match lower.find(':') {
        // A colon after the first slash belongs to a path, not a scheme.
        Some(colon) if lower.find('/').is_none_or(|slash| colon < slash) => {
            ["http:", "https:", "mailto:"]
                .iter()
                .any(|scheme| lower.starts_with(scheme))
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        let escaped = escape_html(r#"<b class="x">Tom & Jerry</b>"#);
        assert_eq!(
            escaped,
            "&lt;b class=&quot;x&quot;&gt;Tom &amp; Jerry&lt;/b&gt;"
        );
        assert_eq!(escape_html("plain text"), "plain text");
    }

    #[test]
    fn test_basic_markdown() {
        let html = render_markdown("**Magnitude** scale\n\n- P waves\n- S waves");
        assert!(html.contains("<strong>Magnitude</strong>"));
        assert!(html.contains("<li>P waves</li>"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let html = render_markdown("hi <script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_unsafe_links_neutralized() {
        let html = render_markdown("[click](javascript:alert(1)) [bmkg](https://www.bmkg.go.id)");
        assert!(!html.contains("javascript:"));
        assert!(html.contains(r#"href="https://www.bmkg.go.id""#));
    }

    #[test]
    fn test_is_safe_url() {
        assert!(is_safe_url("https://example.com"));
        assert!(is_safe_url("/relative/path:with-colon"));
        assert!(is_safe_url("MAILTO:someone@example.com"));
        assert!(!is_safe_url("data:text/html;base64,AAAA"));
        assert!(!is_safe_url(" javascript:void(0)"));
    }
}
