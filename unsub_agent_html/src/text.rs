use crate::cleaning::clean_html_slim;
use lol_html::{rewrite_str, text, RewriteStrSettings};

/// Extract readable text from HTML, whitespace collapsed.
///
/// Scripts, styles and inline-hidden elements are dropped first.
pub fn html_to_text(html: &str) -> String {
    let cleaned = clean_html_slim(html);
    let mut extracted = String::new();

    let _ = rewrite_str(
        &cleaned,
        RewriteStrSettings {
            element_content_handlers: vec![text!("*", |t| {
                extracted.push_str(t.as_str());
                if t.last_in_text_node() {
                    extracted.push(' ');
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    );

    decode_basic_entities(&extracted.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn decode_basic_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text() {
        let html = "<html><head><style>p{}</style></head><body><h1>Hi</h1>\n<p>Tom &amp; Jerry</p><script>x()</script></body></html>";
        assert_eq!(html_to_text(html), "Hi Tom & Jerry");
    }
}
