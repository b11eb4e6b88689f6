//! Standalone HTML rendering, used when a PDF cannot carry the text.

use crate::markdown::{self, Block};

const STYLE: &str = "\
body { font-family: Helvetica, Arial, sans-serif; max-width: 800px; margin: 40px auto; padding: 0 20px; line-height: 1.6; color: #222; }
h1 { font-size: 24px; border-bottom: 2px solid #2c3e50; padding-bottom: 8px; }
h2 { font-size: 19px; color: #2c3e50; margin-top: 28px; }
h3 { font-size: 16px; color: #34495e; }
.metadata { background: #f4f6f8; border-left: 4px solid #2c3e50; padding: 10px 14px; margin-bottom: 24px; font-size: 14px; }
@media print { body { margin: 0; } }";

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Escape, then turn balanced `**` pairs into `<strong>`.
fn inline(text: &str) -> String {
    let escaped = escape(text);
    let parts: Vec<&str> = escaped.split("**").collect();
    if parts.len() % 2 == 0 {
        return escaped;
    }
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            if i % 2 == 1 {
                format!("<strong>{}</strong>", part)
            } else {
                part.to_string()
            }
        })
        .collect()
}

/// Render `content` as a complete HTML page with a metadata block
/// showing `generated`.
pub fn render(content: &str, generated: &str) -> String {
    let mut body = String::new();
    let mut in_list = false;

    for block in markdown::parse(content) {
        if in_list && !matches!(block, Block::Bullet(_)) {
            body.push_str("</ul>\n");
            in_list = false;
        }
        match block {
            Block::Title(text) => body.push_str(&format!("<h1>{}</h1>\n", inline(&text))),
            Block::Heading(text) => body.push_str(&format!("<h2>{}</h2>\n", inline(&text))),
            Block::Subheading(text) => body.push_str(&format!("<h3>{}</h3>\n", inline(&text))),
            Block::Bullet(text) => {
                if !in_list {
                    body.push_str("<ul>\n");
                    in_list = true;
                }
                body.push_str(&format!("<li>{}</li>\n", inline(&text)));
            }
            Block::Text(text) => body.push_str(&format!("<p>{}</p>\n", inline(&text))),
            Block::Blank => {}
        }
    }
    if in_list {
        body.push_str("</ul>\n");
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Business Requirements Document</title>\n<style>\n{}\n</style>\n</head>\n<body>\n\
         <div class=\"metadata\"><strong>Generated:</strong> {}</div>\n{}</body>\n</html>\n",
        STYLE,
        escape(generated),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<script>alert("x" & 'y')</script>"#),
            "&lt;script&gt;alert(&quot;x&quot; &amp; &#39;y&#39;)&lt;/script&gt;"
        );
    }

    #[test]
    fn test_metadata_div() {
        let html = render("Body", "2026-03-01 10:00:00");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(
            "<div class=\"metadata\"><strong>Generated:</strong> 2026-03-01 10:00:00</div>"
        ));
    }

    #[test]
    fn test_blocks_converted() {
        let html = render(
            "# BRD\n## 1. Scope\n### In scope\n- Orders\n- Payments\n\nA <b>note</b>",
            "now",
        );
        assert!(html.contains("<h1>BRD</h1>"));
        assert!(html.contains("<h2>1. Scope</h2>"));
        assert!(html.contains("<h3>In scope</h3>"));
        assert!(html.contains("<ul>\n<li>Orders</li>\n<li>Payments</li>\n</ul>"));
        assert!(html.contains("<p>A &lt;b&gt;note&lt;/b&gt;</p>"));
    }

    #[test]
    fn test_bold_pairs() {
        assert_eq!(inline("**Status:** Draft"), "<strong>Status:</strong> Draft");
        assert_eq!(inline("2 ** 3"), "2 ** 3");
    }
}
