//! Line-level classification of the markdown a model produces.
//!
//! Only what BRDs use is recognised: `#` headings, bullets and paragraphs.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Title(String),
    Heading(String),
    Subheading(String),
    Bullet(String),
    Text(String),
    Blank,
}

pub fn parse(content: &str) -> Vec<Block> {
    content.lines().map(classify).collect()
}

fn classify(line: &str) -> Block {
    let line = line.trim();
    if line.is_empty() {
        return Block::Blank;
    }
    if let Some(rest) = line.strip_prefix("#### ").or_else(|| line.strip_prefix("### ")) {
        return Block::Subheading(rest.trim().to_string());
    }
    if let Some(rest) = line.strip_prefix("## ") {
        return Block::Heading(rest.trim().to_string());
    }
    if let Some(rest) = line.strip_prefix("# ") {
        return Block::Title(rest.trim().to_string());
    }
    for marker in ["- ", "* ", "\u{2022} "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Block::Bullet(rest.trim().to_string());
        }
    }
    Block::Text(line.to_string())
}

/// Remove `**` emphasis markers.
pub fn strip_emphasis(text: &str) -> String {
    text.replace("**", "")
}
