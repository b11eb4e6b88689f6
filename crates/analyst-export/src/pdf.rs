//! Minimal PDF 1.4 writer for BRD documents.
//!
//! Text only: the standard Helvetica faces with WinAnsi encoding, US Letter
//! pages and one-inch margins. Markdown headings and bullets get their own
//! sizes; everything else is wrapped body text.

use crate::markdown::{self, Block};

const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 72.0;
const BULLET_INDENT: f32 = 14.0;
const BODY_SIZE: f32 = 11.0;
const LEADING: f32 = 1.35;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Style {
    font: Font,
    size: f32,
    space_before: f32,
}

const TITLE: Style = Style { font: Font::Bold, size: 18.0, space_before: 8.0 };
const HEADING: Style = Style { font: Font::Bold, size: 14.0, space_before: 10.0 };
const SUBHEADING: Style = Style { font: Font::Bold, size: 12.0, space_before: 6.0 };
const BODY: Style = Style { font: Font::Regular, size: BODY_SIZE, space_before: 0.0 };

/// True when every character has a WinAnsi code point.
pub fn is_representable(content: &str) -> bool {
    content
        .chars()
        .all(|c| c == '\n' || c == '\r' || c == '\t' || win_ansi(c).is_some())
}

/// Render `content` as a complete PDF file.
pub fn render(content: &str) -> Vec<u8> {
    let pages = layout(content);
    let mut writer = ObjectWriter::new();

    let kids = (0..pages.len())
        .map(|i| format!("{} 0 R", 5 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");
    writer.object(1, "<< /Type /Catalog /Pages 2 0 R >>");
    writer.object(
        2,
        &format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, pages.len()),
    );
    writer.object(
        3,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
    );
    writer.object(
        4,
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
    );

    for (i, stream) in pages.iter().enumerate() {
        let page_id = 5 + 2 * i;
        writer.object(
            page_id,
            &format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                PAGE_WIDTH,
                PAGE_HEIGHT,
                page_id + 1
            ),
        );
        writer.stream(page_id + 1, stream);
    }

    writer.finish()
}

// ============================================================================
// Layout
// ============================================================================

struct Layout {
    pages: Vec<String>,
    current: String,
    y: f32,
}

impl Layout {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: String::new(),
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn at_top(&self) -> bool {
        self.current.is_empty()
    }

    fn break_page(&mut self) {
        self.pages.push(std::mem::take(&mut self.current));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    /// Vertical gap, dropped at the top of a page.
    fn space(&mut self, height: f32) {
        if self.at_top() {
            return;
        }
        if self.y - height < MARGIN {
            self.break_page();
        } else {
            self.y -= height;
        }
    }

    fn line(&mut self, x: f32, style: Style, text: &str) {
        let height = style.size * LEADING;
        if self.y - height < MARGIN && !self.at_top() {
            self.break_page();
        }
        self.y -= height;
        self.current.push_str(&format!(
            "BT /{} {} Tf {:.2} {:.2} Td ({}) Tj ET\n",
            style.font.resource(),
            style.size,
            x,
            self.y,
            escape_text(text)
        ));
    }

    fn paragraph(&mut self, x: f32, style: Style, text: &str) {
        for line in wrap(text, style, PAGE_WIDTH - MARGIN - x) {
            self.line(x, style, &line);
        }
    }

    fn bullet(&mut self, text: &str) {
        let x = MARGIN + BULLET_INDENT;
        let lines = wrap(text, BODY, PAGE_WIDTH - MARGIN - x);
        for (i, line) in lines.iter().enumerate() {
            self.line(x, BODY, line);
            if i == 0 {
                // Same baseline as the first line of the item.
                self.current.push_str(&format!(
                    "BT /F1 {} Tf {:.2} {:.2} Td (\\225) Tj ET\n",
                    BODY_SIZE,
                    MARGIN + 2.0,
                    self.y
                ));
            }
        }
    }

    fn finish(mut self) -> Vec<String> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

fn layout(content: &str) -> Vec<String> {
    let mut layout = Layout::new();

    for block in markdown::parse(content) {
        match block {
            Block::Title(text) => heading(&mut layout, TITLE, &text),
            Block::Heading(text) => heading(&mut layout, HEADING, &text),
            Block::Subheading(text) => heading(&mut layout, SUBHEADING, &text),
            Block::Bullet(text) => layout.bullet(&markdown::strip_emphasis(&text)),
            Block::Text(text) => layout.paragraph(MARGIN, BODY, &markdown::strip_emphasis(&text)),
            Block::Blank => layout.space(BODY_SIZE * 0.6),
        }
    }

    layout.finish()
}

fn heading(layout: &mut Layout, style: Style, text: &str) {
    layout.space(style.space_before);
    layout.paragraph(MARGIN, style, &markdown::strip_emphasis(text));
}

/// Greedy word wrap. Words wider than the line are split by character.
fn wrap(text: &str, style: Style, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if text_width(&candidate, style) <= max_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        for c in word.chars() {
            current.push(c);
            if text_width(&current, style) > max_width {
                current.pop();
                lines.push(std::mem::take(&mut current));
                current.push(c);
            }
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn text_width(text: &str, style: Style) -> f32 {
    let units: u32 = text.chars().map(char_width).sum();
    let scale = match style.font {
        Font::Regular => 1.0,
        Font::Bold => 1.06,
    };
    units as f32 * style.size * scale / 1000.0
}

// Approximate Helvetica advance widths in 1/1000 em.
fn char_width(c: char) -> u32 {
    match c {
        'i' | 'j' | 'l' => 222,
        ' ' | '!' | '.' | ',' | ':' | ';' | 'f' | 't' | 'I' | '/' | '\'' => 278,
        'r' | '(' | ')' | '-' => 333,
        'm' | 'M' => 833,
        'w' => 722,
        'W' => 944,
        'A'..='Z' => 667,
        _ => 556,
    }
}

// ============================================================================
// Encoding
// ============================================================================

fn win_ansi(c: char) -> Option<u8> {
    match c {
        ' '..='~' | '\u{a0}'..='\u{ff}' => Some(c as u32 as u8),
        '\u{20ac}' => Some(0x80),
        '\u{2026}' => Some(0x85),
        '\u{2018}' => Some(0x91),
        '\u{2019}' => Some(0x92),
        '\u{201c}' => Some(0x93),
        '\u{201d}' => Some(0x94),
        '\u{2022}' => Some(0x95),
        '\u{2013}' => Some(0x96),
        '\u{2014}' => Some(0x97),
        '\u{2122}' => Some(0x99),
        _ => None,
    }
}

/// Body of a PDF literal string. Bytes above 0x7F are octal escapes so
/// content streams stay ASCII.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match win_ansi(c) {
            Some(b'(') => out.push_str("\\("),
            Some(b')') => out.push_str("\\)"),
            Some(b'\\') => out.push_str("\\\\"),
            Some(b) if b < 0x80 => out.push(b as char),
            Some(b) => out.push_str(&format!("\\{:03o}", b)),
            None if c == '\t' => out.push(' '),
            None => out.push('?'),
        }
    }
    out
}

// ============================================================================
// File structure
// ============================================================================

struct ObjectWriter {
    buf: Vec<u8>,
    offsets: Vec<usize>,
}

impl ObjectWriter {
    fn new() -> Self {
        let mut buf = b"%PDF-1.4\n".to_vec();
        // Binary marker so transfer tools treat the file as binary.
        buf.extend_from_slice(b"%\xe2\xe3\xcf\xd3\n");
        Self { buf, offsets: Vec::new() }
    }

    fn object(&mut self, id: usize, body: &str) {
        debug_assert_eq!(id, self.offsets.len() + 1);
        self.offsets.push(self.buf.len());
        self.buf
            .extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", id, body).as_bytes());
    }

    fn stream(&mut self, id: usize, data: &str) {
        self.object(
            id,
            &format!("<< /Length {} >>\nstream\n{}\nendstream", data.len(), data),
        );
    }

    fn finish(mut self) -> Vec<u8> {
        let xref = self.buf.len();
        let size = self.offsets.len() + 1;
        let mut tail = format!("xref\n0 {}\n0000000000 65535 f \n", size);
        for offset in &self.offsets {
            tail.push_str(&format!("{:010} 00000 n \n", offset));
        }
        tail.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            size, xref
        ));
        self.buf.extend_from_slice(tail.as_bytes());
        self.buf
    }
}
