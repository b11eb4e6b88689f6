//! Rich Text Format rendering. Word opens the output, so it also serves
//! the `.doc` download.

const HEADER: &str = "{\\rtf1\\ansi\\deff0 {\\fonttbl {\\f0 Times New Roman;}}\\margl1440\\margr1440\\margt1440\\margb1440\\pard\\f0\\fs24 ";

/// Render plain text as a single-font RTF document.
///
/// `\`, `{` and `}` are escaped, line breaks become paragraphs and
/// non-ASCII characters are written as `\uN?` escapes.
pub fn render(content: &str) -> String {
    let mut out = String::with_capacity(HEADER.len() + content.len() + 16);
    out.push_str(HEADER);

    for c in content.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '\n' => out.push_str("\\par "),
            '\r' => {}
            '\t' => out.push_str("\\tab "),
            c if c.is_ascii() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    // RTF takes signed 16-bit values.
                    out.push_str(&format!("\\u{}?", *unit as i16));
                }
            }
        }
    }

    out.push('}');
    out
}
