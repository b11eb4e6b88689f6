//! BRD export in TXT, RTF (also served as DOC), PDF and HTML.

pub mod error;
pub mod html;
pub mod markdown;
pub mod pdf;
pub mod rtf;

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

pub use error::ExportError;

/// Download formats offered for a generated BRD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Txt,
    Doc,
    Rtf,
    Pdf,
    Html,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 5] = [
        ExportFormat::Txt,
        ExportFormat::Doc,
        ExportFormat::Rtf,
        ExportFormat::Pdf,
        ExportFormat::Html,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Doc => "doc",
            ExportFormat::Rtf => "rtf",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Html => "html",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "text/plain; charset=utf-8",
            ExportFormat::Doc | ExportFormat::Rtf => "application/rtf",
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Html => "text/html; charset=utf-8",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        ExportFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == normalized)
            .ok_or_else(|| ExportError::UnknownFormat(s.trim().to_string()))
    }
}

/// A rendered file ready to be sent as an attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedDocument {
    pub format: ExportFormat,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ExportedDocument {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// `BRD_{first 8 chars of id}_{YYYYmmdd_HHMMSS}.{ext}`
pub fn export_filename(session_id: Uuid, generated: NaiveDateTime, format: ExportFormat) -> String {
    let id = session_id.to_string();
    format!(
        "BRD_{}_{}.{}",
        &id[..8],
        generated.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Render a BRD in the requested format.
///
/// A PDF request falls back to HTML when the text has characters the
/// WinAnsi fonts cannot show.
pub fn export(
    content: &str,
    session_id: Uuid,
    format: ExportFormat,
    generated: NaiveDateTime,
) -> Result<ExportedDocument, ExportError> {
    if content.trim().is_empty() {
        return Err(ExportError::EmptyDocument);
    }

    let format = if format == ExportFormat::Pdf && !pdf::is_representable(content) {
        warn!(session_id = %session_id, "BRD has characters outside WinAnsi, exporting HTML instead of PDF");
        ExportFormat::Html
    } else {
        format
    };

    let bytes = match format {
        ExportFormat::Txt => content.as_bytes().to_vec(),
        ExportFormat::Doc | ExportFormat::Rtf => rtf::render(content).into_bytes(),
        ExportFormat::Pdf => pdf::render(content),
        ExportFormat::Html => {
            html::render(content, &generated.format("%Y-%m-%d %H:%M:%S").to_string()).into_bytes()
        }
    };

    debug!(session_id = %session_id, format = %format, bytes = bytes.len(), "Exported BRD");

    Ok(ExportedDocument {
        format,
        filename: export_filename(session_id, generated, format),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const BRD: &str = "# Business Requirements Document\n\n## 1. Executive Summary\n- A bakery {online}\n";

    fn session() -> Uuid {
        Uuid::parse_str("1234abcd-0000-4000-8000-000000000000").unwrap()
    }

    fn generated() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(14, 5, 9)
            .unwrap()
    }

    // ========================================================================
    // Format parsing
    // ========================================================================

    #[test]
    fn test_parse_formats() {
        assert_eq!("txt".parse::<ExportFormat>().unwrap(), ExportFormat::Txt);
        assert_eq!(" PDF ".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert_eq!("Doc".parse::<ExportFormat>().unwrap(), ExportFormat::Doc);
        assert_eq!(
            "odt".parse::<ExportFormat>(),
            Err(ExportError::UnknownFormat("odt".into()))
        );
    }

    #[test]
    fn test_content_types() {
        assert_eq!(ExportFormat::Doc.content_type(), "application/rtf");
        assert_eq!(ExportFormat::Rtf.content_type(), "application/rtf");
        assert_eq!(ExportFormat::Pdf.content_type(), "application/pdf");
        assert!(ExportFormat::Txt.content_type().starts_with("text/plain"));
    }

    // ========================================================================
    // Export
    // ========================================================================

    #[test]
    fn test_filename() {
        assert_eq!(
            export_filename(session(), generated(), ExportFormat::Doc),
            "BRD_1234abcd_20260301_140509.doc"
        );
    }

    #[test]
    fn test_txt_is_verbatim() {
        let doc = export(BRD, session(), ExportFormat::Txt, generated()).unwrap();
        assert_eq!(doc.bytes, BRD.as_bytes());
        assert_eq!(doc.filename, "BRD_1234abcd_20260301_140509.txt");
    }

    #[test]
    fn test_doc_and_rtf_share_body() {
        let doc = export(BRD, session(), ExportFormat::Doc, generated()).unwrap();
        let rtf = export(BRD, session(), ExportFormat::Rtf, generated()).unwrap();
        assert_eq!(doc.bytes, rtf.bytes);
        assert!(doc.filename.ends_with(".doc"));
        assert!(rtf.filename.ends_with(".rtf"));
        let body = String::from_utf8(rtf.bytes).unwrap();
        assert!(body.contains("A bakery \\{online\\}"));
    }

    #[test]
    fn test_pdf() {
        let doc = export(BRD, session(), ExportFormat::Pdf, generated()).unwrap();
        assert_eq!(doc.format, ExportFormat::Pdf);
        assert!(doc.bytes.starts_with(b"%PDF-1.4"));
        assert_eq!(doc.content_type(), "application/pdf");
    }

    #[test]
    fn test_pdf_falls_back_to_html() {
        let doc = export("# \u{9762}\u{5305}\u{5e97}", session(), ExportFormat::Pdf, generated()).unwrap();
        assert_eq!(doc.format, ExportFormat::Html);
        assert!(doc.filename.ends_with(".html"));
        let body = String::from_utf8(doc.bytes).unwrap();
        assert!(body.contains("<h1>\u{9762}\u{5305}\u{5e97}</h1>"));
        assert!(body.contains("<strong>Generated:</strong> 2026-03-01 14:05:09"));
    }

    #[test]
    fn test_empty_document_rejected() {
        assert_eq!(
            export("  \n", session(), ExportFormat::Txt, generated()),
            Err(ExportError::EmptyDocument)
        );
    }
}
