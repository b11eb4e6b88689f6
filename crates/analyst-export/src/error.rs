//! Error types for document export.

use analyst_core::error::AnalystError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExportError {
    #[error("unsupported export format: {0} (expected txt, doc, rtf, pdf or html)")]
    UnknownFormat(String),
    #[error("nothing to export")]
    EmptyDocument,
}

impl From<ExportError> for AnalystError {
    fn from(err: ExportError) -> Self {
        AnalystError::Export(err.to_string())
    }
}
