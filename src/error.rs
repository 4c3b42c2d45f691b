use std::path::PathBuf;

/// Failures the extraction pipeline can hit. None of them abort a batch:
/// callers log and skip the affected page, document or identifier.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("cannot read document {path}: {reason}")]
    DocumentUnreadable { path: PathBuf, reason: String },
    #[error("page {page} of {path} yielded no text: {reason}")]
    PageExtractionFailed {
        path: PathBuf,
        page: usize,
        reason: String,
    },
    #[error("no document found for identifier {0}")]
    NoDocumentForIdentifier(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExtractError>;
