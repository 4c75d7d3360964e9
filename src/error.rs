//! Error types for the edgequake-statements library.
//!
//! Three layers reflect three distinct failure scopes:
//!
//! * [`StatementError`] : **Fatal**: the call cannot proceed at all (input
//!   not found, recognition backend unavailable, document undecodable).
//!   Returned as `Err(StatementError)` from the outer `extract*` functions.
//!
//! * [`PageError`] : **Per page**: one page could not be recognised (backend
//!   failure, timeout) but every other page is fine.
//!
//! * [`RowError`] : **Per row**: one candidate table row was discarded
//!   (no ISIN, bad checksum, unreadable amount).
//!
//! Page and row errors never abort a run. They are flattened into
//! [`ErrorEntry`] values inside [`crate::output::ExtractionResult`] so
//! callers see a `success` / `partial` / `failed` status instead of an
//! exception for anything that rasterises.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-statements library.
#[derive(Debug, Error)]
pub enum StatementError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Statement file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Document errors ───────────────────────────────────────────────────
    /// The bytes are not a valid document of the declared format.
    #[error("Cannot decode '{source_name}': {detail}")]
    DocumentDecode { source_name: String, detail: String },

    /// The document decoded but yielded zero pages (or zero selected pages).
    #[error("Document '{source_name}' has no pages to process")]
    EmptyDocument { source_name: String },

    /// PDF requires a password but none was provided.
    #[error("Document '{source_name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { source_name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for document '{source_name}'")]
    WrongPassword { source_name: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Recognition backend errors ────────────────────────────────────────
    /// The configured vision provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The recognition backend could not be acquired (binary missing, etc.).
    #[error("Recognition backend '{backend}' is unavailable: {detail}")]
    BackendUnavailable { backend: String, detail: String },

    // ── Aggregation ───────────────────────────────────────────────────────
    /// Every page errored; there is nothing to aggregate.
    #[error("All {total} pages failed; no usable data.\nFirst error: {first_error}")]
    Aggregation { total: usize, first_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library next to the\n\
executable, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StatementError {
    /// The taxonomy kind reported in a `failed` result, when this error is
    /// a document-level failure rather than a call-level one.
    pub fn document_kind(&self) -> Option<ErrorKind> {
        match self {
            StatementError::DocumentDecode { .. }
            | StatementError::PasswordRequired { .. }
            | StatementError::WrongPassword { .. }
            | StatementError::RasterisationFailed { .. } => Some(ErrorKind::DocumentDecode),
            StatementError::EmptyDocument { .. } => Some(ErrorKind::EmptyDocument),
            StatementError::Aggregation { .. } => Some(ErrorKind::Aggregation),
            _ => None,
        }
    }
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum PageError {
    /// The backend could not process the page image.
    #[error("Page {page}: recognition failed: {detail}")]
    Recognition { page: usize, detail: String },

    /// Recognition did not finish within the per-page timeout.
    #[error("Page {page}: recognition timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },
}

impl PageError {
    pub fn page(&self) -> usize {
        match self {
            PageError::Recognition { page, .. } | PageError::Timeout { page, .. } => *page,
        }
    }
}

/// A non-fatal error for one candidate table row.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RowError {
    /// No usable ISIN (missing, malformed or failing its checksum), or no name.
    #[error("Page {page}: row rejected ({reason}): {row:?}")]
    RowParse {
        page: usize,
        row: String,
        reason: String,
    },

    /// Quantity or market value could not be read as a number.
    #[error("Page {page}: unreadable amount ({reason}): {row:?}")]
    NumericParse {
        page: usize,
        row: String,
        reason: String,
    },
}

/// Error taxonomy as reported in the `errors[*].kind` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "DocumentDecodeError")]
    DocumentDecode,
    #[serde(rename = "EmptyDocumentError")]
    EmptyDocument,
    #[serde(rename = "RecognitionError")]
    Recognition,
    #[serde(rename = "TimeoutError")]
    Timeout,
    #[serde(rename = "RowParseError")]
    RowParse,
    #[serde(rename = "NumericParseError")]
    NumericParse,
    #[serde(rename = "AggregationError")]
    Aggregation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::DocumentDecode => "DocumentDecodeError",
            ErrorKind::EmptyDocument => "EmptyDocumentError",
            ErrorKind::Recognition => "RecognitionError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::RowParse => "RowParseError",
            ErrorKind::NumericParse => "NumericParseError",
            ErrorKind::Aggregation => "AggregationError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the result's `errors` list.
///
/// `page` is 1-based; document-level failures use page `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub page: usize,
    pub kind: ErrorKind,
    pub detail: String,
}

impl ErrorEntry {
    /// Top-level entry for a fatal document error.
    pub fn document(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            page: 0,
            kind,
            detail: detail.into(),
        }
    }
}

impl From<&PageError> for ErrorEntry {
    fn from(e: &PageError) -> Self {
        let kind = match e {
            PageError::Recognition { .. } => ErrorKind::Recognition,
            PageError::Timeout { .. } => ErrorKind::Timeout,
        };
        Self {
            page: e.page(),
            kind,
            detail: e.to_string(),
        }
    }
}

impl From<&RowError> for ErrorEntry {
    fn from(e: &RowError) -> Self {
        let (page, kind) = match e {
            RowError::RowParse { page, .. } => (*page, ErrorKind::RowParse),
            RowError::NumericParse { page, .. } => (*page, ErrorKind::NumericParse),
        };
        Self {
            page,
            kind,
            detail: e.to_string(),
        }
    }
}

/// Failure reported by an [`crate::pipeline::ocr::OcrBackend`] for one image.
///
/// The pipeline wraps it into [`PageError::Recognition`] with the page index.
#[derive(Debug, Clone, Error)]
#[error("{backend}: {detail}")]
pub struct RecognitionError {
    pub backend: String,
    pub detail: String,
}

impl RecognitionError {
    pub fn new(backend: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregation_display() {
        let e = StatementError::Aggregation {
            total: 3,
            first_error: "Page 1: recognition failed: boom".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("All 3 pages"), "got: {msg}");
        assert!(msg.contains("boom"));
    }

    #[test]
    fn timeout_entry_kind() {
        let e = PageError::Timeout { page: 2, secs: 30 };
        let entry = ErrorEntry::from(&e);
        assert_eq!(entry.page, 2);
        assert_eq!(entry.kind, ErrorKind::Timeout);
        assert!(entry.detail.contains("30s"));
    }

    #[test]
    fn kind_serialises_to_taxonomy_name() {
        let entry = ErrorEntry {
            page: 4,
            kind: ErrorKind::NumericParse,
            detail: "x".into(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"NumericParseError\""), "got: {json}");
    }

    #[test]
    fn document_errors_map_to_kinds() {
        let decode = StatementError::DocumentDecode {
            source_name: "a.pdf".into(),
            detail: "bad xref".into(),
        };
        assert_eq!(decode.document_kind(), Some(ErrorKind::DocumentDecode));
        let empty = StatementError::EmptyDocument {
            source_name: "a.pdf".into(),
        };
        assert_eq!(empty.document_kind(), Some(ErrorKind::EmptyDocument));
        let cfg = StatementError::InvalidConfig("x".into());
        assert_eq!(cfg.document_kind(), None);
        let host = StatementError::PdfiumBindingFailed("libpdfium.so not found".into());
        assert_eq!(host.document_kind(), None);
    }
}
