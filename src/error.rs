//! Error types for the edgequake-layout library.
//!
//! Failures come in two weights:
//!
//! * [`LayoutError`]: **Fatal for one document**: the file cannot be opened,
//!   is not a supported type, or the pipeline cannot be constructed. Returned
//!   as `Err(LayoutError)` from the `process*` entry points. In a batch run a
//!   fatal error only affects its own file.
//!
//! * [`PageError`]: **Non-fatal**: a page's detection, a single region's
//!   recognizer, the table pass, or an artifact write failed. The document
//!   still yields a [`crate::output::DocumentResult`] covering everything that
//!   succeeded; the failure is logged and recorded in
//!   [`crate::output::ProcessingOutput::failures`].
//!
//! Stage-specific errors ([`DetectionError`], [`RegionError`],
//! [`TableExtractionError`]) are what the pluggable backends return. The
//! pipeline converts each one into a [`PageError`] at its fault boundary.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-layout library.
#[derive(Debug, Error)]
pub enum LayoutError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The document could not be opened or rasterised.
    #[error(transparent)]
    DocumentOpen(#[from] DocumentOpenError),

    /// The file extension is outside the supported set.
    #[error("Unsupported file type '{extension}' for '{path}'")]
    UnsupportedFileType { path: PathBuf, extension: String },

    // ── Backend errors ────────────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    /// The configured vision provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The result store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Unreadable or corrupt input. Fatal for that document only.
#[derive(Debug, Error)]
pub enum DocumentOpenError {
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// The file has a `.pdf` extension but not the `%PDF` magic.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    #[error("PDF '{path}' is encrypted and requires a password.")]
    PasswordRequired { path: PathBuf },

    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium returned an error for a specific page (1-indexed).
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// A raster image input could not be decoded.
    #[error("Could not decode image '{path}': {detail}")]
    ImageDecode { path: PathBuf, detail: String },
}

/// Failure of the layout detector on one page.
#[derive(Debug, Clone, Error)]
pub enum DetectionError {
    #[error("detector backend failed: {0}")]
    Backend(String),

    #[error("detection timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("detector returned an unreadable answer: {0}")]
    MalformedResponse(String),
}

/// Failure of a single region's recognizer.
///
/// Caught by the router; the region is dropped and the page continues.
#[derive(Debug, Clone, Error)]
pub enum RegionError {
    #[error("recognizer backend failed: {0}")]
    Backend(String),

    #[error("recognizer timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The bounding box lies outside the page image after clamping.
    #[error("region crop is empty")]
    EmptyCrop,

    #[error("recognizer returned an unreadable answer: {0}")]
    MalformedResponse(String),
}

/// Failure of the whole-document table pass. The merge stage is skipped.
#[derive(Debug, Clone, Error)]
pub enum TableExtractionError {
    #[error("table extractor failed: {0}")]
    Backend(String),

    #[error("table extraction timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("table extractor returned an unreadable answer: {0}")]
    MalformedResponse(String),
}

/// A non-fatal failure recorded while processing one document.
///
/// `page` fields are 0-indexed, matching `page_info.page_no`.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    #[error("Page {page}: layout detection failed: {detail}")]
    Detection { page: usize, detail: String },

    #[error("Page {page}: {category_type} region at {poly:?} dropped: {detail}")]
    Region {
        page: usize,
        category_type: String,
        poly: Vec<i32>,
        detail: String,
    },

    #[error("Table extraction skipped: {detail}")]
    TableExtraction { detail: String },

    #[error("Artifact '{name}' could not be written: {detail}")]
    Artifact { name: String, detail: String },
}

/// Errors raised by a [`crate::storage::ResultStore`] or
/// [`crate::storage::ArtifactStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No stored result for project '{project}', file '{filename}'")]
    NotFound { project: String, filename: String },

    /// Keys become path components, so separators and `..` are rejected.
    #[error("Invalid store key '{0}'")]
    InvalidKey(String),

    #[error("Correction has {got} pages but the stored result has {expected}")]
    PageCountMismatch { expected: usize, got: usize },

    #[error("Page {page} has no layout entry {index}")]
    EntryOutOfRange { page: usize, index: usize },

    #[error("Store I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stored result is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_open_error_is_transparent() {
        let e: LayoutError = DocumentOpenError::FileNotFound {
            path: PathBuf::from("/tmp/missing.pdf"),
        }
        .into();
        assert!(e.to_string().contains("missing.pdf"), "got: {e}");
    }

    #[test]
    fn unsupported_file_type_display() {
        let e = LayoutError::UnsupportedFileType {
            path: PathBuf::from("clip.mkv"),
            extension: ".mkv".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains(".mkv"));
        assert!(msg.contains("clip.mkv"));
    }

    #[test]
    fn region_page_error_display() {
        let e = PageError::Region {
            page: 2,
            category_type: "isolated_formula".into(),
            poly: vec![1, 2, 3, 2, 3, 4, 1, 4],
            detail: RegionError::Timeout { secs: 30 }.to_string(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Page 2"));
        assert!(msg.contains("isolated_formula"));
        assert!(msg.contains("30s"));
    }

    #[test]
    fn page_error_serialises() {
        let e = PageError::TableExtraction {
            detail: "boom".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("TableExtraction"));
        let back: PageError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_string(), e.to_string());
    }

    #[test]
    fn page_count_mismatch_display() {
        let e = StoreError::PageCountMismatch {
            expected: 3,
            got: 2,
        };
        assert!(e.to_string().contains("2 pages"));
    }
}
