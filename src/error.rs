//! Error types for the promo-catalog library.
//!
//! Failures fall into two groups with very different blast radii:
//!
//! * [`CatalogError`] — **Fatal**: the upload or export cannot proceed at all
//!   (unreadable file, required columns missing, zero usable rows). Returned as
//!   `Err(CatalogError)` from the top-level `build_*` functions. No partial
//!   catalog is ever produced.
//!
//! * [`ImageError`], [`ShortenError`] — **Non-fatal**: a single image fetch
//!   or a link-shortening call failed. Image errors drive the fallback state
//!   machine to its next strategy; shortening errors fall back to the long
//!   share link. Neither is surfaced to the user directly.
//!
//! Row-level tolerance (blank SKU/Name rows, unparsable prices) is not an
//! error at all: such rows are skipped or coerced and only counted in
//! [`crate::pipeline::schema::SheetExtraction`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the promo-catalog library.
#[derive(Debug, Error)]
pub enum CatalogError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Spreadsheet not found: '{path}'\nCheck the path exists and is readable.")]
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

    /// File extension is not one of the supported spreadsheet formats.
    #[error("Unsupported spreadsheet format for '{path}'\nExpected .xlsx, .xls, .xlsb, .ods or .csv")]
    UnsupportedFormat { path: PathBuf },

    /// The workbook could not be parsed.
    #[error("Spreadsheet '{path}' is unreadable: {detail}")]
    SpreadsheetUnreadable { path: PathBuf, detail: String },

    /// The workbook parsed but contains no rows.
    #[error("Spreadsheet '{path}' appears empty or unreadable")]
    EmptySpreadsheet { path: PathBuf },

    // ── Schema errors ─────────────────────────────────────────────────────
    /// Required columns are missing or no product rows survived filtering.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    // ── Shared-state errors ───────────────────────────────────────────────
    /// Even the compact share link is longer than the configured ceiling.
    #[error(
        "The catalog is too large to share as a link ({len} > {limit} characters).\n\
Reduce the number of products or export the document instead."
    )]
    ShareStateTooLarge { len: usize, limit: usize },

    /// A share link or token could not be decoded.
    #[error("Shared catalog data is invalid: {0}")]
    ShareStateInvalid(String),

    // ── Export errors ─────────────────────────────────────────────────────
    /// The document-capture collaborator failed.
    #[error("Document capture failed: {0}")]
    CaptureFailed(#[from] CaptureError),

    /// Could not create or write an output file.
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

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The upload cannot be mapped onto the catalog schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// One or more of SKU, Name and Price could not be located.
    #[error(
        "Could not find required columns: {}.\n\
Please ensure your spreadsheet has headers like 'SKU', 'Name', and 'Price'.",
        .missing.join(", ")
    )]
    MissingColumns { missing: Vec<&'static str> },

    /// Every data row was blank, a spacer, or a directive row.
    #[error("No valid product rows found in the file.")]
    NoValidRows,
}

/// A single image fetch attempt failed.
///
/// Consumed by the resolution state machine as a `Failed` event; never
/// propagated to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImageError {
    /// Server answered with a non-success status.
    #[error("HTTP {status} for '{url}'")]
    Status { url: String, status: u16 },

    /// Connection, TLS or body-read failure.
    #[error("Transport error for '{url}': {detail}")]
    Transport { url: String, detail: String },

    /// The attempt exceeded the fetch timeout.
    #[error("Timed out after {secs}s fetching '{url}'")]
    Timeout { url: String, secs: u64 },

    /// Credentialed attempt got no permissive `Access-Control-Allow-Origin`.
    #[error("Cross-origin access denied for '{url}'")]
    CorsRejected { url: String },

    /// The body exceeds the per-image byte ceiling.
    #[error("Image at '{url}' is larger than {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    /// The body is not an image (typically an HTML interstitial page).
    #[error("Response from '{url}' is not an image (content-type: {content_type})")]
    NotAnImage { url: String, content_type: String },
}

/// The link-shortening call failed; callers fall back to the long link.
#[derive(Debug, Clone, Error)]
#[error("Link shortening unavailable: {0}")]
pub struct ShortenError(pub String);

/// The external document-capture collaborator failed.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CaptureError(pub String);
