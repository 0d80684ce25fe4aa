//! Error types for the wardrobe-ingest library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`WardrobeError`]: **Fatal**: the requested operation cannot proceed
//!   at all (input file missing, provider not configured, catalog file
//!   unreadable, a batch already running). Returned as `Err(WardrobeError)`.
//!
//! * [`UploadError`]: **Non-fatal**: a single photo or a single detected
//!   region failed (corrupt file, oracle unreachable, degenerate box) while
//!   the rest of the batch carries on. Stored inside
//!   [`crate::output::UploadResult`] so callers can see what was skipped.
//!
//! A batch never turns an `UploadError` into a `WardrobeError`; only the
//! aggregate [`crate::output::BatchOutcome`] is user-visible.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the wardrobe-ingest library.
#[derive(Debug, Error)]
pub enum WardrobeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
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

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API call failed outright.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    // ── Queue errors ──────────────────────────────────────────────────────
    /// The pending queue cannot change while a batch is being processed.
    #[error("A batch is already in flight; wait for it to finish")]
    BatchInFlight,

    /// No pending upload carries this identifier.
    #[error("No pending upload with id '{id}'")]
    UploadNotFound { id: String },

    // ── Catalog errors ────────────────────────────────────────────────────
    /// No catalog item carries this identifier.
    #[error("No wardrobe item with id '{id}'")]
    ItemNotFound { id: String },

    /// No saved shopping suggestion carries this identifier.
    #[error("No shopping suggestion with id '{id}'")]
    ProductNotFound { id: String },

    /// The catalog file exists but is not a valid catalog document.
    #[error("Catalog '{path}' is corrupt: {detail}")]
    CatalogCorrupt { path: PathBuf, detail: String },

    /// Could not read or write the catalog file.
    #[error("Catalog I/O failed for '{path}': {source}")]
    CatalogIo {
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

/// A non-fatal error for a single upload or a single detected region.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum UploadError {
    /// The upload could not be decoded as an image.
    #[error("Upload {upload}: could not decode image: {detail}")]
    Decode { upload: String, detail: String },

    /// Re-encoding a normalised image or crop failed.
    #[error("Upload {upload}: could not encode image: {detail}")]
    Encode { upload: String, detail: String },

    /// The recognition oracle could not be reached or timed out.
    #[error("Upload {upload}: recognition oracle unavailable: {detail}")]
    OracleUnavailable { upload: String, detail: String },

    /// A detected box collapsed to zero area and was skipped.
    #[error("Upload {upload}: region {region} is degenerate and was skipped")]
    DegenerateRegion { upload: String, region: usize },
}

impl UploadError {
    /// Identifier of the upload this error belongs to.
    pub fn upload_id(&self) -> &str {
        match self {
            UploadError::Decode { upload, .. }
            | UploadError::Encode { upload, .. }
            | UploadError::OracleUnavailable { upload, .. }
            | UploadError::DegenerateRegion { upload, .. } => upload,
        }
    }
}
