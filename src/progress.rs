//! Progress-callback trait for per-upload ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through the queue. Callers can forward them
//! to a channel, a WebSocket or a terminal progress bar without the library
//! knowing how the host application communicates.
//!
//! Uploads are processed strictly one after another, so events for a batch
//! arrive in order: `on_upload_start(n)` is always followed by exactly one of
//! `on_upload_complete(n)` / `on_upload_error(n)` before `n + 1` starts.
//!
//! # Example
//!
//! ```rust
//! use wardrobe_ingest::{IngestConfig, IngestProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     items: Arc<AtomicUsize>,
//! }
//!
//! impl IngestProgressCallback for CountingCallback {
//!     fn on_upload_complete(&self, upload_num: usize, total: usize, items: usize) {
//!         self.items.fetch_add(items, Ordering::SeqCst);
//!         eprintln!("photo {upload_num}/{total}: {items} items");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     items: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = IngestConfig::builder()
//!     .progress_callback(counter as Arc<dyn IngestProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Called by the ingestion pipeline as it processes each upload.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `upload_num` is 1-indexed.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once before the first upload is touched.
    fn on_batch_start(&self, total_uploads: usize) {
        let _ = total_uploads;
    }

    /// Called before an upload is normalised / sent to the oracle.
    fn on_upload_start(&self, upload_num: usize, total_uploads: usize) {
        let _ = (upload_num, total_uploads);
    }

    /// Called when an upload has been fully resolved (possibly with zero items).
    fn on_upload_complete(&self, upload_num: usize, total_uploads: usize, items_created: usize) {
        let _ = (upload_num, total_uploads, items_created);
    }

    /// Called when an upload failed to decode or the oracle was unreachable.
    fn on_upload_error(&self, upload_num: usize, total_uploads: usize, error: &str) {
        let _ = (upload_num, total_uploads, error);
    }

    /// Called for each detected region that could not be cropped.
    fn on_region_skipped(&self, upload_num: usize, region: usize, reason: &str) {
        let _ = (upload_num, region, reason);
    }

    /// Called once after the last upload (or after a cancellation).
    fn on_batch_complete(&self, total_uploads: usize, items_created: usize) {
        let _ = (total_uploads, items_created);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;

/// Lock-free `(processed, total)` counter readable while a batch runs.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    processed: AtomicUsize,
    total: AtomicUsize,
}

impl ProgressCounter {
    pub fn reset(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.processed.store(0, Ordering::SeqCst);
    }

    pub fn advance(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    /// `(processed_count, total_count)`.
    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.processed.load(Ordering::SeqCst),
            self.total.load(Ordering::SeqCst),
        )
    }
}
