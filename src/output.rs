//! Result types returned by the ingestion pipeline.

use crate::error::UploadError;
use crate::model::CatalogItem;
use serde::Serialize;

/// Aggregate verdict for one batch.
///
/// Only this value decides what happens to the pending queue: `Success`
/// consumes the processed uploads, `NoItemsDetected` leaves them for a retry
/// with clearer photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Success,
    NoItemsDetected,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Success)
    }
}

/// Outcome of processing a single upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    /// 1-indexed position in the batch.
    pub upload_num: usize,
    pub upload_id: String,
    pub label: String,
    /// Items synthesised from this upload, in region order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<CatalogItem>,
    /// Regions the oracle reported, including skipped ones.
    pub regions_detected: usize,
    /// Regions that could not be cropped.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_regions: Vec<UploadError>,
    /// Decode or oracle failure; `None` when recognition ran.
    pub error: Option<UploadError>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
}

impl UploadResult {
    pub(crate) fn new(upload_num: usize, upload_id: &str, label: &str) -> Self {
        Self {
            upload_num,
            upload_id: upload_id.to_string(),
            label: label.to_string(),
            items: Vec::new(),
            regions_detected: 0,
            skipped_regions: Vec::new(),
            error: None,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
        }
    }

    pub fn items_created(&self) -> usize {
        self.items.len()
    }
}

/// Diagnostic counters for a batch. None of these affect the outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub total_uploads: usize,
    /// Uploads actually attempted (less than the total after a cancellation).
    pub processed_uploads: usize,
    /// Uploads that could not be decoded as images.
    pub decode_failures: usize,
    /// Uploads whose normalised image could not be re-encoded.
    pub encode_failures: usize,
    pub oracle_failures: usize,
    /// Uploads recognised fine but whose regions could not be cropped at all.
    pub crop_failures: usize,
    /// Uploads where the oracle answered but reported nothing usable.
    pub empty_detections: usize,
    pub skipped_regions: usize,
    pub items_created: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub cancelled: bool,
}

impl BatchStats {
    pub(crate) fn record(&mut self, result: &UploadResult) {
        self.processed_uploads += 1;
        // Cropping only runs once the oracle reported regions, so an image
        // error with regions present belongs to the crop stage.
        match &result.error {
            Some(UploadError::OracleUnavailable { .. }) => self.oracle_failures += 1,
            Some(_) if result.regions_detected > 0 => self.crop_failures += 1,
            Some(UploadError::Decode { .. }) => self.decode_failures += 1,
            Some(UploadError::Encode { .. }) => self.encode_failures += 1,
            Some(UploadError::DegenerateRegion { .. }) => self.crop_failures += 1,
            None if result.regions_detected == 0 => self.empty_detections += 1,
            None => {}
        }
        self.skipped_regions += result.skipped_regions.len();
        self.items_created += result.items.len();
        self.total_input_tokens += result.input_tokens as u64;
        self.total_output_tokens += result.output_tokens as u64;
    }
}

/// Everything one batch produced.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// All synthesised items, in upload order then region order.
    pub items: Vec<CatalogItem>,
    pub outcome: BatchOutcome,
    /// Per-upload details; `items` are moved into the top-level list.
    pub uploads: Vec<UploadResult>,
    pub stats: BatchStats,
}

impl BatchReport {
    /// Fold per-upload results into a report.
    pub(crate) fn assemble(mut uploads: Vec<UploadResult>, mut stats: BatchStats) -> Self {
        let items: Vec<CatalogItem> = uploads
            .iter_mut()
            .flat_map(|u| std::mem::take(&mut u.items))
            .collect();
        stats.items_created = items.len();
        let outcome = if items.is_empty() {
            BatchOutcome::NoItemsDetected
        } else {
            BatchOutcome::Success
        };
        Self {
            items,
            outcome,
            uploads,
            stats,
        }
    }

    /// Ids of uploads that were attempted in this batch.
    pub fn processed_ids(&self) -> impl Iterator<Item = &str> {
        self.uploads.iter().map(|u| u.upload_id.as_str())
    }
}

/// Result of [`crate::ingest::Ingestor::enqueue`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnqueueReport {
    /// Ids of uploads accepted into the pending queue.
    pub queued: Vec<String>,
    /// Uploads rejected because they could not be decoded.
    pub failures: Vec<UploadError>,
}
