//! Batch ingestion: pending queue → normalise → recognise → crop → items.
//!
//! Two entry points share one per-upload routine:
//!
//! * [`ingest`]: stateless; takes a list of raw uploads and returns a
//!   [`BatchReport`].
//! * [`Ingestor`]: the caller-facing handle with a pending queue, live
//!   progress, cancellation and the "clear only on success" rule.
//!
//! ## Why strictly sequential?
//!
//! Uploads are processed one at a time, in queue order. The oracle is a
//! rate-limited remote service, and a single in-flight request keeps
//! progress reporting trivially deterministic: `(processed, total)` only
//! ever moves forward by one. Use [`crate::stream::ingest_stream`] when the
//! caller wants each upload's items as soon as they exist.
//!
//! ## Failure isolation
//!
//! Nothing that goes wrong with one upload or one region aborts the batch.
//! Decode and oracle failures are recorded on the upload's
//! [`UploadResult`]; degenerate regions are recorded and skipped. Whether the
//! batch "worked" is decided once, at the end: any items at all means
//! [`BatchOutcome::Success`].

use crate::config::IngestConfig;
use crate::error::{UploadError, WardrobeError};
use crate::model::CatalogItem;
use crate::output::{BatchOutcome, BatchReport, BatchStats, EnqueueReport, UploadResult};
use crate::pipeline::crop::crop_regions_blocking;
use crate::pipeline::input::{resolve_upload, RawUpload};
use crate::pipeline::normalize::{normalize_upload, NormalizedImage};
use crate::pipeline::recognize::{recognize, resolve_oracle, Oracle};
use crate::progress::ProgressCounter;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where an upload is in the pipeline when it reaches [`process_upload`].
pub(crate) enum UploadStage<'a> {
    /// Still needs decoding and normalising.
    Raw(&'a RawUpload),
    /// Already normalised at enqueue time.
    Ready(&'a NormalizedImage),
}

/// Run one upload through recognition and cropping.
///
/// Never fails: every problem is recorded on the returned [`UploadResult`].
pub(crate) async fn process_upload(
    oracle: &dyn Oracle,
    upload_num: usize,
    total: usize,
    upload_id: &str,
    label: &str,
    stage: UploadStage<'_>,
    config: &IngestConfig,
) -> UploadResult {
    let start = Instant::now();
    let mut result = UploadResult::new(upload_num, upload_id, label);
    let cb = config.progress_callback.as_ref();

    if let Some(cb) = cb {
        cb.on_upload_start(upload_num, total);
    }

    let outcome = run_stages(oracle, upload_num, upload_id, stage, config, &mut result).await;
    result.duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(()) => {
            debug!(
                "Upload {} ({}): {} regions, {} items, {}ms",
                upload_num,
                upload_id,
                result.regions_detected,
                result.items.len(),
                result.duration_ms
            );
            if let Some(cb) = cb {
                cb.on_upload_complete(upload_num, total, result.items.len());
            }
        }
        Err(e) => {
            warn!("Upload {} ({}) yielded nothing: {}", upload_num, upload_id, e);
            if let Some(cb) = cb {
                cb.on_upload_error(upload_num, total, &e.to_string());
            }
            result.error = Some(e);
        }
    }
    result
}

async fn run_stages(
    oracle: &dyn Oracle,
    upload_num: usize,
    upload_id: &str,
    stage: UploadStage<'_>,
    config: &IngestConfig,
    result: &mut UploadResult,
) -> Result<(), UploadError> {
    let image: Cow<'_, NormalizedImage> = match stage {
        UploadStage::Ready(img) => Cow::Borrowed(img),
        UploadStage::Raw(raw) => Cow::Owned(normalize_upload(raw, config).await?),
    };

    let recognition = recognize(oracle, upload_id, &image, config).await?;
    result.input_tokens = recognition.input_tokens;
    result.output_tokens = recognition.output_tokens;
    result.regions_detected = recognition.candidates.len();

    if recognition.candidates.is_empty() {
        info!("Upload {} ({}): no clothing detected", upload_num, upload_id);
        return Ok(());
    }

    let boxes = recognition.candidates.iter().map(|c| c.region()).collect();
    let crops = crop_regions_blocking(&image, boxes, config, upload_id).await?;

    for (descriptor, cropped) in recognition.candidates.iter().zip(crops) {
        match cropped {
            Ok(crop) => result.items.push(CatalogItem::synthesize(descriptor, &crop)),
            Err(e) => {
                let region = match &e {
                    UploadError::DegenerateRegion { region, .. } => *region,
                    _ => result.skipped_regions.len(),
                };
                warn!("Upload {} region {} skipped: {}", upload_num, region, e);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_region_skipped(upload_num, region, &e.to_string());
                }
                result.skipped_regions.push(e);
            }
        }
    }
    Ok(())
}

struct Job<'a> {
    id: &'a str,
    label: &'a str,
    stage: UploadStage<'a>,
}

/// Shared batch loop for [`ingest`] and [`Ingestor::run`].
async fn run_batch(
    jobs: Vec<Job<'_>>,
    oracle: &dyn Oracle,
    config: &IngestConfig,
    cancel: Option<&AtomicBool>,
    counter: Option<&ProgressCounter>,
) -> BatchReport {
    let start = Instant::now();
    let total = jobs.len();
    let mut stats = BatchStats {
        total_uploads: total,
        ..Default::default()
    };

    if let Some(counter) = counter {
        counter.reset(total);
    }

    if total == 0 {
        info!("Ingestion queue is empty, nothing to do");
        return BatchReport::assemble(Vec::new(), stats);
    }

    info!("Starting ingestion of {} uploads via '{}'", total, oracle.name());
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut uploads = Vec::with_capacity(total);
    for (idx, job) in jobs.into_iter().enumerate() {
        if cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
            info!("Ingestion cancelled before upload {}/{}", idx + 1, total);
            stats.cancelled = true;
            break;
        }
        let result = process_upload(oracle, idx + 1, total, job.id, job.label, job.stage, config).await;
        stats.record(&result);
        uploads.push(result);
        if let Some(counter) = counter {
            counter.advance();
        }
    }

    stats.total_duration_ms = start.elapsed().as_millis() as u64;
    let report = BatchReport::assemble(uploads, stats);

    info!(
        "Ingestion complete: {} items from {}/{} uploads ({} decode, {} encode, {} oracle, {} crop failures, {} skipped regions), {}ms",
        report.stats.items_created,
        report.stats.processed_uploads,
        total,
        report.stats.decode_failures,
        report.stats.encode_failures,
        report.stats.oracle_failures,
        report.stats.crop_failures,
        report.stats.skipped_regions,
        report.stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, report.stats.items_created);
    }
    report
}

/// Ingest a list of raw uploads in order.
///
/// Per-upload and per-region problems never surface as errors; inspect
/// `report.stats` and `report.uploads` for diagnostics. An empty list yields
/// [`BatchOutcome::NoItemsDetected`] without calling the oracle.
///
/// # Example
/// ```rust,no_run
/// use wardrobe_ingest::{ingest, resolve_oracle, IngestConfig, RawUpload};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = IngestConfig::default();
/// let oracle = resolve_oracle(&config)?;
/// let uploads = vec![RawUpload::from_bytes("closet.jpg", std::fs::read("closet.jpg")?)];
/// let report = ingest(&uploads, oracle.as_ref(), &config).await;
/// println!("{:?}: {} items", report.outcome, report.items.len());
/// # Ok(())
/// # }
/// ```
pub async fn ingest(uploads: &[RawUpload], oracle: &dyn Oracle, config: &IngestConfig) -> BatchReport {
    let jobs = uploads
        .iter()
        .map(|u| Job {
            id: &u.id,
            label: &u.label,
            stage: UploadStage::Raw(u),
        })
        .collect();
    run_batch(jobs, oracle, config, None, None).await
}

/// A normalised upload waiting in the queue.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub id: String,
    pub label: String,
    pub image: NormalizedImage,
}

/// Requests that a running batch stop before its next upload.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Clears the in-flight flag on every exit path of [`Ingestor::run`].
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Pending-queue front end to the ingestion pipeline.
///
/// `Ingestor` is `Send + Sync`; wrap it in an `Arc` to enqueue, observe
/// progress or cancel from other tasks while [`run`](Self::run) is active.
pub struct Ingestor {
    oracle: Arc<dyn Oracle>,
    config: IngestConfig,
    queue: Mutex<Vec<PendingUpload>>,
    running: AtomicBool,
    cancel: CancelHandle,
    progress: ProgressCounter,
}

impl Ingestor {
    pub fn new(oracle: Arc<dyn Oracle>, config: IngestConfig) -> Self {
        Self {
            oracle,
            config,
            queue: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            cancel: CancelHandle::default(),
            progress: ProgressCounter::default(),
        }
    }

    /// Build an ingestor whose oracle is resolved from `config` and the environment.
    pub fn from_config(config: IngestConfig) -> Result<Self, WardrobeError> {
        let oracle = resolve_oracle(&config)?;
        Ok(Self::new(oracle, config))
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    fn queue(&self) -> MutexGuard<'_, Vec<PendingUpload>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Normalise each upload and append the good ones to the queue.
    ///
    /// Undecodable files are reported in the returned [`EnqueueReport`],
    /// not raised. Enqueueing while a batch runs is allowed; the new uploads
    /// wait for the next run.
    pub async fn enqueue(&self, files: Vec<RawUpload>) -> EnqueueReport {
        let mut report = EnqueueReport::default();
        for raw in files {
            match normalize_upload(&raw, &self.config).await {
                Ok(image) => {
                    debug!("Queued upload {} ({})", raw.id, raw.label);
                    report.queued.push(raw.id.clone());
                    self.queue().push(PendingUpload {
                        id: raw.id,
                        label: raw.label,
                        image,
                    });
                }
                Err(e) => {
                    warn!("Rejected upload {}: {}", raw.label, e);
                    report.failures.push(e);
                }
            }
        }
        report
    }

    /// Resolve local paths / URLs, then [`enqueue`](Self::enqueue) them.
    ///
    /// Every input is resolved before anything is queued, so a missing file
    /// leaves the queue untouched.
    pub async fn enqueue_paths<S: AsRef<str>>(&self, inputs: &[S]) -> Result<EnqueueReport, WardrobeError> {
        let mut raws = Vec::with_capacity(inputs.len());
        for input in inputs {
            raws.push(resolve_upload(input.as_ref(), self.config.download_timeout_secs).await?);
        }
        Ok(self.enqueue(raws).await)
    }

    /// Remove one pending upload. Refused while a batch is in flight.
    pub fn dequeue(&self, id: &str) -> Result<PendingUpload, WardrobeError> {
        if self.is_running() {
            return Err(WardrobeError::BatchInFlight);
        }
        let mut queue = self.queue();
        let pos = queue
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| WardrobeError::UploadNotFound { id: id.to_string() })?;
        Ok(queue.remove(pos))
    }

    /// Snapshot of the pending queue, in order.
    pub fn pending(&self) -> Vec<PendingUpload> {
        self.queue().clone()
    }

    pub fn pending_len(&self) -> usize {
        self.queue().len()
    }

    /// `(processed_count, total_count)` of the current or last batch.
    pub fn progress(&self) -> (usize, usize) {
        self.progress.snapshot()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Process the queue as it stands when the call starts.
    ///
    /// On [`BatchOutcome::Success`] exactly the processed uploads leave the
    /// queue; uploads enqueued meanwhile, or skipped by a cancellation, stay.
    /// On [`BatchOutcome::NoItemsDetected`] the queue is left as it was.
    ///
    /// # Errors
    /// [`WardrobeError::BatchInFlight`] if another `run` is already active.
    pub async fn run(&self) -> Result<BatchReport, WardrobeError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(WardrobeError::BatchInFlight);
        }
        let _in_flight = InFlight(&self.running);
        self.cancel.0.store(false, Ordering::SeqCst);

        let snapshot = self.pending();
        let jobs = snapshot
            .iter()
            .map(|p| Job {
                id: &p.id,
                label: &p.label,
                stage: UploadStage::Ready(&p.image),
            })
            .collect();

        let report = run_batch(
            jobs,
            self.oracle.as_ref(),
            &self.config,
            Some(&self.cancel.0),
            Some(&self.progress),
        )
        .await;

        if report.outcome == BatchOutcome::Success {
            let done: Vec<&str> = report.processed_ids().collect();
            self.queue().retain(|p| !done.contains(&p.id.as_str()));
            debug!("Cleared {} processed uploads from the queue", done.len());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::recognize::{OracleError, OracleReply};
    use async_trait::async_trait;
    use edgequake_llm::{ChatMessage, CompletionOptions};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::AtomicUsize;

    struct FixedOracle {
        reply: String,
        calls: AtomicUsize,
    }

    impl FixedOracle {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Oracle for FixedOracle {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<OracleReply, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(OracleReply::text(self.reply.clone()))
        }
    }

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 40, 40])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn empty_queue_skips_oracle() {
        let oracle = FixedOracle::new(r#"[{"name":"Tee"}]"#);
        let report = ingest(&[], oracle.as_ref(), &IngestConfig::default()).await;
        assert_eq!(report.outcome, BatchOutcome::NoItemsDetected);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_item_per_region() {
        let oracle = FixedOracle::new(
            r#"[{"name":"Tee","box_2d":[0,0,500,500]},{"name":"Jeans","box_2d":[500,0,1000,1000]}]"#,
        );
        let uploads = vec![RawUpload::from_bytes("a.png", png(100, 80))];
        let report = ingest(&uploads, oracle.as_ref(), &IngestConfig::default()).await;
        assert_eq!(report.outcome, BatchOutcome::Success);
        let names: Vec<_> = report.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Tee", "Jeans"]);
        assert_eq!(report.uploads[0].regions_detected, 2);
    }

    #[tokio::test]
    async fn dequeue_removes_by_id() {
        let ingestor = Ingestor::new(FixedOracle::new("[]"), IngestConfig::default());
        let r = ingestor
            .enqueue(vec![
                RawUpload::from_bytes("a.png", png(10, 10)),
                RawUpload::from_bytes("broken.png", b"nope".to_vec()),
            ])
            .await;
        assert_eq!(r.queued.len(), 1);
        assert_eq!(r.failures.len(), 1);

        let id = r.queued[0].clone();
        assert!(matches!(
            ingestor.dequeue("missing"),
            Err(WardrobeError::UploadNotFound { .. })
        ));
        assert_eq!(ingestor.dequeue(&id).unwrap().label, "a.png");
        assert_eq!(ingestor.pending_len(), 0);
    }

    #[tokio::test]
    async fn run_clears_queue_only_on_success() {
        let ingestor = Ingestor::new(FixedOracle::new("[]"), IngestConfig::default());
        ingestor.enqueue(vec![RawUpload::from_bytes("a.png", png(10, 10))]).await;

        let report = ingestor.run().await.unwrap();
        assert_eq!(report.outcome, BatchOutcome::NoItemsDetected);
        assert_eq!(ingestor.pending_len(), 1);
        assert_eq!(ingestor.progress(), (1, 1));
        assert!(!ingestor.is_running());

        let ingestor = Ingestor::new(FixedOracle::new(r#"[{"name":"Cap"}]"#), IngestConfig::default());
        ingestor.enqueue(vec![RawUpload::from_bytes("b.png", png(10, 10))]).await;
        let report = ingestor.run().await.unwrap();
        assert_eq!(report.outcome, BatchOutcome::Success);
        assert_eq!(ingestor.pending_len(), 0);
    }

    #[tokio::test]
    async fn cancel_before_run_is_reset() {
        let ingestor = Ingestor::new(FixedOracle::new(r#"[{"name":"Cap"}]"#), IngestConfig::default());
        ingestor.enqueue(vec![RawUpload::from_bytes("b.png", png(10, 10))]).await;
        ingestor.cancel_handle().cancel();
        let report = ingestor.run().await.unwrap();
        assert!(!report.stats.cancelled);
        assert_eq!(report.items.len(), 1);
    }
}
