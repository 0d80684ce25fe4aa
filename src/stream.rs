//! Streaming ingestion API: emit each upload's items as soon as it finishes.
//!
//! ## Why stream?
//!
//! Every upload costs one oracle round-trip, so a batch of ten photos can
//! take a minute. A stream lets a UI show items from the first photo while
//! the rest are still being analysed.
//!
//! This is a transport-level addition only. Uploads are still processed one
//! at a time, in order, with the same per-upload failure handling as
//! [`crate::ingest::ingest`]; the stream simply hands over each
//! [`UploadResult`] instead of holding them until the end. Aggregating the
//! outcome (any items at all → success) is left to the caller.

use crate::config::IngestConfig;
use crate::error::WardrobeError;
use crate::ingest::{process_upload, UploadStage};
use crate::output::UploadResult;
use crate::pipeline::input::{resolve_upload, RawUpload};
use crate::pipeline::recognize::{resolve_oracle, Oracle};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-upload results, in upload order.
pub type UploadStream = Pin<Box<dyn Stream<Item = UploadResult> + Send>>;

/// Process `uploads` sequentially, yielding one [`UploadResult`] per upload.
///
/// # Example
/// ```rust,no_run
/// use wardrobe_ingest::{ingest_stream, resolve_oracle, IngestConfig, RawUpload};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = IngestConfig::default();
/// let oracle = resolve_oracle(&config)?;
/// let uploads = vec![RawUpload::from_bytes("rack.jpg", std::fs::read("rack.jpg")?)];
/// let mut stream = ingest_stream(uploads, oracle, config);
/// while let Some(upload) = stream.next().await {
///     match upload.error {
///         None => println!("{}: {} items", upload.label, upload.items.len()),
///         Some(e) => eprintln!("{}: {e}", upload.label),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn ingest_stream(uploads: Vec<RawUpload>, oracle: Arc<dyn Oracle>, config: IngestConfig) -> UploadStream {
    let total = uploads.len();
    info!("Starting streaming ingestion of {} uploads via '{}'", total, oracle.name());

    let s = stream::iter(uploads.into_iter().enumerate()).then(move |(idx, raw)| {
        let oracle = Arc::clone(&oracle);
        let cfg = config.clone();
        async move {
            process_upload(
                oracle.as_ref(),
                idx + 1,
                total,
                &raw.id,
                &raw.label,
                UploadStage::Raw(&raw),
                &cfg,
            )
            .await
        }
    });

    Box::pin(s)
}

/// Resolve paths / URLs and the oracle, then [`ingest_stream`] them.
///
/// # Errors
/// Fatal input or provider errors are returned before the stream starts.
pub async fn ingest_stream_paths<S: AsRef<str>>(
    inputs: &[S],
    config: &IngestConfig,
) -> Result<UploadStream, WardrobeError> {
    let oracle = resolve_oracle(config)?;
    let mut uploads = Vec::with_capacity(inputs.len());
    for input in inputs {
        uploads.push(resolve_upload(input.as_ref(), config.download_timeout_secs).await?);
    }
    Ok(ingest_stream(uploads, oracle, config.clone()))
}
