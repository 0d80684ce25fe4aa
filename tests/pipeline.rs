//! Integration tests for the ingestion pipeline.
//!
//! Every test drives the real normalise → recognise → crop path with a
//! scripted in-process oracle, so no network or API key is needed.

use async_trait::async_trait;
use base64::Engine;
use edgequake_llm::{ChatMessage, CompletionOptions};
use futures::StreamExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use wardrobe_ingest::model::defaults;
use wardrobe_ingest::{
    ingest, ingest_stream, BatchOutcome, CancelHandle, Catalog, ClothingCategory, IngestConfig,
    IngestProgressCallback, Ingestor, Oracle, OracleError, OracleReply, RawUpload, UploadError,
    WardrobeError,
};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Replays canned replies in order; repeats the last one when exhausted.
struct ScriptedOracle {
    replies: Mutex<VecDeque<Result<String, OracleError>>>,
    last: Mutex<Option<Result<String, OracleError>>>,
    calls: AtomicUsize,
    cancel_on_first_call: OnceLock<CancelHandle>,
}

impl ScriptedOracle {
    fn new(replies: Vec<Result<&str, OracleError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(|r| r.map(str::to_string)).collect()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            cancel_on_first_call: OnceLock::new(),
        })
    }

    fn always(reply: &str) -> Arc<Self> {
        Self::new(vec![Ok(reply)])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<OracleReply, OracleError> {
        assert!(!messages.is_empty());
        assert_eq!(options.response_format.as_deref(), Some("json_object"));

        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Some(h) = self.cancel_on_first_call.get() {
                h.cancel();
            }
        }

        let next = self.replies.lock().unwrap().pop_front();
        let reply = match next {
            Some(r) => {
                *self.last.lock().unwrap() = Some(r.clone());
                r
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok("[]".to_string())),
        };
        reply.map(|content| OracleReply {
            content,
            input_tokens: 1000,
            output_tokens: 50,
        })
    }
}

/// Blocks every call until the test releases a permit.
struct GatedOracle {
    gate: tokio::sync::Semaphore,
}

#[async_trait]
impl Oracle for GatedOracle {
    fn name(&self) -> &str {
        "gated"
    }

    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<OracleReply, OracleError> {
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        permit.forget();
        Ok(OracleReply::text(r#"[{"name":"Gated Tee"}]"#))
    }
}

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl IngestProgressCallback for RecordingCallback {
    fn on_batch_start(&self, total: usize) {
        self.events.lock().unwrap().push(format!("batch_start {total}"));
    }
    fn on_upload_start(&self, n: usize, total: usize) {
        self.events.lock().unwrap().push(format!("start {n}/{total}"));
    }
    fn on_upload_complete(&self, n: usize, _total: usize, items: usize) {
        self.events.lock().unwrap().push(format!("complete {n} items={items}"));
    }
    fn on_upload_error(&self, n: usize, _total: usize, _error: &str) {
        self.events.lock().unwrap().push(format!("error {n}"));
    }
    fn on_region_skipped(&self, n: usize, region: usize, _reason: &str) {
        self.events.lock().unwrap().push(format!("skip {n}#{region}"));
    }
    fn on_batch_complete(&self, total: usize, items: usize) {
        self.events.lock().unwrap().push(format!("batch_complete {total} items={items}"));
    }
}

fn photo(label: &str, w: u32, h: u32) -> RawUpload {
    let img = DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    RawUpload::from_bytes(label, buf.into_inner())
}

fn corrupt(label: &str) -> RawUpload {
    RawUpload::from_bytes(label, b"\x89PNG\r\n\x1a\nthis is not really a png".to_vec())
}

const TWO_ITEMS: &str = r##"{"items":[
    {"name":"Grey Hoodie","category":"shirt","silhouette":"hoodie","color":"Grey","hexColor":"#808080",
     "material":"Cotton","pattern":"Solid","style":"Casual","season":"Autumn",
     "description":"Soft pullover hoodie.","box_2d":[50,100,600,900]},
    {"name":"Black Jeans","category":"pants","box_2d":[550,200,1000,800]}
]}"##;

// ── Batch contract ───────────────────────────────────────────────────────────

#[tokio::test]
async fn corrupt_upload_does_not_abort_batch() {
    let oracle = ScriptedOracle::new(vec![
        Ok(r#"[{"name":"First Shirt","category":"shirt","box_2d":[0,0,500,500]}]"#),
        Ok(r#"[{"name":"Third Shoes","category":"shoes","box_2d":[500,500,1000,1000]}]"#),
    ]);
    let uploads = vec![photo("one.png", 300, 200), corrupt("two.png"), photo("three.png", 120, 160)];

    let report = ingest(&uploads, oracle.as_ref(), &IngestConfig::default()).await;

    assert_eq!(report.outcome, BatchOutcome::Success);
    let names: Vec<_> = report.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["First Shirt", "Third Shoes"]);
    // The corrupt upload never reaches the oracle.
    assert_eq!(oracle.calls(), 2);
    assert!(matches!(report.uploads[1].error, Some(UploadError::Decode { .. })));
    assert_eq!(report.stats.decode_failures, 1);
    assert_eq!(report.stats.processed_uploads, 3);
    assert_eq!(report.stats.total_input_tokens, 2000);
}

#[tokio::test]
async fn empty_or_garbage_replies_keep_queue() {
    let oracle = ScriptedOracle::new(vec![Ok("[]"), Ok("Sorry, I only see a cat.")]);
    let ingestor = Ingestor::new(oracle.clone(), IngestConfig::default());
    let queued = ingestor
        .enqueue(vec![photo("a.png", 64, 64), photo("b.png", 64, 64)])
        .await;
    assert_eq!(queued.queued.len(), 2);

    let report = ingestor.run().await.unwrap();

    assert_eq!(report.outcome, BatchOutcome::NoItemsDetected);
    assert!(report.items.is_empty());
    assert_eq!(report.stats.empty_detections, 2);
    let pending: Vec<_> = ingestor.pending().into_iter().map(|p| p.id).collect();
    assert_eq!(pending, queued.queued);
}

#[tokio::test]
async fn empty_queue_never_calls_oracle() {
    let oracle = ScriptedOracle::always(TWO_ITEMS);
    let ingestor = Ingestor::new(oracle.clone(), IngestConfig::default());

    let report = ingestor.run().await.unwrap();

    assert_eq!(report.outcome, BatchOutcome::NoItemsDetected);
    assert_eq!(report.stats.total_uploads, 0);
    assert_eq!(oracle.calls(), 0);
    assert_eq!(ingestor.progress(), (0, 0));
}

#[tokio::test]
async fn oracle_failure_counts_as_zero_items() {
    let oracle = ScriptedOracle::new(vec![
        Err(OracleError::Timeout { secs: 60 }),
        Ok(TWO_ITEMS),
    ]);
    let uploads = vec![photo("slow.png", 80, 80), photo("ok.png", 400, 300)];

    let report = ingest(&uploads, oracle.as_ref(), &IngestConfig::default()).await;

    assert_eq!(report.outcome, BatchOutcome::Success);
    assert_eq!(report.items.len(), 2);
    assert_eq!(report.stats.oracle_failures, 1);
    assert_eq!(report.stats.empty_detections, 0);
    assert!(matches!(
        report.uploads[0].error,
        Some(UploadError::OracleUnavailable { .. })
    ));
}

// ── Regions and synthesis ────────────────────────────────────────────────────

#[tokio::test]
async fn degenerate_region_is_skipped_alone() {
    let oracle = ScriptedOracle::always(
        r#"[{"name":"Flat","box_2d":[300,100,300,400]},{"name":"Real","box_2d":[100,100,900,900]}]"#,
    );
    let cb = Arc::new(RecordingCallback::default());
    let config = IngestConfig::builder()
        .progress_callback(cb.clone() as Arc<dyn IngestProgressCallback>)
        .build()
        .unwrap();

    let report = ingest(&[photo("p.png", 200, 200)], oracle.as_ref(), &config).await;

    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].name, "Real");
    assert_eq!(report.uploads[0].regions_detected, 2);
    assert_eq!(
        report.uploads[0].skipped_regions,
        vec![UploadError::DegenerateRegion {
            upload: report.uploads[0].upload_id.clone(),
            region: 0,
        }]
    );
    assert_eq!(report.stats.skipped_regions, 1);
    assert!(cb.events.lock().unwrap().contains(&"skip 1#0".to_string()));
}

#[tokio::test]
async fn single_unwrapped_item_with_box_is_catalogued() {
    let oracle = ScriptedOracle::always(
        r#"{"name":"Loafers","category":"shoes","box_2d":[100,100,900,900]}"#,
    );
    let report = ingest(&[photo("l.png", 200, 200)], oracle.as_ref(), &IngestConfig::default()).await;

    assert_eq!(report.outcome, BatchOutcome::Success);
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].name, "Loafers");
    assert_eq!(report.items[0].category, ClothingCategory::Shoes);
    assert_eq!(report.stats.empty_detections, 0);
}

#[tokio::test]
async fn missing_fields_get_defaults_and_others_pass_through() {
    let oracle = ScriptedOracle::always(
        r#"[{"name":"Wool Scarf","category":"accessory","silhouette":"scarf","material":"Wool",
            "pattern":"Plaid","style":"Classic","season":"Winter","box_2d":[0,0,1000,1000]}]"#,
    );
    let report = ingest(&[photo("s.png", 90, 60)], oracle.as_ref(), &IngestConfig::default()).await;

    let item = &report.items[0];
    assert_eq!(item.color, "Unknown");
    assert_eq!(item.hex_color, defaults::HEX_COLOR);
    assert_eq!(item.description, defaults::DESCRIPTION);
    assert_eq!(item.name, "Wool Scarf");
    assert_eq!(item.category, ClothingCategory::Accessory);
    assert_eq!(item.silhouette, "scarf");
    assert_eq!(item.material, "Wool");
    assert_eq!(item.pattern, "Plaid");
    assert_eq!(item.style, "Classic");
    assert_eq!(item.season, "Winter");
    assert_eq!(item.wear_count, 0);
}

#[tokio::test]
async fn crops_respect_normalised_size() {
    let oracle = ScriptedOracle::always(r#"[{"name":"Whole","box_2d":[0,0,1000,1000]}]"#);
    let config = IngestConfig::builder().max_edge(100).build().unwrap();

    let report = ingest(&[photo("big.png", 400, 200)], oracle.as_ref(), &config).await;

    // 400x200 normalises to 100x50; a full-frame box stays inside it.
    let b64 = report.items[0]
        .image
        .strip_prefix("data:image/jpeg;base64,")
        .unwrap();
    let bytes = base64::engine::general_purpose::STANDARD.decode(b64).unwrap();
    let crop = image::load_from_memory(&bytes).unwrap();
    assert_eq!((crop.width(), crop.height()), (100, 50));
}

// ── Queue, progress and cancellation ─────────────────────────────────────────

#[tokio::test]
async fn progress_events_arrive_in_order() {
    let oracle = ScriptedOracle::always(r#"[{"name":"Tee"}]"#);
    let cb = Arc::new(RecordingCallback::default());
    let config = IngestConfig::builder()
        .progress_callback(cb.clone() as Arc<dyn IngestProgressCallback>)
        .build()
        .unwrap();

    ingest(&[photo("a.png", 32, 32), corrupt("b.png")], oracle.as_ref(), &config).await;

    assert_eq!(
        *cb.events.lock().unwrap(),
        vec![
            "batch_start 2",
            "start 1/2",
            "complete 1 items=1",
            "start 2/2",
            "error 2",
            "batch_complete 2 items=1",
        ]
    );
}

#[tokio::test]
async fn cancellation_stops_at_upload_boundary() {
    let oracle = ScriptedOracle::always(r#"[{"name":"Tee"}]"#);
    let ingestor = Ingestor::new(oracle.clone(), IngestConfig::default());
    let queued = ingestor
        .enqueue(vec![photo("a.png", 32, 32), photo("b.png", 32, 32), photo("c.png", 32, 32)])
        .await;
    // Cancel while the first upload is in flight.
    let _ = oracle.cancel_on_first_call.set(ingestor.cancel_handle());

    let report = ingestor.run().await.unwrap();

    assert!(report.stats.cancelled);
    assert_eq!(report.stats.processed_uploads, 1);
    assert_eq!(report.outcome, BatchOutcome::Success);
    assert_eq!(report.items.len(), 1);
    assert_eq!(oracle.calls(), 1);
    assert_eq!(ingestor.progress(), (1, 3));
    // Only the processed upload leaves the queue.
    let pending: Vec<_> = ingestor.pending().into_iter().map(|p| p.id).collect();
    assert_eq!(pending, queued.queued[1..].to_vec());
}

#[tokio::test]
async fn queue_is_locked_while_batch_in_flight() {
    let oracle = Arc::new(GatedOracle {
        gate: tokio::sync::Semaphore::new(0),
    });
    let ingestor = Arc::new(Ingestor::new(oracle.clone(), IngestConfig::default()));
    let first = ingestor.enqueue(vec![photo("first.png", 40, 40)]).await;

    let runner = {
        let ingestor = Arc::clone(&ingestor);
        tokio::spawn(async move { ingestor.run().await })
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        while !ingestor.is_running() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("run never started");

    assert!(matches!(
        ingestor.dequeue(&first.queued[0]),
        Err(WardrobeError::BatchInFlight)
    ));
    assert!(matches!(ingestor.run().await, Err(WardrobeError::BatchInFlight)));

    // Enqueueing mid-run is allowed and survives the run.
    let late = ingestor.enqueue(vec![photo("late.png", 40, 40)]).await;

    oracle.gate.add_permits(1);
    let report = runner.await.unwrap().unwrap();

    assert_eq!(report.outcome, BatchOutcome::Success);
    assert_eq!(report.stats.total_uploads, 1);
    assert!(!ingestor.is_running());
    let pending: Vec<_> = ingestor.pending().into_iter().map(|p| p.id).collect();
    assert_eq!(pending, late.queued);
    assert!(ingestor.dequeue(&late.queued[0]).is_ok());
}

#[tokio::test]
async fn enqueue_paths_fails_fast_on_missing_file() {
    let ingestor = Ingestor::new(ScriptedOracle::always("[]"), IngestConfig::default());
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.png");
    std::fs::write(&good, photo("x", 16, 16).bytes().as_ref()).unwrap();
    let missing = dir.path().join("missing.png");

    let err = ingestor
        .enqueue_paths(&[good.to_string_lossy(), missing.to_string_lossy()])
        .await
        .unwrap_err();

    assert!(matches!(err, WardrobeError::FileNotFound { .. }));
    assert_eq!(ingestor.pending_len(), 0);

    let ok = ingestor.enqueue_paths(&[good.to_string_lossy()]).await.unwrap();
    assert_eq!(ok.queued.len(), 1);
    assert_eq!(ingestor.pending()[0].label, "good.png");
}

// ── Streaming and catalog ────────────────────────────────────────────────────

#[tokio::test]
async fn stream_yields_each_upload_in_order() {
    let oracle = ScriptedOracle::new(vec![Ok(TWO_ITEMS), Ok("[]")]);
    let uploads = vec![photo("a.png", 200, 200), corrupt("b.png"), photo("c.png", 50, 50)];

    let results: Vec<_> = ingest_stream(uploads, oracle.clone(), IngestConfig::default())
        .collect()
        .await;

    let nums: Vec<_> = results.iter().map(|r| r.upload_num).collect();
    assert_eq!(nums, vec![1, 2, 3]);
    assert_eq!(results[0].items.len(), 2);
    assert!(results[1].error.is_some());
    assert!(results[2].items.is_empty() && results[2].error.is_none());
    assert_eq!(oracle.calls(), 2);
}

#[tokio::test]
async fn ingested_items_round_trip_through_catalog() {
    let oracle = ScriptedOracle::always(TWO_ITEMS);
    let report = ingest(&[photo("closet.png", 300, 300)], oracle.as_ref(), &IngestConfig::default()).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wardrobe.json");
    let mut catalog = Catalog::load(&path).unwrap();
    assert_eq!(catalog.add_items(report.items), 2);
    catalog.save(&path).unwrap();

    let mut reloaded = Catalog::load(&path).unwrap();
    assert_eq!(reloaded, catalog);

    let hoodie = reloaded.filter(None, "hoodie").next().unwrap().id.clone();
    assert_eq!(reloaded.mark_worn(&[hoodie.as_str()]), 1);
    assert_eq!(reloaded.favorites(3)[0].name, "Grey Hoodie");
    assert_eq!(reloaded.filter(Some(ClothingCategory::Pants), "").count(), 1);
}
