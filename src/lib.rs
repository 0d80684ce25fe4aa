//! # wardrobe-ingest
//!
//! Turn photos of clothing into a structured wardrobe catalog using a
//! vision language model.
//!
//! ## Why this crate?
//!
//! Photographing a closet is easy; typing up every garment is not. This
//! crate sends each photo to a multimodal model, asks for every distinct
//! clothing item with its attributes and a bounding box, crops each item out
//! of the photo, and returns ready-to-store [`CatalogItem`]s. A bad photo,
//! an unreachable model or a nonsense box only ever costs that one photo or
//! region, never the batch.
//!
//! ## Pipeline Overview
//!
//! ```text
//! photos
//!  │
//!  ├─ 1. Input      resolve local files / URLs into raw uploads
//!  ├─ 2. Normalize  decode, cap the long edge at 1200px, JPEG q80 (spawn_blocking)
//!  ├─ 3. Recognize  one oracle call per photo → candidate descriptors
//!  ├─ 4. Crop       0–1000 box → padded pixel rect → JPEG q90, per region
//!  └─ 5. Synthesize defaults applied, fresh id, wearCount = 0
//! ```
//!
//! Uploads are processed strictly one after another. The batch succeeds if
//! it produced any items at all; otherwise the outcome is
//! [`BatchOutcome::NoItemsDetected`] and the pending queue is kept for a retry.
//!
//! Once items are catalogued, the same oracle can pick outfits from them
//! ([`recommend`]) or suggest products that fill the gaps
//! ([`shopping_suggestions`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wardrobe_ingest::{Catalog, IngestConfig, Ingestor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ANTHROPIC_API_KEY
//!     let ingestor = Ingestor::from_config(IngestConfig::default())?;
//!     ingestor.enqueue_paths(&["closet.jpg", "shoes.png"]).await?;
//!
//!     let report = ingestor.run().await?;
//!     let mut catalog = Catalog::load("wardrobe.json")?;
//!     catalog.add_items(report.items);
//!     catalog.save("wardrobe.json")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `wardrobe` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! wardrobe-ingest = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod catalog;
pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod shopping;
pub mod stream;
pub mod stylist;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use catalog::Catalog;
pub use config::{IngestConfig, IngestConfigBuilder};
pub use error::{UploadError, WardrobeError};
pub use ingest::{ingest, CancelHandle, Ingestor, PendingUpload};
pub use model::{CandidateDescriptor, CatalogItem, ClothingCategory};
pub use output::{BatchOutcome, BatchReport, BatchStats, EnqueueReport, UploadResult};
pub use pipeline::crop::BoundingBox;
pub use pipeline::input::RawUpload;
pub use pipeline::normalize::NormalizedImage;
pub use pipeline::recognize::{resolve_oracle, LlmOracle, Oracle, OracleError, OracleReply};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use shopping::{shopping_suggestions, PriceTier, ProductSuggestion, ShoppingAdvice};
pub use stream::{ingest_stream, ingest_stream_paths, UploadStream};
pub use stylist::{recommend, ChatRole, ChatTurn, StylistReply};
