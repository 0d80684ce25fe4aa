//! Pipeline stages for turning clothing photos into catalog items.
//!
//! Each submodule implements exactly one transformation step, so each can
//! be tested on its own and the oracle can be swapped without touching the
//! image code.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ recognize ──▶ crop (per region)
//! (path/URL)  (≤1200px JPEG)  (oracle)     (padded JPEG)
//! ```
//!
//! 1. [`input`]    : turn a path, URL or byte buffer into a `RawUpload`
//! 2. [`normalize`]: decode, downsample and re-encode; runs in
//!    `spawn_blocking` because decoding is CPU-bound
//! 3. [`recognize`]: the only stage with network I/O; one oracle call per
//!    upload, no retries
//! 4. [`crop`]     : map each 0–1000 box to a padded pixel rectangle and
//!    re-encode the region
//!
//! [`sanitize`] holds the text-cleanup rules applied to oracle replies before
//! they are parsed.

pub mod crop;
pub mod input;
pub mod normalize;
pub mod recognize;
pub mod sanitize;
