//! Configuration for wardrobe ingestion.
//!
//! All pipeline behaviour is controlled through [`IngestConfig`], built via
//! its [`IngestConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config between the batch API, the streaming API and
//! the stylist, and to log exactly what a run was configured with.

use crate::error::WardrobeError;
use crate::pipeline::crop::{DEFAULT_CROP_PADDING, DEFAULT_CROP_QUALITY};
use crate::pipeline::normalize::{DEFAULT_MAX_EDGE, DEFAULT_NORMALIZE_QUALITY};
use crate::pipeline::recognize::Oracle;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for an ingestion run.
///
/// # Example
/// ```rust
/// use wardrobe_ingest::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .max_edge(1024)
///     .crop_padding(0.15)
///     .model("gemini-2.5-flash")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_edge, 1024);
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Longest edge of a normalised upload, in pixels. Default: 1200.
    ///
    /// Large enough for the oracle to read fabric and pattern, small enough
    /// that a base64 upload stays well under a megabyte.
    pub max_edge: u32,

    /// JPEG quality (1–100) for normalised uploads. Default: 80.
    pub normalize_quality: u8,

    /// JPEG quality (1–100) for stored crops. Default: 90.
    pub crop_quality: u8,

    /// Padding around each detected box, as a fraction of its shorter side. Default: 0.10.
    pub crop_padding: f64,

    /// LLM model identifier, e.g. "gemini-2.5-flash", "gpt-4.1-mini".
    /// If None, a per-provider default is used.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed oracle. Takes precedence over every provider setting.
    pub oracle: Option<Arc<dyn Oracle>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens per oracle reply. Default: 4096.
    pub max_tokens: usize,

    /// Per-oracle-call timeout in seconds. Default: 60.
    ///
    /// A timed-out call is reported as `OracleUnavailable` for that upload;
    /// it is never retried inside the pipeline.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Custom recognition system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Optional per-upload progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_edge: DEFAULT_MAX_EDGE,
            normalize_quality: DEFAULT_NORMALIZE_QUALITY,
            crop_quality: DEFAULT_CROP_QUALITY,
            crop_padding: DEFAULT_CROP_PADDING,
            model: None,
            provider_name: None,
            provider: None,
            oracle: None,
            temperature: 0.2,
            max_tokens: 4096,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("max_edge", &self.max_edge)
            .field("normalize_quality", &self.normalize_quality)
            .field("crop_quality", &self.crop_quality)
            .field("crop_padding", &self.crop_padding)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("oracle", &self.oracle.as_ref().map(|o| o.name().to_string()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IngestConfig`].
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn max_edge(mut self, px: u32) -> Self {
        self.config.max_edge = px;
        self
    }

    pub fn normalize_quality(mut self, q: u8) -> Self {
        self.config.normalize_quality = q;
        self
    }

    pub fn crop_quality(mut self, q: u8) -> Self {
        self.config.crop_quality = q;
        self
    }

    pub fn crop_padding(mut self, ratio: f64) -> Self {
        self.config.crop_padding = ratio;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn oracle(mut self, oracle: Arc<dyn Oracle>) -> Self {
        self.config.oracle = Some(oracle);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, WardrobeError> {
        let c = &self.config;
        if c.max_edge < 64 {
            return Err(WardrobeError::InvalidConfig(format!(
                "max_edge must be ≥ 64 px, got {}",
                c.max_edge
            )));
        }
        for (name, q) in [("normalize_quality", c.normalize_quality), ("crop_quality", c.crop_quality)] {
            if !(1..=100).contains(&q) {
                return Err(WardrobeError::InvalidConfig(format!(
                    "{name} must be 1–100, got {q}"
                )));
            }
        }
        if !(0.0..=0.5).contains(&c.crop_padding) {
            return Err(WardrobeError::InvalidConfig(format!(
                "crop_padding must be 0.0–0.5, got {}",
                c.crop_padding
            )));
        }
        if c.max_tokens == 0 {
            return Err(WardrobeError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(WardrobeError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
