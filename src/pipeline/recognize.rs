//! Garment recognition: send a normalised photo to the oracle and parse the
//! structured reply into [`CandidateDescriptor`]s.
//!
//! The module is intentionally thin. Prompt wording lives in
//! [`crate::prompts`], text cleanup in [`crate::pipeline::sanitize`] and
//! field validation in [`crate::model`].
//!
//! ## Failure model
//!
//! * Transport failure (timeout, non-success status, provider error) →
//!   `UploadError::OracleUnavailable`. No retry happens here; retry policy
//!   belongs to the caller.
//! * A reply that is empty or not the expected JSON shape → an empty
//!   candidate list. "No clothes detected" and "oracle returned garbage" are
//!   indistinguishable to the caller, but they are logged differently.

use crate::config::IngestConfig;
use crate::error::{UploadError, WardrobeError};
use crate::model::CandidateDescriptor;
use crate::pipeline::normalize::NormalizedImage;
use crate::pipeline::sanitize::clean_reply;
use crate::prompts::{RECOGNITION_INSTRUCTION, RECOGNITION_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Keys under which a model may wrap the item array when forced to answer
/// with a JSON object.
const WRAPPER_KEYS: [&str; 6] = ["items", "clothing", "clothes", "garments", "results", "detections"];

/// Text reply from the oracle plus token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleReply {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl OracleReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Transport-level oracle failure.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("oracle call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("oracle call failed: {0}")]
    Transport(String),
}

/// The external multimodal model, seen as a black box.
///
/// [`LlmOracle`] is the production implementation; tests and embedders can
/// plug in their own (caching, rate limiting, canned replies).
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<OracleReply, OracleError>;
}

/// [`Oracle`] backed by an `edgequake_llm` provider with a per-call timeout.
pub struct LlmOracle {
    provider: Arc<dyn LLMProvider>,
    label: String,
    timeout: Duration,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            provider,
            label: label.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<OracleReply, OracleError> {
        let call = self.provider.chat(messages, Some(options));
        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(OracleError::Timeout {
                secs: self.timeout.as_secs(),
            }),
            Ok(Err(e)) => Err(OracleError::Transport(e.to_string())),
            Ok(Ok(response)) => Ok(OracleReply {
                content: response.content,
                input_tokens: response.prompt_tokens,
                output_tokens: response.completion_tokens,
            }),
        }
    }
}

/// Result of one recognition call.
#[derive(Debug, Clone, Default)]
pub struct Recognition {
    pub candidates: Vec<CandidateDescriptor>,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Ask the oracle for every clothing region in `image`.
pub async fn recognize(
    oracle: &dyn Oracle,
    upload_id: &str,
    image: &NormalizedImage,
    config: &IngestConfig,
) -> Result<Recognition, UploadError> {
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(RECOGNITION_SYSTEM_PROMPT);

    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images(RECOGNITION_INSTRUCTION, vec![image.to_image_data()]),
    ];
    let options = build_options(config);

    let reply = oracle.complete(&messages, &options).await.map_err(|e| {
        warn!("Upload {}: oracle '{}' unavailable: {}", upload_id, oracle.name(), e);
        UploadError::OracleUnavailable {
            upload: upload_id.to_string(),
            detail: e.to_string(),
        }
    })?;

    let candidates = match try_parse_candidates(&reply.content) {
        Some(c) => {
            debug!("Upload {}: oracle reported {} regions", upload_id, c.len());
            c
        }
        None => {
            warn!(
                "Upload {}: unparseable oracle reply ({} bytes), treating as no detections",
                upload_id,
                reply.content.len()
            );
            Vec::new()
        }
    };

    Ok(Recognition {
        candidates,
        input_tokens: reply.input_tokens,
        output_tokens: reply.output_tokens,
    })
}

/// Build `CompletionOptions` requesting a JSON reply.
pub(crate) fn build_options(config: &IngestConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        response_format: Some("json_object".to_string()),
        ..Default::default()
    }
}

/// Parse an oracle reply, returning an empty list for anything unusable.
pub fn parse_candidates(text: &str) -> Vec<CandidateDescriptor> {
    try_parse_candidates(text).unwrap_or_default()
}

/// `None` when the reply is not JSON of a recognised shape.
fn try_parse_candidates(text: &str) -> Option<Vec<CandidateDescriptor>> {
    let cleaned = clean_reply(text);
    if cleaned.is_empty() {
        return None;
    }
    let value: Value = serde_json::from_str(&cleaned).ok()?;
    let elements = candidate_elements(&value)?;
    Some(elements.iter().filter_map(CandidateDescriptor::from_value).collect())
}

/// Locate the list of item objects in a bare array or a wrapping object.
fn candidate_elements(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::Object(obj) => {
            if let Some(items) = WRAPPER_KEYS
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_array))
            {
                return Some(items.clone());
            }
            // A single item returned without any list around it. Checked
            // before the generic scan: its own `box_2d` is an array too.
            if ["name", "category", "box_2d"].iter().any(|k| obj.contains_key(*k)) {
                return Some(vec![value.clone()]);
            }
            obj.values()
                .filter_map(Value::as_array)
                .find(|items| items.iter().any(Value::is_object))
                .cloned()
        }
        _ => None,
    }
}

/// Resolve the oracle, from most-specific to least-specific.
///
/// 1. **Pre-built oracle** (`config.oracle`): used as-is.
/// 2. **Pre-built provider** (`config.provider`): wrapped in [`LlmOracle`].
/// 3. **Named provider + model** (`config.provider_name`): created through
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 4. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 5. **Gemini, then OpenAI** when their API keys are present.
/// 6. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_oracle(config: &IngestConfig) -> Result<Arc<dyn Oracle>, WardrobeError> {
    if let Some(ref oracle) = config.oracle {
        return Ok(Arc::clone(oracle));
    }

    let wrap = |provider: Arc<dyn LLMProvider>, label: &str| -> Arc<dyn Oracle> {
        Arc::new(LlmOracle::new(provider, label, config.api_timeout_secs))
    };

    if let Some(ref provider) = config.provider {
        return Ok(wrap(Arc::clone(provider), "custom"));
    }

    if let Some(ref name) = config.provider_name {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| default_model(name).to_string());
        return Ok(wrap(create_vision_provider(name, &model)?, name));
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return Ok(wrap(create_vision_provider(&prov, &model)?, &prov));
        }
    }

    for (env_key, name) in [("GEMINI_API_KEY", "gemini"), ("OPENAI_API_KEY", "openai")] {
        if std::env::var(env_key).is_ok_and(|k| !k.is_empty()) {
            let model = config
                .model
                .clone()
                .unwrap_or_else(|| default_model(name).to_string());
            return Ok(wrap(create_vision_provider(name, &model)?, name));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| WardrobeError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(wrap(llm_provider, "auto"))
}

/// Vision-capable default model per provider.
pub fn default_model(provider_name: &str) -> &'static str {
    match provider_name {
        "gemini" => "gemini-2.5-flash",
        "anthropic" => "claude-sonnet-4-20250514",
        "ollama" | "lmstudio" => "llava",
        _ => "gpt-4.1-mini",
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, WardrobeError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        WardrobeError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
