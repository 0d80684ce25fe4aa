//! Outfit recommendations from the user's own wardrobe.
//!
//! The stylist is a chat on top of the same oracle used for recognition.
//! Each call sends a compact wardrobe listing as the system turn, replays the
//! conversation so far, and asks for a JSON reply naming the items it
//! suggests. Suggested ids that are not in the catalog are dropped, so a
//! hallucinated id can never reach the caller.

use crate::catalog::Catalog;
use crate::config::IngestConfig;
use crate::error::WardrobeError;
use crate::model::new_id;
use crate::pipeline::recognize::{build_options, Oracle};
use crate::pipeline::sanitize::clean_reply;
use crate::prompts::stylist_context;
use edgequake_llm::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

/// One message of a stylist conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub id: String,
    pub role: ChatRole,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_ids: Vec<String>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role: ChatRole::User,
            text: text.into(),
            item_ids: Vec::new(),
        }
    }

    pub fn model(reply: &StylistReply) -> Self {
        Self {
            id: new_id(),
            role: ChatRole::Model,
            text: reply.text.clone(),
            item_ids: reply.item_ids.clone(),
        }
    }

    fn to_message(&self) -> ChatMessage {
        match self.role {
            ChatRole::User => ChatMessage::user(&self.text),
            ChatRole::Model => ChatMessage::assistant(&self.text),
        }
    }
}

/// The stylist's answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StylistReply {
    pub text: String,
    /// Suggested catalog items, in the order the oracle listed them.
    pub item_ids: Vec<String>,
}

/// Ask the stylist for advice.
///
/// Returns `Ok(None)` when the oracle's reply is not the expected JSON.
///
/// # Errors
/// [`WardrobeError::LlmApiError`] when the oracle cannot be reached.
pub async fn recommend(
    oracle: &dyn Oracle,
    catalog: &Catalog,
    history: &[ChatTurn],
    message: &str,
    config: &IngestConfig,
) -> Result<Option<StylistReply>, WardrobeError> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(stylist_context(&wardrobe_listing(catalog))));
    messages.extend(history.iter().map(ChatTurn::to_message));
    messages.push(ChatMessage::user(message));

    debug!(
        "Stylist request: {} catalog items, {} prior turns",
        catalog.len(),
        history.len()
    );

    let reply = oracle
        .complete(&messages, &build_options(config))
        .await
        .map_err(|e| WardrobeError::LlmApiError {
            message: e.to_string(),
        })?;

    let parsed = parse_reply(&reply.content, catalog);
    if parsed.is_none() {
        warn!("Stylist reply was not usable JSON ({} bytes)", reply.content.len());
    }
    Ok(parsed)
}

/// `[{id, name, category, color}, …]`: just enough for the model to pick items.
fn wardrobe_listing(catalog: &Catalog) -> String {
    let listing: Vec<Value> = catalog
        .items()
        .iter()
        .map(|i| {
            json!({
                "id": i.id,
                "name": i.name,
                "category": i.category,
                "color": i.color,
            })
        })
        .collect();
    Value::Array(listing).to_string()
}

fn parse_reply(content: &str, catalog: &Catalog) -> Option<StylistReply> {
    let value: Value = serde_json::from_str(&clean_reply(content)).ok()?;
    let obj = value.as_object()?;
    let text = obj.get("text")?.as_str()?.trim();
    if text.is_empty() {
        return None;
    }

    let mut item_ids: Vec<String> = Vec::new();
    let listed = ["itemIds", "item_ids"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_array));
    for id in listed.into_iter().flatten().filter_map(Value::as_str) {
        if !catalog.contains(id) {
            debug!("Stylist suggested unknown item '{}', dropping", id);
        } else if !item_ids.iter().any(|seen| seen == id) {
            item_ids.push(id.to_string());
        }
    }

    Some(StylistReply {
        text: text.to_string(),
        item_ids,
    })
}
