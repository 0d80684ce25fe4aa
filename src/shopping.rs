//! Shopping suggestions that complement the wardrobe.
//!
//! The oracle gets a one-line style summary of every item (`color style
//! category`), a price tier, an optional location and the user's notes on
//! earlier suggestions. It answers with trend advice plus a list of products.
//! Products are checked field by field: a product without a name is dropped,
//! links that are not HTTP(S) are cleared, and ids are made unique.
//!
//! The result can be kept as a JSON document (see [`ShoppingAdvice::save`]).
//! Notes attached with [`ShoppingAdvice::set_feedback`] feed the next round.

use crate::catalog::{read_json_document, write_json_atomic, Catalog};
use crate::config::IngestConfig;
use crate::error::WardrobeError;
use crate::model::{defaults, is_hex_color, new_id, text_field};
use crate::pipeline::recognize::{build_options, Oracle};
use crate::pipeline::sanitize::clean_reply;
use crate::prompts::shopping_prompt;
use edgequake_llm::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTier {
    #[default]
    Budget,
    Standard,
    Premium,
}

impl PriceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceTier::Budget => "budget",
            PriceTier::Standard => "standard",
            PriceTier::Premium => "premium",
        }
    }
}

impl fmt::Display for PriceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceTier {
    type Err = WardrobeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "budget" | "low" => Ok(PriceTier::Budget),
            "standard" | "mid" => Ok(PriceTier::Standard),
            "premium" | "luxury" => Ok(PriceTier::Premium),
            _ => Err(WardrobeError::InvalidInput { input: s.to_string() }),
        }
    }
}

/// One suggested product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSuggestion {
    pub id: String,
    pub name: String,
    pub price: String,
    pub store: String,
    /// Direct product page; `None` when the oracle gave no usable link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub reason: String,
    pub silhouette: String,
    pub hex_color: String,
    /// The user's note on this product, fed back into the next request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<String>,
}

impl ProductSuggestion {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let name = text_field(obj, &["name", "title"])?;
        let link = |keys: &[&str]| text_field(obj, keys).filter(|u| is_http_url(u));
        Some(Self {
            id: text_field(obj, &["id"]).unwrap_or_default(),
            name,
            price: text_field(obj, &["price"]).unwrap_or_default(),
            store: text_field(obj, &["store", "retailer", "brand"]).unwrap_or_default(),
            url: link(&["url", "link"]),
            image_url: link(&["imageUrl", "image_url", "image"]),
            reason: text_field(obj, &["reason"]).unwrap_or_default(),
            silhouette: text_field(obj, &["silhouette"]).unwrap_or_default(),
            hex_color: text_field(obj, &["hexColor", "hex_color"])
                .filter(|h| is_hex_color(h))
                .unwrap_or_else(|| defaults::HEX_COLOR.to_string()),
            user_feedback: None,
        })
    }
}

/// Trend advice plus the products suggested alongside it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingAdvice {
    pub advice: String,
    pub products: Vec<ProductSuggestion>,
}

impl ShoppingAdvice {
    /// Load saved suggestions. A missing file is an empty set.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WardrobeError> {
        read_json_document(path.as_ref())
    }

    /// Atomically write the suggestions as a JSON document.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), WardrobeError> {
        write_json_atomic(path.as_ref(), self)?;
        info!("Saved {} suggestions to {}", self.products.len(), path.as_ref().display());
        Ok(())
    }

    /// Attach a note to a product. A blank note clears it.
    pub fn set_feedback(&mut self, product_id: &str, note: &str) -> Result<(), WardrobeError> {
        let product = self
            .products
            .iter_mut()
            .find(|p| p.id == product_id)
            .ok_or_else(|| WardrobeError::ProductNotFound {
                id: product_id.to_string(),
            })?;
        let note = note.trim();
        product.user_feedback = (!note.is_empty()).then(|| note.to_string());
        Ok(())
    }

    /// `"<product name>: <note>"` for every product the user commented on.
    pub fn feedback(&self) -> Vec<String> {
        self.products
            .iter()
            .filter_map(|p| p.user_feedback.as_ref().map(|note| format!("{}: {}", p.name, note)))
            .collect()
    }
}

/// Ask the oracle for products that complement the wardrobe.
///
/// An empty catalog returns `Ok(None)` without calling the oracle, as does a
/// reply with neither advice nor any usable product.
///
/// # Errors
/// [`WardrobeError::LlmApiError`] when the oracle cannot be reached.
pub async fn shopping_suggestions(
    oracle: &dyn Oracle,
    catalog: &Catalog,
    tier: PriceTier,
    location: Option<&str>,
    feedback: &[String],
    config: &IngestConfig,
) -> Result<Option<ShoppingAdvice>, WardrobeError> {
    if catalog.is_empty() {
        debug!("Wardrobe is empty, no shopping suggestions requested");
        return Ok(None);
    }

    let location = location.map(str::trim).filter(|l| !l.is_empty());
    let prompt = shopping_prompt(&style_summary(catalog), tier.as_str(), location, feedback);
    debug!(
        "Shopping request: {} items, tier {}, location {:?}, {} notes",
        catalog.len(),
        tier,
        location,
        feedback.len()
    );

    let reply = oracle
        .complete(&[ChatMessage::user(&prompt)], &build_options(config))
        .await
        .map_err(|e| WardrobeError::LlmApiError {
            message: e.to_string(),
        })?;

    let parsed = parse_advice(&reply.content);
    if parsed.is_none() {
        warn!("Shopping reply was not usable JSON ({} bytes)", reply.content.len());
    }
    Ok(parsed)
}

fn style_summary(catalog: &Catalog) -> String {
    catalog
        .items()
        .iter()
        .map(|i| format!("{} {} {}", i.color, i.style, i.category))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_advice(content: &str) -> Option<ShoppingAdvice> {
    let value: Value = serde_json::from_str(&clean_reply(content)).ok()?;
    let (advice, listed) = match &value {
        Value::Object(obj) => (
            text_field(obj, &["advice", "text"]).unwrap_or_default(),
            ["products", "items", "suggestions"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_array)),
        ),
        Value::Array(items) => (String::new(), Some(items)),
        _ => return None,
    };

    let mut products: Vec<ProductSuggestion> = Vec::new();
    for mut product in listed.into_iter().flatten().filter_map(ProductSuggestion::from_value) {
        if product.id.is_empty() || products.iter().any(|p| p.id == product.id) {
            product.id = new_id();
        }
        products.push(product);
    }

    if advice.is_empty() && products.is_empty() {
        return None;
    }
    Some(ShoppingAdvice { advice, products })
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("https://") || s.starts_with("http://")
}
