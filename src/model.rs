//! Domain types: clothing categories, oracle descriptors and catalog items.
//!
//! [`CandidateDescriptor`] is the validated, strictly-typed view of one
//! element the recognition oracle returned. Every field is optional because
//! the oracle is untrusted. [`CatalogItem::synthesize`] is the single place
//! where the default table is applied, so a catalog item never carries a
//! blank attribute.

use crate::pipeline::crop::BoundingBox;
use crate::pipeline::normalize::NormalizedImage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Fallback values applied to attributes the oracle left out.
pub mod defaults {
    pub const NAME: &str = "Unnamed Item";
    pub const SILHOUETTE: &str = "tee";
    pub const COLOR: &str = "Unknown";
    /// Neutral slate gray.
    pub const HEX_COLOR: &str = "#CBD5E1";
    pub const MATERIAL: &str = "Unknown";
    pub const PATTERN: &str = "Solid";
    pub const STYLE: &str = "Casual";
    pub const SEASON: &str = "All-season";
    pub const DESCRIPTION: &str = "No description provided.";
}

/// Coarse garment category used for filtering the wardrobe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClothingCategory {
    Shirt,
    Pants,
    Accessory,
    Shoes,
    #[default]
    Other,
}

impl ClothingCategory {
    pub const ALL: [ClothingCategory; 5] = [
        ClothingCategory::Shirt,
        ClothingCategory::Pants,
        ClothingCategory::Accessory,
        ClothingCategory::Shoes,
        ClothingCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClothingCategory::Shirt => "shirt",
            ClothingCategory::Pants => "pants",
            ClothingCategory::Accessory => "accessory",
            ClothingCategory::Shoes => "shoes",
            ClothingCategory::Other => "other",
        }
    }

    /// Lenient mapping of free-form oracle text. Unknown labels become `Other`.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(ClothingCategory::Other)
    }
}

impl fmt::Display for ClothingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClothingCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shirt" | "shirts" | "top" | "tops" => Ok(ClothingCategory::Shirt),
            "pants" | "trousers" | "bottoms" => Ok(ClothingCategory::Pants),
            "accessory" | "accessories" => Ok(ClothingCategory::Accessory),
            "shoes" | "shoe" | "footwear" => Ok(ClothingCategory::Shoes),
            "other" => Ok(ClothingCategory::Other),
            other => Err(format!(
                "unknown category '{other}' (expected shirt, pants, accessory, shoes or other)"
            )),
        }
    }
}

/// One clothing region as reported by the recognition oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateDescriptor {
    pub name: Option<String>,
    pub category: Option<ClothingCategory>,
    pub silhouette: Option<String>,
    pub color: Option<String>,
    pub hex_color: Option<String>,
    pub material: Option<String>,
    pub pattern: Option<String>,
    pub style: Option<String>,
    pub season: Option<String>,
    pub description: Option<String>,
    pub box_2d: Option<BoundingBox>,
}

impl CandidateDescriptor {
    /// Validate one JSON element of the oracle reply.
    ///
    /// Returns `None` when the element is not an object. Unknown keys are
    /// ignored; blank strings, malformed colours and malformed boxes are
    /// treated as absent.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            name: text_field(obj, &["name"]),
            category: text_field(obj, &["category"]).map(|c| ClothingCategory::parse_lenient(&c)),
            silhouette: text_field(obj, &["silhouette"]),
            color: text_field(obj, &["color", "colour"]),
            hex_color: text_field(obj, &["hexColor", "hex_color", "hex"]).filter(|h| is_hex_color(h)),
            material: text_field(obj, &["material"]),
            pattern: text_field(obj, &["pattern"]),
            style: text_field(obj, &["style"]),
            season: text_field(obj, &["season"]),
            description: text_field(obj, &["description"]),
            box_2d: ["box_2d", "box2d", "bbox"]
                .iter()
                .find_map(|k| obj.get(*k))
                .and_then(box_field),
        })
    }

    /// The region to crop; a missing box means the whole photo.
    pub fn region(&self) -> BoundingBox {
        self.box_2d.unwrap_or(BoundingBox::FULL_FRAME)
    }
}

pub(crate) fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

fn box_field(value: &Value) -> Option<BoundingBox> {
    let coords: Vec<f64> = value
        .as_array()?
        .iter()
        .map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    BoundingBox::from_slice(&coords)
}

/// `#RGB` or `#RRGGBB`.
pub fn is_hex_color(s: &str) -> bool {
    match s.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// A persisted wardrobe entry.
///
/// Field names serialise in camelCase so catalog documents stay compatible
/// with the browser storage format (`hexColor`, `wearCount`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: String,
    /// Cropped photo as a `data:image/jpeg;base64,…` URL.
    pub image: String,
    pub category: ClothingCategory,
    pub silhouette: String,
    pub name: String,
    pub color: String,
    pub hex_color: String,
    pub material: String,
    pub pattern: String,
    pub style: String,
    pub season: String,
    pub description: String,
    #[serde(default)]
    pub wear_count: u32,
}

impl CatalogItem {
    /// Build a fresh catalog entry from a descriptor and its cropped image.
    pub fn synthesize(descriptor: &CandidateDescriptor, cropped: &NormalizedImage) -> Self {
        let or = |field: &Option<String>, fallback: &str| {
            field.clone().unwrap_or_else(|| fallback.to_string())
        };
        Self {
            id: new_id(),
            image: cropped.to_data_url(),
            category: descriptor.category.unwrap_or_default(),
            silhouette: or(&descriptor.silhouette, defaults::SILHOUETTE),
            name: or(&descriptor.name, defaults::NAME),
            color: or(&descriptor.color, defaults::COLOR),
            hex_color: or(&descriptor.hex_color, defaults::HEX_COLOR),
            material: or(&descriptor.material, defaults::MATERIAL),
            pattern: or(&descriptor.pattern, defaults::PATTERN),
            style: or(&descriptor.style, defaults::STYLE),
            season: or(&descriptor.season, defaults::SEASON),
            description: or(&descriptor.description, defaults::DESCRIPTION),
            wear_count: 0,
        }
    }
}

/// Fresh opaque identifier for uploads and catalog items.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
