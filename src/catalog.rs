//! The wardrobe catalog: an explicit, owned collection of [`CatalogItem`]s.
//!
//! Nothing in the pipeline touches a catalog. Ingestion hands back new items
//! and the caller decides whether to [`Catalog::add_items`] them; wear
//! logging, edits and deletes all go through this handle.
//!
//! Persistence is a single JSON array document, the same shape the items
//! take on the wire. [`Catalog::save`] writes to a temp file in the target
//! directory and renames it over the old document, so a crash mid-write
//! never leaves a truncated catalog behind.

use crate::error::WardrobeError;
use crate::model::{CatalogItem, ClothingCategory};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    items: Vec<CatalogItem>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<CatalogItem>) -> Self {
        Self { items }
    }

    /// Load a catalog document. A missing file is an empty catalog.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WardrobeError> {
        let items: Vec<CatalogItem> = read_json_document(path.as_ref())?;
        debug!("Loaded {} items from {}", items.len(), path.as_ref().display());
        Ok(Self { items })
    }

    /// Atomically write the catalog as a JSON document.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), WardrobeError> {
        write_json_atomic(path.as_ref(), &self.items)?;
        info!("Saved {} items to {}", self.items.len(), path.as_ref().display());
        Ok(())
    }

    /// Append freshly ingested items; returns how many were added.
    pub fn add_items(&mut self, items: impl IntoIterator<Item = CatalogItem>) -> usize {
        let before = self.items.len();
        self.items.extend(items);
        self.items.len() - before
    }

    /// Replace the item with the same id.
    pub fn update_item(&mut self, item: CatalogItem) -> Result<(), WardrobeError> {
        let slot = self
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or_else(|| WardrobeError::ItemNotFound { id: item.id.clone() })?;
        *slot = item;
        Ok(())
    }

    pub fn delete_item(&mut self, id: &str) -> Result<CatalogItem, WardrobeError> {
        let pos = self
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| WardrobeError::ItemNotFound { id: id.to_string() })?;
        Ok(self.items.remove(pos))
    }

    /// Increment `wearCount` once for every item whose id is listed.
    ///
    /// Unknown ids are ignored and a repeated id counts once. Returns the
    /// number of items touched.
    pub fn mark_worn<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        let mut touched = 0;
        for item in &mut self.items {
            if ids.iter().any(|id| id.as_ref() == item.id) {
                item.wear_count = item.wear_count.saturating_add(1);
                touched += 1;
            }
        }
        touched
    }

    pub fn get(&self, id: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in `category` (or all) whose name, description, colour or style
    /// contains `query`, case-insensitively. An empty query matches everything.
    pub fn filter<'a>(
        &'a self,
        category: Option<ClothingCategory>,
        query: &str,
    ) -> impl Iterator<Item = &'a CatalogItem> + 'a {
        let needle = query.trim().to_lowercase();
        self.items.iter().filter(move |item| {
            category.is_none_or(|c| item.category == c)
                && (needle.is_empty()
                    || [&item.name, &item.description, &item.color, &item.style]
                        .iter()
                        .any(|field| field.to_lowercase().contains(&needle)))
        })
    }

    /// Up to `n` most-worn items, ignoring ones never worn.
    pub fn favorites(&self, n: usize) -> Vec<&CatalogItem> {
        let mut worn: Vec<&CatalogItem> = self.items.iter().filter(|i| i.wear_count > 0).collect();
        worn.sort_by(|a, b| b.wear_count.cmp(&a.wear_count));
        worn.truncate(n);
        worn
    }
}

/// Read a JSON document, treating a missing or blank file as `T::default()`.
pub(crate) fn read_json_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T, WardrobeError> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No document at {}, starting empty", path.display());
            return Ok(T::default());
        }
        Err(e) => {
            return Err(WardrobeError::CatalogIo {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    if text.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&text).map_err(|e| WardrobeError::CatalogCorrupt {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Write `value` to a temp file beside `path`, then rename it into place.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), WardrobeError> {
    let io_err = |e: std::io::Error| WardrobeError::CatalogIo {
        path: path.to_path_buf(),
        source: e,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| WardrobeError::Internal(format!("serialising {}: {e}", path.display())))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(&json).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{defaults, CandidateDescriptor};
    use crate::pipeline::normalize::NormalizedImage;
    use image::{DynamicImage, Rgb, RgbImage};

    fn item(name: &str, category: ClothingCategory, color: &str) -> CatalogItem {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])));
        let crop = NormalizedImage::encode(&img, 90, "t").unwrap();
        let mut it = CatalogItem::synthesize(&CandidateDescriptor::default(), &crop);
        it.name = name.to_string();
        it.category = category;
        it.color = color.to_string();
        it
    }

    fn sample() -> Catalog {
        Catalog::from_items(vec![
            item("White Oxford", ClothingCategory::Shirt, "White"),
            item("Raw Denim", ClothingCategory::Pants, "Indigo"),
            item("Chelsea Boots", ClothingCategory::Shoes, "Brown"),
        ])
    }

    #[test]
    fn update_and_delete_unknown_ids_fail() {
        let mut c = sample();
        let mut ghost = c.items()[0].clone();
        ghost.id = "ghost".into();
        assert!(matches!(c.update_item(ghost), Err(WardrobeError::ItemNotFound { .. })));
        assert!(matches!(c.delete_item("ghost"), Err(WardrobeError::ItemNotFound { .. })));
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn update_replaces_in_place() {
        let mut c = sample();
        let mut edited = c.items()[1].clone();
        edited.name = "Selvedge Denim".into();
        c.update_item(edited.clone()).unwrap();
        assert_eq!(c.items()[1], edited);
    }

    #[test]
    fn mark_worn_counts_each_item_once() {
        let mut c = sample();
        let id = c.items()[0].id.clone();
        let touched = c.mark_worn(&[id.as_str(), id.as_str(), "unknown"]);
        assert_eq!(touched, 1);
        assert_eq!(c.get(&id).unwrap().wear_count, 1);
    }

    #[test]
    fn filter_by_category_and_query() {
        let c = sample();
        assert_eq!(c.filter(None, "").count(), 3);
        assert_eq!(c.filter(Some(ClothingCategory::Pants), "").count(), 1);
        let hits: Vec<_> = c.filter(None, "BROWN").map(|i| i.name.as_str()).collect();
        assert_eq!(hits, vec!["Chelsea Boots"]);
        assert_eq!(c.filter(Some(ClothingCategory::Shirt), "boots").count(), 0);
        // Every synthesised item carries the default style.
        assert_eq!(c.filter(None, &defaults::STYLE.to_lowercase()).count(), 3);
    }

    #[test]
    fn favorites_skip_unworn_and_sort_desc() {
        let mut c = sample();
        let ids: Vec<String> = c.items().iter().map(|i| i.id.clone()).collect();
        c.mark_worn(&[&ids[2]]);
        c.mark_worn(&[&ids[2], &ids[0]]);
        let fav: Vec<_> = c.favorites(3).iter().map(|i| i.name.clone()).collect();
        assert_eq!(fav, vec!["Chelsea Boots", "White Oxford"]);
        assert_eq!(c.favorites(1).len(), 1);
    }

    #[test]
    fn save_then_load_preserves_items() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("wardrobe.json");
        let mut c = sample();
        let id = c.items()[0].id.clone();
        c.mark_worn(&[id]);
        c.save(&path).unwrap();
        assert_eq!(Catalog::load(&path).unwrap(), c);
    }

    #[test]
    fn load_missing_is_empty_and_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Catalog::load(dir.path().join("none.json")).unwrap().is_empty());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{not json").unwrap();
        assert!(matches!(Catalog::load(&bad), Err(WardrobeError::CatalogCorrupt { .. })));
    }

    #[test]
    fn load_accepts_documents_without_wear_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(
            &path,
            r##"[{"id":"x1","image":"data:image/jpeg;base64,","category":"shoes","silhouette":"sneakers",
                "name":"Runners","color":"White","hexColor":"#FFFFFF","material":"Mesh","pattern":"Solid",
                "style":"Sporty","season":"All-season","description":"Daily trainers."}]"##,
        )
        .unwrap();
        let c = Catalog::load(&path).unwrap();
        assert_eq!(c.get("x1").unwrap().wear_count, 0);
        assert_eq!(c.get("x1").unwrap().category, ClothingCategory::Shoes);
    }
}
