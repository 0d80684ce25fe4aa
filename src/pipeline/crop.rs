//! Region cropping: 0–1000 bounding box → padded JPEG crop.
//!
//! Boxes come from the oracle on a resolution-independent 0–1000 axis in
//! `[ymin, xmin, ymax, xmax]` order. Each box is clamped to the axis,
//! mapped to pixels, padded by a fraction of its shorter side so the garment
//! is not cut flush at the edges, and clamped again to the image so the
//! rectangle never leaves `[0, W) × [0, H)`.
//!
//! A box with no area (after clamping) is rejected before any pixel math:
//! padding a zero-width box would otherwise still produce a one-pixel sliver.

use crate::config::IngestConfig;
use crate::error::UploadError;
use crate::pipeline::normalize::NormalizedImage;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound of the normalised coordinate axis.
pub const AXIS_MAX: f64 = 1000.0;

/// Padding as a fraction of the box's shorter pixel side.
pub const DEFAULT_CROP_PADDING: f64 = 0.10;

/// JPEG quality for stored crops; higher than uploads since this is the kept artefact.
pub const DEFAULT_CROP_QUALITY: u8 = 90;

/// Region of interest on the fixed 0–1000 axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub ymin: f64,
    pub xmin: f64,
    pub ymax: f64,
    pub xmax: f64,
}

impl BoundingBox {
    pub const FULL_FRAME: BoundingBox = BoundingBox {
        ymin: 0.0,
        xmin: 0.0,
        ymax: AXIS_MAX,
        xmax: AXIS_MAX,
    };

    pub fn new(ymin: f64, xmin: f64, ymax: f64, xmax: f64) -> Self {
        Self { ymin, xmin, ymax, xmax }
    }

    /// `[ymin, xmin, ymax, xmax]`; anything else (or a non-finite value) is rejected.
    pub fn from_slice(coords: &[f64]) -> Option<Self> {
        match coords {
            [ymin, xmin, ymax, xmax] if coords.iter().all(|c| c.is_finite()) => {
                Some(Self::new(*ymin, *xmin, *ymax, *xmax))
            }
            _ => None,
        }
    }

    /// Every coordinate clamped into `[0, AXIS_MAX]`.
    pub fn clamped(&self) -> Self {
        let c = |v: f64| v.clamp(0.0, AXIS_MAX);
        Self::new(c(self.ymin), c(self.xmin), c(self.ymax), c(self.xmax))
    }

    /// True when the clamped box has no area (including inverted boxes).
    pub fn is_degenerate(&self) -> bool {
        let b = self.clamped();
        b.ymin >= b.ymax || b.xmin >= b.xmax
    }
}

/// Pixel rectangle inside a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Map `bbox` to a padded pixel rectangle inside a `width × height` image.
///
/// Returns `None` for degenerate boxes or when nothing is left after clamping.
pub fn pixel_rect(bbox: &BoundingBox, width: u32, height: u32, padding_ratio: f64) -> Option<PixelRect> {
    if width == 0 || height == 0 || bbox.is_degenerate() {
        return None;
    }
    let b = bbox.clamped();
    let (w, h) = (f64::from(width), f64::from(height));

    let left = b.xmin / AXIS_MAX * w;
    let top = b.ymin / AXIS_MAX * h;
    let right = b.xmax / AXIS_MAX * w;
    let bottom = b.ymax / AXIS_MAX * h;

    let ratio = if padding_ratio.is_finite() { padding_ratio.max(0.0) } else { 0.0 };
    let pad = (right - left).min(bottom - top) * ratio;

    let x0 = (left - pad).max(0.0).floor() as u32;
    let y0 = (top - pad).max(0.0).floor() as u32;
    let x1 = ((right + pad).min(w).ceil() as u32).min(width);
    let y1 = ((bottom + pad).min(h).ceil() as u32).min(height);

    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(PixelRect {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

/// Crop one region out of an already-decoded image and encode it.
pub fn crop(
    image: &DynamicImage,
    bbox: &BoundingBox,
    padding_ratio: f64,
    quality: u8,
    upload_id: &str,
    region: usize,
) -> Result<NormalizedImage, UploadError> {
    let rect = pixel_rect(bbox, image.width(), image.height(), padding_ratio).ok_or_else(|| {
        UploadError::DegenerateRegion {
            upload: upload_id.to_string(),
            region,
        }
    })?;

    debug!(
        "Upload {} region {}: crop {}x{} at ({}, {})",
        upload_id, region, rect.width, rect.height, rect.x, rect.y
    );
    let cropped = image.crop_imm(rect.x, rect.y, rect.width, rect.height);
    NormalizedImage::encode(&cropped, quality, upload_id)
}

/// Decode `source` once and crop every box out of it.
///
/// The outer `Err` means the source itself could not be decoded; inner
/// errors are per region and leave the other regions untouched.
pub fn crop_regions(
    source: &NormalizedImage,
    boxes: &[BoundingBox],
    padding_ratio: f64,
    quality: u8,
    upload_id: &str,
) -> Result<Vec<Result<NormalizedImage, UploadError>>, UploadError> {
    let decoded = source.decode().map_err(|e| UploadError::Decode {
        upload: upload_id.to_string(),
        detail: e.to_string(),
    })?;

    Ok(boxes
        .iter()
        .enumerate()
        .map(|(region, bbox)| crop(&decoded, bbox, padding_ratio, quality, upload_id, region))
        .collect())
}

/// [`crop_regions`] on the blocking pool.
pub async fn crop_regions_blocking(
    source: &NormalizedImage,
    boxes: Vec<BoundingBox>,
    config: &IngestConfig,
    upload_id: &str,
) -> Result<Vec<Result<NormalizedImage, UploadError>>, UploadError> {
    let source = source.clone();
    let id = upload_id.to_string();
    let padding = config.crop_padding;
    let quality = config.crop_quality;

    tokio::task::spawn_blocking(move || crop_regions(&source, &boxes, padding, quality, &id))
        .await
        .map_err(|e| UploadError::Encode {
            upload: upload_id.to_string(),
            detail: format!("crop task panicked: {e}"),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn source(w: u32, h: u32) -> NormalizedImage {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([90, 90, 90])));
        NormalizedImage::encode(&img, 80, "src").unwrap()
    }

    #[test]
    fn edge_box_padding_is_clamped_not_negative() {
        let b = BoundingBox::new(0.0, 0.0, 500.0, 500.0);
        let r = pixel_rect(&b, 1000, 1000, 0.10).unwrap();
        // 500 px box → 50 px padding; left/top clamp to 0, right/bottom grow to 550.
        assert_eq!(r, PixelRect { x: 0, y: 0, width: 550, height: 550 });
    }

    #[test]
    fn interior_box_gets_symmetric_padding() {
        let b = BoundingBox::new(200.0, 100.0, 600.0, 300.0);
        let r = pixel_rect(&b, 1000, 1000, 0.10).unwrap();
        // 200×400 box → padding 20 on every side.
        assert_eq!(r, PixelRect { x: 80, y: 180, width: 240, height: 440 });
    }

    #[test]
    fn full_frame_stays_inside_image() {
        let r = pixel_rect(&BoundingBox::FULL_FRAME, 640, 480, 0.10).unwrap();
        assert_eq!(r, PixelRect { x: 0, y: 0, width: 640, height: 480 });
    }

    #[test]
    fn rect_always_within_bounds() {
        let sizes = [(1, 1), (3, 7), (640, 480), (1200, 900), (1000, 1000), (17, 1200)];
        let steps = [0.0, 1.0, 99.5, 250.0, 333.3, 500.0, 749.9, 999.0, 1000.0];
        for &(w, h) in &sizes {
            for &ymin in &steps {
                for &xmin in &steps {
                    for &ymax in &steps {
                        for &xmax in &steps {
                            if ymin >= ymax || xmin >= xmax {
                                continue;
                            }
                            let b = BoundingBox::new(ymin, xmin, ymax, xmax);
                            if let Some(r) = pixel_rect(&b, w, h, 0.10) {
                                assert!(r.width > 0 && r.height > 0);
                                assert!(r.x + r.width <= w, "{b:?} on {w}x{h} → {r:?}");
                                assert!(r.y + r.height <= h, "{b:?} on {w}x{h} → {r:?}");
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn degenerate_boxes_yield_none() {
        for b in [
            BoundingBox::new(300.0, 100.0, 300.0, 400.0),
            BoundingBox::new(100.0, 250.0, 400.0, 250.0),
            BoundingBox::new(500.0, 500.0, 100.0, 100.0),
            BoundingBox::new(1200.0, 0.0, 1500.0, 1000.0),
            BoundingBox::new(-50.0, -50.0, -10.0, -10.0),
        ] {
            assert!(b.is_degenerate(), "{b:?}");
            assert_eq!(pixel_rect(&b, 1000, 1000, 0.10), None);
        }
    }

    #[test]
    fn out_of_range_coordinates_are_clamped() {
        let b = BoundingBox::new(-100.0, -100.0, 1500.0, 1500.0);
        assert!(!b.is_degenerate());
        assert_eq!(b.clamped(), BoundingBox::FULL_FRAME);
        let r = pixel_rect(&b, 200, 100, 0.10).unwrap();
        assert_eq!(r, PixelRect { x: 0, y: 0, width: 200, height: 100 });
    }

    #[test]
    fn from_slice_requires_four_finite_values() {
        assert!(BoundingBox::from_slice(&[1.0, 2.0, 3.0]).is_none());
        assert!(BoundingBox::from_slice(&[1.0, 2.0, 3.0, f64::NAN]).is_none());
        assert_eq!(
            BoundingBox::from_slice(&[1.0, 2.0, 3.0, 4.0]),
            Some(BoundingBox::new(1.0, 2.0, 3.0, 4.0))
        );
    }

    #[test]
    fn crop_produces_expected_dimensions() {
        let src = source(400, 200);
        let img = src.decode().unwrap();
        let out = crop(&img, &BoundingBox::new(250.0, 250.0, 750.0, 750.0), 0.10, 90, "u", 0).unwrap();
        // 200×100 px box, padding 10 → 220×120.
        assert_eq!((out.width(), out.height()), (220, 120));
    }

    #[test]
    fn crop_regions_skips_only_degenerate_region() {
        let src = source(100, 100);
        let boxes = [
            BoundingBox::new(0.0, 0.0, 500.0, 500.0),
            BoundingBox::new(300.0, 300.0, 300.0, 600.0),
            BoundingBox::new(500.0, 500.0, 1000.0, 1000.0),
        ];
        let out = crop_regions(&src, &boxes, 0.10, 90, "u").unwrap();
        assert_eq!(out.len(), 3);
        assert!(out[0].is_ok());
        assert_eq!(
            out[1],
            Err(UploadError::DegenerateRegion { upload: "u".into(), region: 1 })
        );
        assert!(out[2].is_ok());
    }
}
