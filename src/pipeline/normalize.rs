//! Image normalisation: arbitrary photo bytes → bounded-size JPEG.
//!
//! Phone photos arrive at 12–48 MP. The recognition oracle needs far less
//! than that to find garments, and every byte is uploaded inline as base64,
//! so each photo is downsampled until its longest edge fits `max_edge`
//! (default 1200 px) and re-encoded as JPEG. Images already inside the
//! bound are re-encoded at their original size; they are never upscaled.

use crate::config::IngestConfig;
use crate::error::UploadError;
use crate::pipeline::input::RawUpload;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::fmt;
use tracing::debug;

/// Longest edge, in pixels, of a normalised upload.
pub const DEFAULT_MAX_EDGE: u32 = 1200;

/// JPEG quality for normalised uploads.
pub const DEFAULT_NORMALIZE_QUALITY: u8 = 80;

/// A re-encoded JPEG plus its pixel dimensions.
///
/// This is a value, not an entity: it is derived from a [`RawUpload`] (or
/// from a crop of another `NormalizedImage`) and carries no identity.
#[derive(Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl fmt::Debug for NormalizedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl NormalizedImage {
    /// JPEG-encode `img` at `quality` (1–100).
    pub fn encode(img: &DynamicImage, quality: u8, upload_id: &str) -> Result<Self, UploadError> {
        let mut bytes = Vec::new();
        // JPEG has no alpha channel; flatten first.
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100)))
            .map_err(|e| UploadError::Encode {
                upload: upload_id.to_string(),
                detail: e.to_string(),
            })?;

        Ok(Self {
            bytes,
            width: rgb.width(),
            height: rgb.height(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Self-contained inline form, e.g. for an `<img src>` or a JSON catalog.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), self.to_base64())
    }

    /// Attachment for a vision chat message.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.to_base64(), self.mime_type()).with_detail("high")
    }

    /// Decode back to pixels (used by the cropper).
    pub fn decode(&self) -> Result<DynamicImage, image::ImageError> {
        image::load_from_memory(&self.bytes)
    }
}

/// Scale factor that brings the longest edge within `max_edge`. Never above 1.
pub fn scale_factor(width: u32, height: u32, max_edge: u32) -> f64 {
    let longest = width.max(height);
    if longest == 0 || longest <= max_edge {
        1.0
    } else {
        f64::from(max_edge) / f64::from(longest)
    }
}

/// Output dimensions for a `width × height` source, aspect ratio preserved.
pub fn target_dimensions(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let s = scale_factor(width, height, max_edge);
    if s >= 1.0 {
        return (width, height);
    }
    let scale = |v: u32| ((f64::from(v) * s).round() as u32).clamp(1, max_edge);
    (scale(width), scale(height))
}

/// Decode, downsample and re-encode one upload. Pure and blocking.
pub fn normalize(
    upload_id: &str,
    bytes: &[u8],
    max_edge: u32,
    quality: u8,
) -> Result<NormalizedImage, UploadError> {
    let img = image::load_from_memory(bytes).map_err(|e| UploadError::Decode {
        upload: upload_id.to_string(),
        detail: e.to_string(),
    })?;

    let (w, h) = (img.width(), img.height());
    let (tw, th) = target_dimensions(w, h, max_edge);
    let resized = if (tw, th) == (w, h) {
        img
    } else {
        img.resize_exact(tw, th, FilterType::Triangle)
    };

    let out = NormalizedImage::encode(&resized, quality, upload_id)?;
    debug!(
        "Normalised upload {}: {}x{} → {}x{} ({} bytes)",
        upload_id,
        w,
        h,
        out.width(),
        out.height(),
        out.bytes().len()
    );
    Ok(out)
}

/// Normalise on the blocking pool so decode/resize never stalls the runtime.
pub async fn normalize_upload(
    upload: &RawUpload,
    config: &IngestConfig,
) -> Result<NormalizedImage, UploadError> {
    let id = upload.id.clone();
    let bytes = upload.bytes();
    let max_edge = config.max_edge;
    let quality = config.normalize_quality;

    tokio::task::spawn_blocking(move || normalize(&id, &bytes, max_edge, quality))
        .await
        .map_err(|e| UploadError::Decode {
            upload: upload.id.clone(),
            detail: format!("normalise task panicked: {e}"),
        })?
}
