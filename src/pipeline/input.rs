//! Input resolution: turn a user-supplied path, URL or byte buffer into a
//! [`RawUpload`].
//!
//! Nothing here inspects the bytes. Whether they are a decodable image is
//! decided by the normaliser, which reports a per-upload `Decode` error
//! instead of failing the whole batch.

use crate::error::WardrobeError;
use crate::model::new_id;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// An opaque photo blob waiting to be normalised.
#[derive(Clone)]
pub struct RawUpload {
    /// Fresh identifier generated when the upload is created.
    pub id: String,
    /// Human-readable origin (file name or URL) for logs and progress output.
    pub label: String,
    bytes: Arc<[u8]>,
}

impl fmt::Debug for RawUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawUpload")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

impl RawUpload {
    pub fn from_bytes(label: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            id: new_id(),
            label: label.into(),
            bytes: Arc::from(bytes.into()),
        }
    }

    /// Shared handle to the raw bytes (cheap to clone into blocking tasks).
    pub fn bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read a local file or download a URL into a [`RawUpload`].
pub async fn resolve_upload(input: &str, timeout_secs: u64) -> Result<RawUpload, WardrobeError> {
    if input.trim().is_empty() {
        return Err(WardrobeError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<RawUpload, WardrobeError> {
    let path = PathBuf::from(path_str);

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(WardrobeError::PermissionDenied { path });
        }
        Err(_) => return Err(WardrobeError::FileNotFound { path }),
    };

    let label = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path_str.to_string());
    debug!("Read local upload {} ({} bytes)", path.display(), bytes.len());
    Ok(RawUpload::from_bytes(label, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<RawUpload, WardrobeError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| WardrobeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            WardrobeError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            WardrobeError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(WardrobeError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| WardrobeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes from {}", bytes.len(), url);
    Ok(RawUpload::from_bytes(filename_from_url(url), bytes.to_vec()))
}

/// Last path segment of the URL, or the URL itself.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/shirt.jpg"));
        assert!(is_url("http://example.com/shirt.jpg"));
        assert!(!is_url("/tmp/shirt.jpg"));
        assert!(!is_url("shirt.jpg"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_is_taken_from_url_path() {
        assert_eq!(filename_from_url("https://cdn.example.com/a/b/jeans.png?x=1"), "jeans.png");
        assert_eq!(filename_from_url("https://cdn.example.com/"), "https://cdn.example.com/");
    }

    #[test]
    fn uploads_get_distinct_ids() {
        let a = RawUpload::from_bytes("a.jpg", vec![1, 2, 3]);
        let b = RawUpload::from_bytes("a.jpg", vec![1, 2, 3]);
        assert_ne!(a.id, b.id);
        assert_eq!(a.len(), 3);
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = resolve_upload("/definitely/not/here.jpg", 5).await.unwrap_err();
        assert!(matches!(err, WardrobeError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn blank_input_is_invalid() {
        let err = resolve_upload("  ", 5).await.unwrap_err();
        assert!(matches!(err, WardrobeError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn local_file_is_read_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coat.jpg");
        std::fs::write(&path, b"raw bytes").unwrap();

        let upload = resolve_upload(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(upload.label, "coat.jpg");
        assert_eq!(&*upload.bytes(), b"raw bytes");
    }
}
