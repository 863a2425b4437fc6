//! Object storage seam used by the worker.

use std::path::Path;

use async_trait::async_trait;

use crate::client::S3Client;
use crate::error::StorageResult;

/// File transfer against object storage.
///
/// Any `Err` is a hard failure for the caller; there is no partial success.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download `key` into the local file `path`.
    async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()>;

    /// Upload the local file `path` to `key`.
    async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()>;
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        S3Client::download_file(self, key, path).await
    }

    async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()> {
        S3Client::upload_file(self, path, key, content_type).await
    }
}

/// Content type for an artifact, from its extension.
pub fn content_type_for(path: impl AsRef<Path>) -> &'static str {
    let ext = path
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("abc_1.wav"), "audio/wav");
        assert_eq!(content_type_for("/tmp/abc/abc.jpg"), "image/jpeg");
        assert_eq!(content_type_for("CLIP.MP4"), "video/mp4");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }
}
