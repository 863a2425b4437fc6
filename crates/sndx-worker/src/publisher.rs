//! Artifact upload into the clip's storage prefix.

use std::path::Path;
use std::sync::Arc;

use sndx_media::ChunkFile;
use sndx_models::keys;
use sndx_storage::{content_type_for, ObjectStore};
use tracing::{debug, info};

use crate::error::PublishError;
use crate::scratch::TempArtifactStore;

/// Uploads chunks and the cover frame for one clip.
#[derive(Clone)]
pub struct ArtifactPublisher {
    store: Arc<dyn ObjectStore>,
}

impl ArtifactPublisher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Upload chunks in order under `{user_id}/{clip_id}/audios/`.
    ///
    /// Each local chunk is deleted as soon as its upload succeeds. The first
    /// failed upload stops publishing; chunks not yet uploaded stay on disk.
    /// Returns the uploaded chunk file names.
    pub async fn publish_chunks(
        &self,
        chunks: &[ChunkFile],
        user_id: &str,
        clip_id: &str,
        scratch: &TempArtifactStore,
    ) -> Result<Vec<String>, PublishError> {
        let mut uploaded_keys = Vec::with_capacity(chunks.len());
        let mut names = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let name = chunk.file_name();
            let key = keys::chunk_key(user_id, clip_id, &name);

            if let Err(source) = self
                .store
                .upload_file(&chunk.path, &key, content_type_for(&chunk.path))
                .await
            {
                return Err(PublishError {
                    key,
                    uploaded: uploaded_keys,
                    source,
                });
            }

            debug!("Uploaded chunk {}", key);
            scratch.delete(&chunk.path).await;
            uploaded_keys.push(key);
            names.push(name);
        }

        info!(clip_id = %clip_id, "Published {} audio chunks", names.len());
        Ok(names)
    }

    /// Upload the cover frame to `{user_id}/{clip_id}/{clip_id}.jpg`.
    pub async fn publish_cover(
        &self,
        frame: &Path,
        user_id: &str,
        clip_id: &str,
    ) -> Result<String, PublishError> {
        let key = keys::cover_key(user_id, clip_id);
        self.store
            .upload_file(frame, &key, content_type_for(frame))
            .await
            .map_err(|source| PublishError {
                key: key.clone(),
                uploaded: Vec::new(),
                source,
            })?;

        debug!("Uploaded cover {}", key);
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use sndx_models::ChunkName;
    use sndx_storage::{StorageError, StorageResult};

    use super::*;
    use crate::scratch::LocalFileDeleter;

    /// Records uploads and fails the n-th one (1-based).
    struct FlakyStore {
        fail_on: Option<usize>,
        uploads: Mutex<Vec<(String, String)>>,
    }

    impl FlakyStore {
        fn new(fail_on: Option<usize>) -> Self {
            Self {
                fail_on,
                uploads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for FlakyStore {
        async fn download_file(&self, key: &str, _path: &Path) -> StorageResult<()> {
            Err(StorageError::not_found(key))
        }

        async fn upload_file(
            &self,
            _path: &Path,
            key: &str,
            content_type: &str,
        ) -> StorageResult<()> {
            let mut uploads = self.uploads.lock().unwrap();
            if self.fail_on == Some(uploads.len() + 1) {
                return Err(StorageError::upload_failed("503 Slow Down"));
            }
            uploads.push((key.to_string(), content_type.to_string()));
            Ok(())
        }
    }

    async fn write_chunks(scratch: &TempArtifactStore, count: u32) -> Vec<ChunkFile> {
        let mut chunks = Vec::new();
        for n in 1..=count {
            let name = ChunkName::new("abc", n);
            let path = scratch.path(&name.file_name());
            tokio::fs::write(&path, b"RIFF").await.unwrap();
            chunks.push(ChunkFile { name, path });
        }
        chunks
    }

    #[tokio::test]
    async fn test_publish_chunks_uploads_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = TempArtifactStore::create(dir.path(), "abc", Arc::new(LocalFileDeleter))
            .await
            .unwrap();
        let chunks = write_chunks(&scratch, 3).await;
        let store = Arc::new(FlakyStore::new(None));
        let publisher = ArtifactPublisher::new(store.clone());

        let names = publisher
            .publish_chunks(&chunks, "u1", "abc", &scratch)
            .await
            .unwrap();

        assert_eq!(names, vec!["abc_1.wav", "abc_2.wav", "abc_3.wav"]);
        let uploads = store.uploads.lock().unwrap().clone();
        assert_eq!(uploads[0].0, "u1/abc/audios/abc_1.wav");
        assert_eq!(uploads[2].0, "u1/abc/audios/abc_3.wav");
        assert!(uploads.iter().all(|(_, ct)| ct == "audio/wav"));
        assert!(chunks.iter().all(|c| !c.path.exists()));
    }

    #[tokio::test]
    async fn test_publish_chunks_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = TempArtifactStore::create(dir.path(), "abc", Arc::new(LocalFileDeleter))
            .await
            .unwrap();
        let chunks = write_chunks(&scratch, 3).await;
        let store = Arc::new(FlakyStore::new(Some(2)));
        let publisher = ArtifactPublisher::new(store.clone());

        let err = publisher
            .publish_chunks(&chunks, "u1", "abc", &scratch)
            .await
            .unwrap_err();

        assert_eq!(err.key, "u1/abc/audios/abc_2.wav");
        assert_eq!(err.uploaded, vec!["u1/abc/audios/abc_1.wav"]);
        assert_eq!(store.uploads.lock().unwrap().len(), 1);
        assert!(!chunks[0].path.exists());
        assert!(chunks[1].path.exists());
        assert!(chunks[2].path.exists());
    }

    #[tokio::test]
    async fn test_publish_cover_key() {
        let dir = tempfile::tempdir().unwrap();
        let frame = dir.path().join("abc.jpg");
        tokio::fs::write(&frame, b"jpeg").await.unwrap();
        let store = Arc::new(FlakyStore::new(None));
        let publisher = ArtifactPublisher::new(store.clone());

        let key = publisher.publish_cover(&frame, "u1", "abc").await.unwrap();

        assert_eq!(key, "u1/abc/abc.jpg");
        let uploads = store.uploads.lock().unwrap().clone();
        assert_eq!(uploads, vec![("u1/abc/abc.jpg".to_string(), "image/jpeg".to_string())]);
    }
}
