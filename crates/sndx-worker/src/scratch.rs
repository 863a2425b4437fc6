//! Task-scoped scratch files.
//!
//! Every task run gets its own directory under the worker's scratch root,
//! named after the task id plus a random suffix, so two runs of the same task
//! never share files. The downloaded source lives in a `source/`
//! subdirectory apart from derived artifacts. Paths handed out are tracked so
//! that a single [`TempArtifactStore::cleanup_all`] call removes whatever a
//! failed run left behind.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

const SOURCE_DIR: &str = "source";

/// Local file deletion helper.
///
/// Implementations never fail: a missing file counts as deleted and other
/// errors are logged.
#[async_trait]
pub trait FileDeleter: Send + Sync {
    async fn delete_file(&self, path: &Path);
}

/// Deletes files from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileDeleter;

#[async_trait]
impl FileDeleter for LocalFileDeleter {
    async fn delete_file(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Deleted scratch file {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete scratch file {}: {}", path.display(), e),
        }
    }
}

/// Scratch directory for one task.
pub struct TempArtifactStore {
    root: PathBuf,
    deleter: Arc<dyn FileDeleter>,
    tracked: Mutex<BTreeSet<PathBuf>>,
}

impl TempArtifactStore {
    /// Create `scratch_root/{task_id}-{uuid}/` and return a store rooted there.
    pub async fn create(
        scratch_root: &Path,
        task_id: &str,
        deleter: Arc<dyn FileDeleter>,
    ) -> io::Result<Self> {
        let root = scratch_root.join(format!("{}-{}", task_id, Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(root.join(SOURCE_DIR)).await?;
        Ok(Self {
            root,
            deleter,
            tracked: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path for a logical file name inside the task directory.
    ///
    /// The same name always maps to the same path.
    pub fn path(&self, name: &str) -> PathBuf {
        let path = self.root.join(name);
        self.track(&path);
        path
    }

    /// Path for the downloaded source file.
    ///
    /// Kept in its own directory so no derived artifact can overwrite it,
    /// whatever the source is called.
    pub fn source_path(&self, name: &str) -> PathBuf {
        let path = self.root.join(SOURCE_DIR).join(name);
        self.track(&path);
        path
    }

    /// Register a file created by someone else for cleanup.
    pub fn track(&self, path: &Path) {
        self.lock().insert(path.to_path_buf());
    }

    /// Delete one file. Safe to call twice or on a path that never existed.
    pub async fn delete(&self, path: &Path) {
        self.deleter.delete_file(path).await;
        self.lock().remove(path);
    }

    /// Delete every tracked file, then the task directory itself.
    pub async fn cleanup_all(&self) {
        let paths: Vec<PathBuf> = std::mem::take(&mut *self.lock()).into_iter().collect();
        for path in &paths {
            self.deleter.delete_file(path).await;
        }

        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove scratch directory {}: {}",
                self.root.display(),
                e
            ),
        }
        debug!("Cleaned up {} scratch files in {}", paths.len(), self.root.display());
    }

    /// Tracked paths that have not been deleted yet.
    pub fn remaining(&self) -> Vec<PathBuf> {
        self.lock().iter().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<PathBuf>> {
        self.tracked.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(dir: &Path) -> TempArtifactStore {
        TempArtifactStore::create(dir, "abc", Arc::new(LocalFileDeleter))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_path_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        assert_eq!(store.path("abc.mp3"), store.path("abc.mp3"));
        assert_eq!(store.path("abc.mp3"), store.root().join("abc.mp3"));
        assert!(store.root().starts_with(dir.path()));
        assert_eq!(store.remaining().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        let keep = store.path("keep.wav");
        let gone = store.path("gone.wav");
        tokio::fs::write(&keep, b"keep").await.unwrap();
        tokio::fs::write(&gone, b"gone").await.unwrap();

        store.delete(&gone).await;
        store.delete(&gone).await;
        store.delete(&store.root().join("never-created.wav")).await;

        assert!(!gone.exists());
        assert!(keep.exists());
        assert_eq!(store.remaining(), vec![keep]);
    }

    #[tokio::test]
    async fn test_cleanup_all_removes_task_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        let audio = store.path("abc.mp3");
        tokio::fs::write(&audio, b"mp3").await.unwrap();
        let untracked = store.root().join("abc_1.wav");
        tokio::fs::write(&untracked, b"wav").await.unwrap();

        store.cleanup_all().await;
        store.cleanup_all().await;

        assert!(!store.root().exists());
        assert!(store.remaining().is_empty());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_tasks_do_not_share_directories() {
        let dir = tempfile::tempdir().unwrap();
        let a = TempArtifactStore::create(dir.path(), "a", Arc::new(LocalFileDeleter))
            .await
            .unwrap();
        let b = TempArtifactStore::create(dir.path(), "b", Arc::new(LocalFileDeleter))
            .await
            .unwrap();

        let file_b = b.path("clip.mp4");
        tokio::fs::write(&file_b, b"video").await.unwrap();
        a.cleanup_all().await;

        assert!(file_b.exists());
    }

    #[tokio::test]
    async fn test_runs_of_same_task_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let first = store(dir.path()).await;
        let second = store(dir.path()).await;
        assert_ne!(first.root(), second.root());

        let source = second.source_path("clip.mp4");
        tokio::fs::write(&source, b"video").await.unwrap();
        first.cleanup_all().await;

        assert!(source.exists());
        assert!(second.root().exists());
    }

    #[tokio::test]
    async fn test_source_cannot_collide_with_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path()).await;

        let source = store.source_path("abc.mp3");
        assert_ne!(source, store.path("abc.mp3"));
        tokio::fs::write(&source, b"video").await.unwrap();

        store.cleanup_all().await;
        assert!(!source.exists());
        assert!(!store.root().exists());
    }
}
