//! Worker error types.

use sndx_models::{ClipError, ClipStatus};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors surfaced by the executor.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Queue error: {0}")]
    Queue(#[from] sndx_queue::QueueError),
}

impl WorkerError {
    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }
}

/// An artifact upload that aborted publishing.
#[derive(Debug, Error)]
#[error("Upload of {key} failed: {source}")]
pub struct PublishError {
    /// Key whose upload failed
    pub key: String,
    /// Keys uploaded before the failure; they stay in storage
    pub uploaded: Vec<String>,
    #[source]
    pub source: sndx_storage::StorageError,
}

/// Failure of one pipeline stage other than the fetch.
///
/// Every kind reports the same error status downstream; the kind is only
/// used for logs and metrics.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Invalid task: {0}")]
    InvalidTask(#[from] ClipError),

    #[error("Extraction failed: {0}")]
    Extraction(#[source] sndx_media::MediaError),

    #[error("Chunking failed: {0}")]
    Chunking(#[source] sndx_media::MediaError),

    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),
}

impl StageError {
    /// Short label for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::InvalidTask(_) => "invalid_task",
            StageError::Extraction(_) => "extraction",
            StageError::Chunking(_) => "chunking",
            StageError::Publish(_) => "publish",
        }
    }
}

/// Pipeline failures returned to the task framework.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The source video could not be fetched; no status was sent.
    #[error("Fetch failed: {0}")]
    Fetch(#[source] sndx_storage::StorageError),

    /// The terminal status could not be sent.
    #[error("Failed to report {status}: {source}")]
    Report {
        status: ClipStatus,
        #[source]
        source: sndx_queue::QueueError,
    },
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "fetch",
            PipelineError::Report { .. } => "report",
        }
    }
}
