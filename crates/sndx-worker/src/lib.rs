//! Sound extraction worker.
//!
//! This crate provides:
//! - The extraction pipeline: fetch, extract, normalize, chunk, publish, report
//! - Task-scoped scratch files with guaranteed cleanup
//! - Artifact publishing under the clip's storage prefix
//! - The queue executor with bounded concurrency and graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod publisher;
pub mod scratch;

pub use config::WorkerConfig;
pub use error::{PipelineError, PublishError, StageError, WorkerError, WorkerResult};
pub use executor::TaskExecutor;
pub use logging::TaskLogger;
pub use pipeline::{PipelineOrchestrator, Stage, TaskOutcome};
pub use publisher::ArtifactPublisher;
pub use scratch::{FileDeleter, LocalFileDeleter, TempArtifactStore};
