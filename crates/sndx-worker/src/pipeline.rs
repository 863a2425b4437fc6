//! Sound extraction pipeline.
//!
//! One task runs its stages in order: fetch the source video, probe it,
//! extract the audio track and the cover frame, normalize and split the
//! audio, upload the artifacts, then report a terminal status. The first
//! failing stage skips the rest and the task reports an error status. A
//! failed fetch is the exception: it reports nothing and the error goes back
//! to the caller.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use sndx_media::MediaToolkit;
use sndx_models::{keys, Clip, ClipPatch, ClipStatus, StatusEnvelope, SOUND_EXTRACTOR_MESSAGE_TYPE};
use sndx_queue::StatusSink;
use sndx_storage::{ObjectStore, StorageError};
use tracing::{debug, Instrument};

use crate::error::{PipelineError, StageError};
use crate::logging::TaskLogger;
use crate::metrics;
use crate::publisher::ArtifactPublisher;
use crate::scratch::{FileDeleter, TempArtifactStore};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    ExtractingAudio,
    ExtractingCover,
    Normalizing,
    Chunking,
    PublishingChunks,
    PublishingCover,
    FinalizingSuccess,
    ReportingError,
    SuccessSent,
    ErrorSent,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetching => "fetching",
            Stage::ExtractingAudio => "extracting_audio",
            Stage::ExtractingCover => "extracting_cover",
            Stage::Normalizing => "normalizing",
            Stage::Chunking => "chunking",
            Stage::PublishingChunks => "publishing_chunks",
            Stage::PublishingCover => "publishing_cover",
            Stage::FinalizingSuccess => "finalizing_success",
            Stage::ReportingError => "reporting_error",
            Stage::SuccessSent => "success_sent",
            Stage::ErrorSent => "error_sent",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::SuccessSent | Stage::ErrorSent)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status that was reported for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed,
}

impl TaskOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOutcome::Completed => "completed",
            TaskOutcome::Failed => "failed",
        }
    }
}

/// Runs the extraction pipeline for one clip at a time.
///
/// Holds no per-task state, so one orchestrator serves concurrent tasks.
pub struct PipelineOrchestrator {
    storage: Arc<dyn ObjectStore>,
    media: Arc<dyn MediaToolkit>,
    status: Arc<dyn StatusSink>,
    deleter: Arc<dyn FileDeleter>,
    publisher: ArtifactPublisher,
    scratch_dir: PathBuf,
    message_type: String,
}

impl PipelineOrchestrator {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        media: Arc<dyn MediaToolkit>,
        status: Arc<dyn StatusSink>,
        deleter: Arc<dyn FileDeleter>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            publisher: ArtifactPublisher::new(Arc::clone(&storage)),
            storage,
            media,
            status,
            deleter,
            scratch_dir: scratch_dir.into(),
            message_type: SOUND_EXTRACTOR_MESSAGE_TYPE.to_string(),
        }
    }

    /// Override the type tag attached to status messages.
    pub fn with_message_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = message_type.into();
        self
    }

    /// Process one clip end to end.
    ///
    /// Returns the reported outcome once the terminal status was sent. Scratch
    /// files for the task are gone by the time this returns, on every path.
    pub async fn run(&self, clip: &Clip) -> Result<TaskOutcome, PipelineError> {
        let logger = TaskLogger::new(&clip.id, "sound_extraction");
        let span = logger.create_span();
        self.run_task(clip, &logger).instrument(span).await
    }

    async fn run_task(
        &self,
        clip: &Clip,
        logger: &TaskLogger,
    ) -> Result<TaskOutcome, PipelineError> {
        let started = Instant::now();
        metrics::record_task_started();
        logger.log_start(&format!("source {}", clip.source_key()));

        // Identifiers become file names; refuse them before touching disk.
        if let Err(e) = clip.validate() {
            let err = StageError::from(e);
            self.log_stage_failure(logger, &err);
            let outcome = self.report(StatusEnvelope::failed(clip), logger).await?;
            metrics::record_task_outcome(outcome.as_str(), started.elapsed().as_secs_f64());
            return Ok(outcome);
        }

        let scratch = TempArtifactStore::create(
            &self.scratch_dir,
            &clip.id,
            Arc::clone(&self.deleter),
        )
        .await
        .map_err(|e| PipelineError::Fetch(StorageError::Io(e)))?;

        enter(logger, Stage::Fetching);
        let source = scratch.source_path(&clip.original_video.name);
        if let Err(e) = self.storage.download_file(&clip.source_key(), &source).await {
            logger.log_error(&format!("Failed to fetch source video: {}", e));
            metrics::record_fetch_failure();
            scratch.cleanup_all().await;
            return Err(PipelineError::Fetch(e));
        }

        let result = self.extract_and_publish(clip, &scratch, &source, logger).await;
        scratch.cleanup_all().await;

        let envelope = match result {
            Ok(patch) => {
                enter(logger, Stage::FinalizingSuccess);
                metrics::record_chunks_published(patch.audios.len());
                StatusEnvelope::completed(clip, patch)
            }
            Err(err) => {
                self.log_stage_failure(logger, &err);
                enter(logger, Stage::ReportingError);
                StatusEnvelope::failed(clip)
            }
        };

        let outcome = self.report(envelope, logger).await?;
        metrics::record_task_outcome(outcome.as_str(), started.elapsed().as_secs_f64());
        Ok(outcome)
    }

    async fn extract_and_publish(
        &self,
        clip: &Clip,
        scratch: &TempArtifactStore,
        source: &Path,
        logger: &TaskLogger,
    ) -> Result<ClipPatch, StageError> {
        let duration = self
            .media
            .probe_duration(source)
            .await
            .map_err(StageError::Extraction)?;
        debug!("Source duration: {:.3}s", duration);

        enter(logger, Stage::ExtractingAudio);
        let audio = scratch.path(&format!("{}.mp3", clip.id));
        self.media
            .extract_audio(source, &audio)
            .await
            .map_err(StageError::Extraction)?;

        enter(logger, Stage::ExtractingCover);
        let frame = scratch.path(&keys::cover_file_name(&clip.id));
        self.media
            .extract_cover_frame(source, &frame, duration)
            .await
            .map_err(StageError::Extraction)?;

        enter(logger, Stage::Normalizing);
        let wav = self
            .media
            .normalize_audio(&audio)
            .await
            .map_err(StageError::Chunking)?;
        scratch.track(&wav);

        enter(logger, Stage::Chunking);
        let chunks = self
            .media
            .split_audio(&wav, &clip.id, scratch.root())
            .await
            .map_err(StageError::Chunking)?;
        for chunk in &chunks {
            scratch.track(&chunk.path);
        }
        logger.log_progress(&format!("Split audio into {} chunks", chunks.len()));

        enter(logger, Stage::PublishingChunks);
        let names = self
            .publisher
            .publish_chunks(&chunks, &clip.user_id, &clip.id, scratch)
            .await?;

        enter(logger, Stage::PublishingCover);
        if let Err(e) = self
            .publisher
            .publish_cover(&frame, &clip.user_id, &clip.id)
            .await
        {
            // Chunks are already in storage at this point.
            let uploaded = names
                .iter()
                .map(|name| keys::chunk_key(&clip.user_id, &clip.id, name))
                .collect();
            return Err(StageError::Publish(crate::error::PublishError { uploaded, ..e }));
        }

        Ok(ClipPatch::new(&clip.id, duration, names))
    }

    async fn report(
        &self,
        envelope: StatusEnvelope,
        logger: &TaskLogger,
    ) -> Result<TaskOutcome, PipelineError> {
        let status = envelope
            .status()
            .cloned()
            .unwrap_or(ClipStatus::SoundExtractorError);
        let (outcome, terminal) = match status {
            ClipStatus::SoundExtractorComplete => (TaskOutcome::Completed, Stage::SuccessSent),
            _ => (TaskOutcome::Failed, Stage::ErrorSent),
        };

        if let Err(source) = self.status.send_message(&envelope, &self.message_type).await {
            logger.log_error(&format!("Failed to report {}: {}", status, source));
            metrics::record_report_failure();
            return Err(PipelineError::Report { status, source });
        }

        enter(logger, terminal);
        logger.log_completion(&format!("reported {}", status));
        Ok(outcome)
    }

    fn log_stage_failure(&self, logger: &TaskLogger, err: &StageError) {
        metrics::record_stage_failure(err.kind());
        logger.log_error(&format!("{} stage failed: {}", err.kind(), err));

        if let StageError::Publish(publish) = err {
            if !publish.uploaded.is_empty() {
                metrics::record_orphaned_chunks(publish.uploaded.len());
                logger.log_warning(&format!(
                    "Artifacts left in storage after failed upload: {}",
                    publish.uploaded.join(", ")
                ));
            }
        }
    }
}

fn enter(logger: &TaskLogger, stage: Stage) {
    logger.log_progress(stage.as_str());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::ExtractingCover.to_string(), "extracting_cover");
        assert!(Stage::SuccessSent.is_terminal());
        assert!(Stage::ErrorSent.is_terminal());
        assert!(!Stage::ReportingError.is_terminal());
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(TaskOutcome::Completed.as_str(), "completed");
        assert_eq!(TaskOutcome::Failed.as_str(), "failed");
    }
}
