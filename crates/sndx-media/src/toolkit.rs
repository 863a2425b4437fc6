//! Media operations the worker pipeline depends on.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::chunk::{AudioChunker, ChunkFile};
use crate::command::FfmpegRunner;
use crate::error::MediaResult;
use crate::extract::MediaExtractor;
use crate::probe::get_duration;

/// Transcode operations used by the extraction pipeline.
///
/// Implemented by [`FfmpegToolkit`] in production; tests substitute fakes.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Duration of the source in seconds.
    async fn probe_duration(&self, source: &Path) -> MediaResult<f64>;

    /// Write the source's audio track to `audio_path`.
    async fn extract_audio(&self, source: &Path, audio_path: &Path) -> MediaResult<()>;

    /// Write the frame at `duration / 2` to `frame_path`.
    async fn extract_cover_frame(
        &self,
        source: &Path,
        frame_path: &Path,
        duration: f64,
    ) -> MediaResult<()>;

    /// Re-encode audio to mono 16 kHz WAV, returning the new path.
    async fn normalize_audio(&self, audio_path: &Path) -> MediaResult<PathBuf>;

    /// Split normalized audio into time-ordered chunks inside `out_dir`.
    async fn split_audio(
        &self,
        wav_path: &Path,
        task_id: &str,
        out_dir: &Path,
    ) -> MediaResult<Vec<ChunkFile>>;
}

/// [`MediaToolkit`] backed by the ffmpeg/ffprobe binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegToolkit {
    extractor: MediaExtractor,
    chunker: AudioChunker,
}

impl FfmpegToolkit {
    pub fn new(runner: FfmpegRunner, segment_ms: u64) -> Self {
        Self {
            extractor: MediaExtractor::new(runner.clone()),
            chunker: AudioChunker::new(runner).with_segment_ms(segment_ms),
        }
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe_duration(&self, source: &Path) -> MediaResult<f64> {
        get_duration(source).await
    }

    async fn extract_audio(&self, source: &Path, audio_path: &Path) -> MediaResult<()> {
        self.extractor.extract_audio(source, audio_path).await
    }

    async fn extract_cover_frame(
        &self,
        source: &Path,
        frame_path: &Path,
        duration: f64,
    ) -> MediaResult<()> {
        self.extractor
            .extract_cover_frame(source, frame_path, duration)
            .await
    }

    async fn normalize_audio(&self, audio_path: &Path) -> MediaResult<PathBuf> {
        self.chunker.normalize(audio_path).await
    }

    async fn split_audio(
        &self,
        wav_path: &Path,
        task_id: &str,
        out_dir: &Path,
    ) -> MediaResult<Vec<ChunkFile>> {
        self.chunker.split(wav_path, task_id, out_dir).await
    }
}
