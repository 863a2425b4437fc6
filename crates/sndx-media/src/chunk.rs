//! Audio normalization and fixed-length WAV chunking.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use sndx_models::ChunkName;
use tracing::{debug, info, warn};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Default chunk length: 5 minutes.
pub const DEFAULT_SEGMENT_MS: u64 = 5 * 60 * 1000;
/// Sample rate of normalized audio.
pub const NORMALIZED_SAMPLE_RATE: u32 = 16_000;
/// Channel count of normalized audio.
pub const NORMALIZED_CHANNELS: u16 = 1;

/// One chunk written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFile {
    pub name: ChunkName,
    pub path: PathBuf,
}

impl ChunkFile {
    pub fn file_name(&self) -> String {
        self.name.file_name()
    }
}

/// Normalizes extracted audio and splits it into ordered fixed-length chunks.
#[derive(Debug, Clone)]
pub struct AudioChunker {
    runner: FfmpegRunner,
    segment_ms: u64,
}

impl Default for AudioChunker {
    fn default() -> Self {
        Self::new(FfmpegRunner::new())
    }
}

impl AudioChunker {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self {
            runner,
            segment_ms: DEFAULT_SEGMENT_MS,
        }
    }

    /// Set the chunk length in milliseconds.
    pub fn with_segment_ms(mut self, segment_ms: u64) -> Self {
        self.segment_ms = segment_ms.max(1);
        self
    }

    pub fn segment_ms(&self) -> u64 {
        self.segment_ms
    }

    /// Re-encode audio to mono 16 kHz PCM WAV next to the input.
    ///
    /// Any existing file at the target path is overwritten.
    pub async fn normalize(&self, audio_path: impl AsRef<Path>) -> MediaResult<PathBuf> {
        let audio_path = audio_path.as_ref();
        let wav_path = normalized_path(audio_path);

        let cmd = FfmpegCommand::new(audio_path, &wav_path)
            .pcm_audio(NORMALIZED_CHANNELS, NORMALIZED_SAMPLE_RATE);

        self.runner.run(&cmd).await?;
        debug!("Normalized {} -> {}", audio_path.display(), wav_path.display());
        Ok(wav_path)
    }

    /// Split a WAV file into `{task_id}_{n}.wav` chunks inside `out_dir`.
    ///
    /// Chunks come back in time order starting at 1. Empty audio yields no
    /// chunks. On failure every chunk file written so far is removed.
    pub async fn split(
        &self,
        wav_path: impl AsRef<Path>,
        task_id: &str,
        out_dir: impl AsRef<Path>,
    ) -> MediaResult<Vec<ChunkFile>> {
        let wav_path = wav_path.as_ref().to_path_buf();
        let out_dir = out_dir.as_ref().to_path_buf();
        let task_id = task_id.to_string();
        let segment_ms = self.segment_ms;

        let chunks = tokio::task::spawn_blocking(move || {
            split_wav(&wav_path, &task_id, &out_dir, segment_ms)
        })
        .await
        .map_err(|e| MediaError::Io(std::io::Error::other(e)))??;

        info!("Split audio into {} chunks", chunks.len());
        Ok(chunks)
    }
}

/// Target path of the normalized WAV for an extracted audio file.
fn normalized_path(audio_path: &Path) -> PathBuf {
    let wav_path = audio_path.with_extension("wav");
    if wav_path != audio_path {
        return wav_path;
    }
    let stem = audio_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    audio_path.with_file_name(format!("{}.16k.wav", stem))
}

/// Blocking WAV split.
pub fn split_wav(
    wav_path: &Path,
    task_id: &str,
    out_dir: &Path,
    segment_ms: u64,
) -> MediaResult<Vec<ChunkFile>> {
    let mut chunks = Vec::new();

    let result = match WavReader::open(wav_path) {
        Ok(reader) => match reader.spec().sample_format {
            SampleFormat::Int => {
                copy_segments::<i32>(reader, task_id, out_dir, segment_ms, &mut chunks)
            }
            SampleFormat::Float => {
                copy_segments::<f32>(reader, task_id, out_dir, segment_ms, &mut chunks)
            }
        },
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        for chunk in &chunks {
            if let Err(rm) = std::fs::remove_file(&chunk.path) {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove partial chunk {}: {}", chunk.path.display(), rm);
                }
            }
        }
        return Err(e);
    }

    Ok(chunks)
}

fn copy_segments<S: hound::Sample>(
    mut reader: WavReader<std::io::BufReader<File>>,
    task_id: &str,
    out_dir: &Path,
    segment_ms: u64,
    chunks: &mut Vec<ChunkFile>,
) -> MediaResult<()> {
    let spec = reader.spec();
    let samples_per_chunk = samples_per_segment(&spec, segment_ms);

    let mut writer: Option<WavWriter<BufWriter<File>>> = None;
    let mut written = 0u64;

    for sample in reader.samples::<S>() {
        let sample = sample?;

        if writer.is_none() {
            let sequence = chunks.len() as u32 + 1;
            let name = ChunkName::new(task_id, sequence);
            let path = out_dir.join(name.file_name());
            chunks.push(ChunkFile {
                name,
                path: path.clone(),
            });
            writer = Some(WavWriter::create(&path, spec)?);
        }

        if let Some(w) = writer.as_mut() {
            w.write_sample(sample)?;
        }
        written += 1;

        if written == samples_per_chunk {
            if let Some(w) = writer.take() {
                w.finalize()?;
            }
            written = 0;
        }
    }

    if let Some(w) = writer.take() {
        w.finalize()?;
    }

    Ok(())
}

/// Interleaved samples in one chunk of `segment_ms`.
fn samples_per_segment(spec: &WavSpec, segment_ms: u64) -> u64 {
    let frames = (u64::from(spec.sample_rate) * segment_ms / 1000).max(1);
    frames * u64::from(spec.channels.max(1))
}
