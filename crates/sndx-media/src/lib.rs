//! FFmpeg CLI wrapper for the sound extractor.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a runner with timeouts
//! - FFprobe duration probing
//! - Audio track and cover frame extraction
//! - Audio normalization and fixed-length WAV chunking
//! - The [`MediaToolkit`] seam the worker pipeline drives

pub mod chunk;
pub mod command;
pub mod error;
pub mod extract;
pub mod probe;
pub mod toolkit;

pub use chunk::{AudioChunker, ChunkFile, DEFAULT_SEGMENT_MS, NORMALIZED_CHANNELS, NORMALIZED_SAMPLE_RATE};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use extract::{format_timestamp, MediaExtractor};
pub use probe::get_duration;
pub use toolkit::{FfmpegToolkit, MediaToolkit};
