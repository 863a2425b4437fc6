//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use metrics::histogram;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Longest stderr excerpt kept on a failure.
const STDERR_TAIL_BYTES: usize = 2048;

/// One ffmpeg invocation.
///
/// Always overwrites the output and only logs errors:
/// `ffmpeg -y -v error [-ss T] -i INPUT [ARGS..] OUTPUT`.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    seek: Option<String>,
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            seek: None,
            output_args: Vec::new(),
        }
    }

    /// Seek to an `HH:MM:SS` position before decoding the input.
    pub fn seek_to(mut self, timestamp: impl Into<String>) -> Self {
        self.seek = Some(timestamp.into());
        self
    }

    fn option(mut self, name: &str, value: impl Into<String>) -> Self {
        self.output_args.push(name.to_string());
        self.output_args.push(value.into());
        self
    }

    /// Drop the video streams.
    pub fn no_video(mut self) -> Self {
        self.output_args.push("-vn".to_string());
        self
    }

    /// Re-encode audio as PCM with the given layout.
    pub fn pcm_audio(self, channels: u16, sample_rate: u32) -> Self {
        self.option("-ac", channels.to_string())
            .option("-ar", sample_rate.to_string())
            .option("-c:a", "pcm_s16le")
    }

    /// Write exactly one frame as a still image.
    pub fn still_image(self, pixel_format: &str) -> Self {
        self.option("-vframes", "1")
            .option("-pix_fmt", pixel_format)
            .option("-f", "image2")
            .option("-update", "1")
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec!["-y".into(), "-v".into(), "error".into()];
        if let Some(seek) = &self.seek {
            args.push("-ss".into());
            args.push(seek.clone());
        }
        args.push("-i".into());
        args.push(self.input.to_string_lossy().into_owned());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// Runner for FFmpeg commands with an optional timeout.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self { timeout_secs: None }
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command and check that its output file exists.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let started = Instant::now();
        let output = match self.timeout_secs {
            Some(secs) => {
                match tokio::time::timeout(Duration::from_secs(secs), child.wait_with_output())
                    .await
                {
                    Ok(result) => result?,
                    Err(_) => {
                        // Dropping the wait future kills the process
                        warn!("FFmpeg timed out after {} seconds, killing process", secs);
                        return Err(MediaError::Timeout(secs));
                    }
                }
            }
            None => child.wait_with_output().await?,
        };
        histogram!("sndx_ffmpeg_duration_seconds").record(started.elapsed().as_secs_f64());

        if !output.status.success() {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(stderr_tail(&output.stderr)),
                output.status.code(),
            ));
        }

        if !tokio::fs::try_exists(cmd.output_path()).await.unwrap_or(false) {
            return Err(MediaError::OutputMissing(cmd.output_path().to_path_buf()));
        }

        Ok(())
    }
}

/// Last part of a process's stderr, lossily decoded.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_precedes_input() {
        let args = FfmpegCommand::new("input.mp4", "frame.jpg")
            .seek_to("00:30:30")
            .still_image("yuv420p")
            .build_args();

        assert_eq!(
            args,
            [
                "-y", "-v", "error", "-ss", "00:30:30", "-i", "input.mp4", "-vframes", "1",
                "-pix_fmt", "yuv420p", "-f", "image2", "-update", "1", "frame.jpg",
            ]
        );
    }

    #[test]
    fn test_pcm_audio_args() {
        let args = FfmpegCommand::new("a.mp3", "a.wav")
            .pcm_audio(1, 16000)
            .build_args();

        assert_eq!(
            &args[3..],
            ["-i", "a.mp3", "-ac", "1", "-ar", "16000", "-c:a", "pcm_s16le", "a.wav"]
        );
    }

    #[test]
    fn test_no_video() {
        let args = FfmpegCommand::new("clip.mp4", "abc.mp3").no_video().build_args();
        assert_eq!(&args[3..], ["-i", "clip.mp4", "-vn", "abc.mp3"]);
    }

    #[test]
    fn test_stderr_tail_truncates() {
        let long = vec![b'x'; STDERR_TAIL_BYTES * 2];
        assert_eq!(stderr_tail(&long).len(), STDERR_TAIL_BYTES);
        assert_eq!(stderr_tail(b"  boom \n"), "boom");
    }
}
