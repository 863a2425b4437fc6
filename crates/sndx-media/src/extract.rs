//! Audio track and cover frame extraction.

use std::path::Path;

use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Pixel format of extracted cover frames.
pub const COVER_PIXEL_FORMAT: &str = "yuv420p";

/// Format seconds as `HH:MM:SS`, truncating any fraction.
///
/// Hours are not wrapped, so durations past a day keep counting up.
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Timestamp of the cover frame: the temporal midpoint of the video.
pub fn cover_timestamp(duration: f64) -> String {
    format_timestamp(duration / 2.0)
}

/// Pulls the audio track and a still frame out of a source video.
#[derive(Debug, Clone, Default)]
pub struct MediaExtractor {
    runner: FfmpegRunner,
}

impl MediaExtractor {
    pub fn new(runner: FfmpegRunner) -> Self {
        Self { runner }
    }

    /// Transcode the source's audio into a standalone file.
    ///
    /// The codec follows the output extension.
    pub async fn extract_audio(
        &self,
        source: impl AsRef<Path>,
        audio_path: impl AsRef<Path>,
    ) -> MediaResult<()> {
        let audio_path = audio_path.as_ref();
        let cmd = FfmpegCommand::new(source, audio_path).no_video();

        self.runner.run(&cmd).await?;
        info!("Audio extracted: {}", audio_path.display());
        Ok(())
    }

    /// Render the frame at the middle of the video as a still image.
    pub async fn extract_cover_frame(
        &self,
        source: impl AsRef<Path>,
        frame_path: impl AsRef<Path>,
        duration: f64,
    ) -> MediaResult<()> {
        let frame_path = frame_path.as_ref();
        let timestamp = cover_timestamp(duration);

        let cmd = build_cover_command(source.as_ref(), frame_path, &timestamp);
        self.runner.run(&cmd).await?;

        info!(timestamp = %timestamp, "Cover frame extracted: {}", frame_path.display());
        Ok(())
    }
}

fn build_cover_command(source: &Path, frame_path: &Path, timestamp: &str) -> FfmpegCommand {
    FfmpegCommand::new(source, frame_path)
        .seek_to(timestamp)
        .still_image(COVER_PIXEL_FORMAT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midpoint_timestamp() {
        assert_eq!(cover_timestamp(3661.0), "00:30:30");
        assert_eq!(cover_timestamp(660.0), "00:05:30");
        assert_eq!(cover_timestamp(1.0), "00:00:00");
    }

    #[test]
    fn test_format_timestamp_truncates_and_pads() {
        assert_eq!(format_timestamp(0.0), "00:00:00");
        assert_eq!(format_timestamp(59.999), "00:00:59");
        assert_eq!(format_timestamp(3600.0), "01:00:00");
        assert_eq!(format_timestamp(90061.2), "25:01:01");
    }

    #[test]
    fn test_format_timestamp_rejects_garbage() {
        assert_eq!(format_timestamp(-5.0), "00:00:00");
        assert_eq!(format_timestamp(f64::NAN), "00:00:00");
    }

    #[test]
    fn test_cover_command() {
        let cmd = build_cover_command(Path::new("in.mp4"), Path::new("abc.jpg"), "00:30:30");
        let args = cmd.build_args();

        assert!(args.windows(2).any(|w| w == ["-ss", "00:30:30"]));
        assert!(args.windows(2).any(|w| w == ["-vframes", "1"]));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "yuv420p"]));
        assert!(args.windows(2).any(|w| w == ["-f", "image2"]));
        assert!(args.windows(2).any(|w| w == ["-update", "1"]));
    }
}
