//! Clip task descriptor models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::chunk::sort_chunk_names;
use crate::keys;

/// Status values this worker writes back onto a clip.
///
/// Upstream services attach their own statuses; those are carried through
/// untouched as [`ClipStatus::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ClipStatus {
    /// Audio, chunks and cover were published
    SoundExtractorComplete,
    /// Any stage of the extraction failed
    SoundExtractorError,
    /// Status set by another stage of the pipeline
    Other(String),
}

impl ClipStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ClipStatus::SoundExtractorComplete => "SOUND_EXTRACTOR_COMPLETE",
            ClipStatus::SoundExtractorError => "SOUND_EXTRACTOR_ERROR",
            ClipStatus::Other(s) => s,
        }
    }

    /// Check if this status is one of the two terminal values of this worker.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClipStatus::SoundExtractorComplete | ClipStatus::SoundExtractorError
        )
    }
}

impl From<String> for ClipStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "SOUND_EXTRACTOR_COMPLETE" => ClipStatus::SoundExtractorComplete,
            "SOUND_EXTRACTOR_ERROR" => ClipStatus::SoundExtractorError,
            _ => ClipStatus::Other(s),
        }
    }
}

impl From<ClipStatus> for String {
    fn from(status: ClipStatus) -> Self {
        match status {
            ClipStatus::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for ClipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The uploaded source video of a clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalVideo {
    /// Source file name, also the last segment of its storage key
    pub name: String,
    /// Duration in whole seconds, set on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    /// Chunk file names in time order, set on success
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audios: Vec<String>,
    /// Fields owned by other services
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OriginalVideo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            length: None,
            audios: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// A clip task as delivered by the task queue.
///
/// Decoded once per task and never mutated; the outbound copy is produced by
/// [`Clip::completed`] or [`Clip::failed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: String,
    pub user_id: String,
    pub original_video: OriginalVideo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ClipStatus>,
    /// Fields owned by other services
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reasons a decoded clip cannot be processed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClipError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Field {field} is not a plain file name: {value}")]
    UnsafeName { field: &'static str, value: String },
}

/// Results of a successful extraction, applied to a clip in one step.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipPatch {
    pub cover: String,
    pub length: u64,
    pub audios: Vec<String>,
}

impl ClipPatch {
    /// Build a patch from the probed duration and the published chunk names.
    ///
    /// The duration is truncated to whole seconds and the chunk names are
    /// ordered by their numeric suffix.
    pub fn new(clip_id: &str, duration_secs: f64, mut audios: Vec<String>) -> Self {
        sort_chunk_names(&mut audios);
        Self {
            cover: keys::cover_file_name(clip_id),
            length: duration_secs.max(0.0).trunc() as u64,
            audios,
        }
    }
}

impl Clip {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        original_video_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            original_video: OriginalVideo::new(original_video_name),
            cover: None,
            status: None,
            extra: Map::new(),
        }
    }

    /// Check that the identifiers are present and safe to use as file names.
    pub fn validate(&self) -> Result<(), ClipError> {
        check_file_name("id", &self.id)?;
        if self.user_id.is_empty() {
            return Err(ClipError::MissingField("userId"));
        }
        check_file_name("originalVideo.name", &self.original_video.name)
    }

    /// Storage key of the uploaded source video.
    pub fn source_key(&self) -> String {
        keys::source_video_key(&self.user_id, &self.id, &self.original_video.name)
    }

    /// Storage key of the cover frame.
    pub fn cover_key(&self) -> String {
        keys::cover_key(&self.user_id, &self.id)
    }

    /// Copy of this clip carrying the extraction results and the complete status.
    pub fn completed(&self, patch: ClipPatch) -> Clip {
        let mut clip = self.clone();
        clip.cover = Some(patch.cover);
        clip.original_video.length = Some(patch.length);
        clip.original_video.audios = patch.audios;
        clip.status = Some(ClipStatus::SoundExtractorComplete);
        clip
    }

    /// Copy of this clip with the error status and nothing else changed.
    pub fn failed(&self) -> Clip {
        let mut clip = self.clone();
        clip.status = Some(ClipStatus::SoundExtractorError);
        clip
    }
}

fn check_file_name(field: &'static str, value: &str) -> Result<(), ClipError> {
    if value.is_empty() {
        return Err(ClipError::MissingField(field));
    }
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(ClipError::UnsafeName {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_inbound_clip() {
        let clip: Clip = serde_json::from_value(json!({
            "id": "abc",
            "userId": "u1",
            "originalVideo": { "name": "clip.mp4" },
            "status": "UPLOADED",
            "title": "Holiday"
        }))
        .unwrap();

        assert_eq!(clip.id, "abc");
        assert_eq!(clip.user_id, "u1");
        assert_eq!(clip.original_video.name, "clip.mp4");
        assert_eq!(clip.status, Some(ClipStatus::Other("UPLOADED".into())));
        assert_eq!(clip.extra.get("title"), Some(&json!("Holiday")));
        assert!(clip.validate().is_ok());
    }

    #[test]
    fn test_completed_sets_success_fields() {
        let clip = Clip::new("abc", "u1", "clip.mp4");
        let patch = ClipPatch::new(
            "abc",
            660.9,
            vec!["abc_3.wav".into(), "abc_1.wav".into(), "abc_2.wav".into()],
        );

        let done = clip.completed(patch);
        assert_eq!(done.cover.as_deref(), Some("abc.jpg"));
        assert_eq!(done.original_video.length, Some(660));
        assert_eq!(
            done.original_video.audios,
            vec!["abc_1.wav", "abc_2.wav", "abc_3.wav"]
        );
        assert_eq!(done.status, Some(ClipStatus::SoundExtractorComplete));
        // Inbound clip is left as it was
        assert!(clip.status.is_none());
    }

    #[test]
    fn test_failed_only_sets_status() {
        let clip = Clip::new("abc", "u1", "clip.mp4");
        let failed = clip.failed();

        assert_eq!(failed.status, Some(ClipStatus::SoundExtractorError));
        assert!(failed.cover.is_none());
        assert!(failed.original_video.length.is_none());
        assert!(failed.original_video.audios.is_empty());
    }

    #[test]
    fn test_status_wire_values() {
        let json = serde_json::to_value(ClipStatus::SoundExtractorError).unwrap();
        assert_eq!(json, json!("SOUND_EXTRACTOR_ERROR"));

        let parsed: ClipStatus = serde_json::from_value(json!("SOUND_EXTRACTOR_COMPLETE")).unwrap();
        assert!(parsed.is_terminal());
    }

    #[test]
    fn test_validate_rejects_path_segments() {
        let clip = Clip::new("abc", "u1", "../etc/passwd");
        assert!(matches!(
            clip.validate(),
            Err(ClipError::UnsafeName { field: "originalVideo.name", .. })
        ));

        let clip = Clip::new("", "u1", "clip.mp4");
        assert_eq!(clip.validate(), Err(ClipError::MissingField("id")));

        let clip = Clip::new("abc", "", "clip.mp4");
        assert_eq!(clip.validate(), Err(ClipError::MissingField("userId")));
    }
}
