//! Outbound status envelope.

use serde::{Deserialize, Serialize};

use crate::clip::{Clip, ClipPatch, ClipStatus};

/// Type tag consumers use to route the status message.
pub const SOUND_EXTRACTOR_MESSAGE_TYPE: &str = "App\\Protobuf\\SoundExtractorMessage";

/// Terminal status message wrapping the clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEnvelope {
    pub clip: Clip,
}

impl StatusEnvelope {
    /// Envelope reporting a completed extraction.
    pub fn completed(clip: &Clip, patch: ClipPatch) -> Self {
        Self {
            clip: clip.completed(patch),
        }
    }

    /// Envelope reporting a failed extraction.
    pub fn failed(clip: &Clip) -> Self {
        Self { clip: clip.failed() }
    }

    pub fn status(&self) -> Option<&ClipStatus> {
        self.clip.status.as_ref()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
