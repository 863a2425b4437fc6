//! Shared data models for the sound extractor worker.
//!
//! This crate provides Serde-serializable types for:
//! - The clip task descriptor received from upstream
//! - Terminal clip statuses and the outbound status envelope
//! - Audio chunk naming and ordering
//! - The object storage key scheme

pub mod chunk;
pub mod clip;
pub mod envelope;
pub mod keys;

// Re-export common types
pub use chunk::{sort_chunk_names, ChunkName, ChunkNameError};
pub use clip::{Clip, ClipError, ClipPatch, ClipStatus, OriginalVideo};
pub use envelope::{StatusEnvelope, SOUND_EXTRACTOR_MESSAGE_TYPE};
