//! Audio chunk naming and ordering.
//!
//! Chunks are named `{taskId}_{n}.wav` with `n` starting at 1. The numeric
//! suffix is the authoritative time order.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static CHUNK_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)_(\d+)\.wav$").expect("valid chunk name pattern"));

/// Error parsing a chunk file name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Not a chunk file name: {0}")]
pub struct ChunkNameError(pub String);

/// Name of one audio chunk of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkName {
    task_id: String,
    sequence: u32,
}

impl ChunkName {
    /// Create the name of chunk `sequence` (1-based) of a task.
    pub fn new(task_id: impl Into<String>, sequence: u32) -> Self {
        debug_assert!(sequence >= 1, "chunk sequence starts at 1");
        Self {
            task_id: task_id.into(),
            sequence,
        }
    }

    /// Parse a file name such as `abc_12.wav`.
    pub fn parse(name: &str) -> Result<Self, ChunkNameError> {
        let caps = CHUNK_NAME
            .captures(name)
            .ok_or_else(|| ChunkNameError(name.to_string()))?;
        let sequence = caps[2]
            .parse::<u32>()
            .map_err(|_| ChunkNameError(name.to_string()))?;
        if sequence == 0 {
            return Err(ChunkNameError(name.to_string()));
        }
        Ok(Self {
            task_id: caps[1].to_string(),
            sequence,
        })
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}.wav", self.task_id, self.sequence)
    }
}

impl fmt::Display for ChunkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}.wav", self.task_id, self.sequence)
    }
}

/// Sequence number of a chunk file name, if it is one.
pub fn chunk_sequence(name: &str) -> Option<u32> {
    ChunkName::parse(name).ok().map(|c| c.sequence)
}

/// Sort chunk file names into time order.
///
/// Names without a numeric suffix go last, keeping their relative order.
pub fn sort_chunk_names(names: &mut [String]) {
    names.sort_by_key(|name| chunk_sequence(name).map_or(u64::MAX, u64::from));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name() {
        assert_eq!(ChunkName::new("abc", 1).file_name(), "abc_1.wav");
        assert_eq!(ChunkName::new("abc", 12).to_string(), "abc_12.wav");
    }

    #[test]
    fn test_parse_uses_last_underscore() {
        let chunk = ChunkName::parse("my_clip_7.wav").unwrap();
        assert_eq!(chunk.task_id(), "my_clip");
        assert_eq!(chunk.sequence(), 7);

        assert!(ChunkName::parse("abc.wav").is_err());
        assert!(ChunkName::parse("abc_1.mp3").is_err());
        assert!(ChunkName::parse("abc_0.wav").is_err());
    }

    #[test]
    fn test_sort_is_numeric_not_lexicographic() {
        let mut names: Vec<String> = ["abc_10.wav", "abc_2.wav", "abc_1.wav", "abc_11.wav"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        sort_chunk_names(&mut names);
        assert_eq!(names, vec!["abc_1.wav", "abc_2.wav", "abc_10.wav", "abc_11.wav"]);
    }

    #[test]
    fn test_sort_restores_emission_order() {
        let emitted: Vec<String> = (1..=25).map(|n| ChunkName::new("t", n).file_name()).collect();

        // 7 is coprime with 25, so this visits every index once in scrambled order
        let mut completed: Vec<String> = (0..25).map(|i| emitted[(i * 7) % 25].clone()).collect();
        assert_ne!(completed, emitted);

        sort_chunk_names(&mut completed);
        assert_eq!(completed, emitted);
    }

    #[test]
    fn test_unnumbered_names_sort_last() {
        let mut names = vec!["odd.wav".to_string(), "abc_2.wav".into(), "abc_1.wav".into()];
        sort_chunk_names(&mut names);
        assert_eq!(names, vec!["abc_1.wav", "abc_2.wav", "odd.wav"]);
    }
}
