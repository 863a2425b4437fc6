//! Object storage key scheme.
//!
//! Every artifact of a clip lives under `{userId}/{clipId}/`.

/// File name of a clip's cover frame.
pub fn cover_file_name(clip_id: &str) -> String {
    format!("{}.jpg", clip_id)
}

/// `{userId}/{clipId}/{originalVideoName}`
pub fn source_video_key(user_id: &str, clip_id: &str, video_name: &str) -> String {
    format!("{}/{}/{}", user_id, clip_id, video_name)
}

/// `{userId}/{clipId}/{clipId}.jpg`
pub fn cover_key(user_id: &str, clip_id: &str) -> String {
    format!("{}/{}/{}", user_id, clip_id, cover_file_name(clip_id))
}

/// `{userId}/{clipId}/audios/{chunkFileName}`
pub fn chunk_key(user_id: &str, clip_id: &str, chunk_file_name: &str) -> String {
    format!("{}/{}/audios/{}", user_id, clip_id, chunk_file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkName;

    #[test]
    fn test_key_scheme() {
        assert_eq!(source_video_key("u1", "abc", "clip.mp4"), "u1/abc/clip.mp4");
        assert_eq!(cover_key("u1", "abc"), "u1/abc/abc.jpg");
        assert_eq!(
            chunk_key("u1", "abc", &ChunkName::new("abc", 2).file_name()),
            "u1/abc/audios/abc_2.wav"
        );
    }
}
