//! Terminal status emission.

use async_trait::async_trait;
use sndx_models::StatusEnvelope;
use tracing::{debug, info};

use crate::error::{QueueError, QueueResult};

/// Outbound channel for terminal status messages.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Send one status envelope tagged with `message_type`.
    async fn send_message(&self, envelope: &StatusEnvelope, message_type: &str)
        -> QueueResult<()>;
}

/// Publishes status envelopes onto a Redis stream.
///
/// Each entry carries a `type` field with the message type tag and a
/// `payload` field with the envelope JSON.
pub struct RedisStatusPublisher {
    client: redis::Client,
    stream_name: String,
}

impl RedisStatusPublisher {
    pub fn new(redis_url: &str, stream_name: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            stream_name: stream_name.into(),
        })
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }
}

#[async_trait]
impl StatusSink for RedisStatusPublisher {
    async fn send_message(
        &self,
        envelope: &StatusEnvelope,
        message_type: &str,
    ) -> QueueResult<()> {
        let payload = envelope.to_json()?;
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;

        debug!("Publishing {} to {}", message_type, self.stream_name);
        let entry_id: String = redis::cmd("XADD")
            .arg(&self.stream_name)
            .arg("*")
            .arg("type")
            .arg(message_type)
            .arg("payload")
            .arg(&payload)
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::publish_failed(e.to_string()))?;

        info!(
            clip_id = %envelope.clip.id,
            status = ?envelope.status().map(|s| s.as_str()),
            "Published status entry {}", entry_id
        );
        Ok(())
    }
}
