//! Task queue using Redis Streams.

use std::collections::HashMap;
use std::time::Duration;

use metrics::counter;
use redis::AsyncCommands;
use sndx_models::Clip;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};

/// Stream entry field holding the task JSON.
pub const TASK_FIELD: &str = "task";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream inbound clip tasks are read from
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Stream terminal status messages are written to
    pub status_stream_name: String,
    /// Max attempts before DLQ
    pub max_retries: u32,
    /// Idle time after which a pending task may be claimed by another worker
    pub claim_min_idle: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "sndx:tasks".to_string(),
            consumer_group: "sndx:workers".to_string(),
            dlq_stream_name: "sndx:dlq".to_string(),
            status_stream_name: "sndx:status".to_string(),
            max_retries: 3,
            claim_min_idle: Duration::from_secs(600), // 10 minutes
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("SNDX_TASK_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("SNDX_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("SNDX_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            status_stream_name: std::env::var("SNDX_STATUS_STREAM")
                .unwrap_or(defaults.status_stream_name),
            max_retries: std::env::var("SNDX_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            claim_min_idle: std::env::var("SNDX_CLAIM_MIN_IDLE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_min_idle),
        }
    }
}

/// A decoded task together with the stream entry that carried it.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub message_id: String,
    pub clip: Clip,
}

/// Decode the JSON payload of a stream entry into a clip.
pub fn decode_task_payload(payload: &[u8]) -> QueueResult<Clip> {
    let clip: Clip = serde_json::from_slice(payload)?;
    Ok(clip)
}

/// Task queue client.
pub struct TaskQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl TaskQueue {
    /// Create a new task queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // Create consumer group (ignore error if already exists)
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Consume new tasks from the queue.
    ///
    /// Entries whose payload cannot be decoded are acked and dropped; no
    /// status is reported for them because they carry no usable clip identity.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<QueuedTask>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let mut tasks = Vec::new();
        for stream_key in result.keys {
            for entry in stream_key.ids {
                if let Some(task) = self.decode_entry(entry.id, &entry.map).await {
                    tasks.push(task);
                }
            }
        }

        Ok(tasks)
    }

    /// Claim pending tasks that have been idle for too long.
    /// This handles tasks from crashed workers.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        count: usize,
    ) -> QueueResult<Vec<QueuedTask>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .query_async(&mut conn)
            .await?;

        if pending.count() == 0 {
            return Ok(Vec::new());
        }

        let result: redis::streams::StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(self.config.claim_min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut tasks = Vec::new();
        for entry in result.claimed {
            if let Some(task) = self.decode_entry(entry.id, &entry.map).await {
                info!("Claimed pending task {} from stream", task.clip.id);
                tasks.push(task);
            }
        }

        Ok(tasks)
    }

    async fn decode_entry(
        &self,
        message_id: String,
        fields: &HashMap<String, redis::Value>,
    ) -> Option<QueuedTask> {
        let decoded = match fields.get(TASK_FIELD) {
            Some(redis::Value::BulkString(payload)) => decode_task_payload(payload),
            Some(_) => Err(QueueError::malformed_task("task field is not a string")),
            None => Err(QueueError::malformed_task("entry has no task field")),
        };

        match decoded {
            Ok(clip) => {
                debug!("Consumed task {} from stream", clip.id);
                Some(QueuedTask { message_id, clip })
            }
            Err(e) => {
                warn!(message_id = %message_id, "Dropping malformed task: {}", e);
                counter!("sndx_tasks_malformed_total").increment(1);
                // Ack the malformed message to prevent reprocessing
                self.ack(&message_id).await.ok();
                None
            }
        }
    }

    /// Acknowledge a task (mark as completed).
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        // Retry bookkeeping is no longer needed
        conn.del::<_, ()>(retry_key(message_id)).await?;

        debug!("Acknowledged task: {}", message_id);
        Ok(())
    }

    /// Move a task to the dead letter queue.
    pub async fn dlq(&self, task: &QueuedTask, error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(&task.clip)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg(TASK_FIELD)
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&task.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(&task.message_id).await?;

        warn!("Moved task {} to DLQ: {}", task.clip.id, error);
        Ok(())
    }

    /// Increment the attempt count for a task.
    pub async fn increment_retry(&self, message_id: &str) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = retry_key(message_id);
        let count: u32 = conn.incr(&key, 1).await?;
        // Set TTL to 24 hours
        conn.expire::<_, ()>(&key, 86400).await?;
        Ok(count)
    }

    /// Get max retries from config.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}

fn retry_key(message_id: &str) -> String {
    format!("sndx:retry:{}", message_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_task_payload() {
        let payload = br#"{"id":"abc","userId":"u1","originalVideo":{"name":"clip.mp4"}}"#;
        let clip = decode_task_payload(payload).unwrap();
        assert_eq!(clip.id, "abc");
        assert_eq!(clip.source_key(), "u1/abc/clip.mp4");
    }

    #[test]
    fn test_decode_rejects_missing_identity() {
        let payload = br#"{"userId":"u1","originalVideo":{"name":"clip.mp4"}}"#;
        assert!(matches!(
            decode_task_payload(payload),
            Err(QueueError::Json(_))
        ));
        assert!(decode_task_payload(b"not json").is_err());
    }

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name, "sndx:tasks");
        assert_eq!(config.status_stream_name, "sndx:status");
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_retry_key() {
        assert_eq!(retry_key("1-0"), "sndx:retry:1-0");
    }
}
