//! Redis Streams task queue and status publisher.
//!
//! This crate provides:
//! - Clip task consumption via a Redis Streams consumer group
//! - Ack, retry counting, pending-claim and dead-letter handling
//! - Terminal status emission through the [`StatusSink`] seam

pub mod error;
pub mod queue;
pub mod status;

pub use error::{QueueError, QueueResult};
pub use queue::{decode_task_payload, QueueConfig, QueuedTask, TaskQueue};
pub use status::{RedisStatusPublisher, StatusSink};
