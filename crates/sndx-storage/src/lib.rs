//! S3-compatible object storage client.
//!
//! This crate provides:
//! - File upload/download against an S3-compatible bucket
//! - The [`ObjectStore`] seam used by the worker pipeline

pub mod client;
pub mod error;
pub mod store;

pub use client::{S3Client, S3Config};
pub use error::{StorageError, StorageResult};
pub use store::{content_type_for, ObjectStore};
