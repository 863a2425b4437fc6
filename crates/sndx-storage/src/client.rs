//! S3 client implementation.

use std::path::Path;
use std::time::Instant;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use metrics::histogram;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};

/// Configuration for the S3 client.
#[derive(Clone)]
pub struct S3Config {
    /// Custom endpoint for S3-compatible services (MinIO, R2, ...)
    pub endpoint_url: Option<String>,
    /// Access key ID; the default AWS credential chain is used when unset
    pub access_key_id: Option<String>,
    /// Secret access key
    pub secret_access_key: Option<String>,
    /// Bucket name
    pub bucket_name: String,
    /// Region
    pub region: String,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`
    pub force_path_style: bool,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let endpoint_url = std::env::var("S3_ENDPOINT_URL").ok().filter(|s| !s.is_empty());
        let force_path_style = std::env::var("S3_FORCE_PATH_STYLE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(endpoint_url.is_some());

        Ok(Self {
            access_key_id: std::env::var("S3_ACCESS_KEY_ID").ok(),
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY").ok(),
            bucket_name: std::env::var("S3_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("S3_BUCKET_NAME not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint_url,
            force_path_style,
        })
    }
}

/// S3-compatible storage client.
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    /// Create a new client from configuration.
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let mut builder = match (&config.access_key_id, &config.secret_access_key) {
            (Some(key), Some(secret)) => Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(Credentials::new(key, secret, None, None, "env")),
            (Some(_), None) | (None, Some(_)) => {
                return Err(StorageError::config_error(
                    "S3_ACCESS_KEY_ID and S3_SECRET_ACCESS_KEY must be set together",
                ));
            }
            (None, None) => {
                let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
                Builder::from(&shared)
            }
        };

        builder = builder
            .region(Region::new(config.region))
            .force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket_name,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = S3Config::from_env()?;
        Self::new(config).await
    }

    /// Upload a file.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to {}", path.display(), key);
        let started = Instant::now();

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", key, e)))?;

        histogram!("sndx_upload_duration_seconds").record(started.elapsed().as_secs_f64());
        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    /// Download an object to a file, streaming the body to disk.
    pub async fn download_file(&self, key: &str, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Downloading {} to {}", key, path.display());
        let started = Instant::now();

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(key)
                } else {
                    StorageError::download_failed(format!("{}: {}", key, e))
                }
            })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::download_failed(format!("Failed to create directory: {}", e))
            })?;
        }

        let mut file = tokio::fs::File::create(path).await.map_err(|e| {
            StorageError::download_failed(format!("Failed to create file: {}", e))
        })?;
        let mut body = response.body.into_async_read();

        if let Err(e) = tokio::io::copy(&mut body, &mut file).await {
            drop(file);
            if let Err(rm) = tokio::fs::remove_file(path).await {
                warn!("Failed to remove partial download {}: {}", path.display(), rm);
            }
            return Err(StorageError::download_failed(format!(
                "Failed to write {}: {}",
                path.display(),
                e
            )));
        }

        histogram!("sndx_download_duration_seconds").record(started.elapsed().as_secs_f64());
        info!("Downloaded {} to {}", key, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_secret() {
        let config = S3Config {
            endpoint_url: Some("http://localhost:9000".into()),
            access_key_id: Some("AKIA".into()),
            secret_access_key: Some("super-secret".into()),
            bucket_name: "clips".into(),
            region: "us-east-1".into(),
            force_path_style: true,
        };

        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("clips"));
    }

    #[tokio::test]
    async fn test_half_configured_credentials_rejected() {
        let config = S3Config {
            endpoint_url: None,
            access_key_id: Some("AKIA".into()),
            secret_access_key: None,
            bucket_name: "clips".into(),
            region: "us-east-1".into(),
            force_path_style: false,
        };

        assert!(matches!(
            S3Client::new(config).await,
            Err(StorageError::ConfigError(_))
        ));
    }
}
