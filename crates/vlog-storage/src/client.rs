//! S3-compatible clip store.

use std::path::Path;
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use vlog_models::{SessionId, Window};

use crate::error::{StorageError, StorageResult};

/// Configuration for the clip store.
#[derive(Clone)]
pub struct ClipStoreConfig {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region ("auto" for R2-style endpoints)
    pub region: String,
    /// Lifetime of presigned clip URLs
    pub url_ttl: Duration,
}

impl std::fmt::Debug for ClipStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipStoreConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .field("url_ttl", &self.url_ttl)
            .finish_non_exhaustive()
    }
}

impl ClipStoreConfig {
    /// Create config from environment variables.
    ///
    /// Returns `Ok(None)` when `CLIP_STORE_BUCKET` is unset, i.e. clips are
    /// not published to object storage.
    pub fn from_env() -> StorageResult<Option<Self>> {
        let Ok(bucket_name) = std::env::var("CLIP_STORE_BUCKET") else {
            return Ok(None);
        };

        let required = |name: &str| {
            std::env::var(name).map_err(|_| StorageError::config_error(format!("{} not set", name)))
        };

        Ok(Some(Self {
            endpoint_url: required("CLIP_STORE_ENDPOINT_URL")?,
            access_key_id: required("CLIP_STORE_ACCESS_KEY_ID")?,
            secret_access_key: required("CLIP_STORE_SECRET_ACCESS_KEY")?,
            bucket_name,
            region: std::env::var("CLIP_STORE_REGION").unwrap_or_else(|_| "auto".to_string()),
            url_ttl: Duration::from_secs(
                std::env::var("CLIP_STORE_URL_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
        }))
    }
}

/// Object key for a window clip:
/// `sessions/{session}/windows/w{index}_{start}-{end}s.{ext}`.
pub fn window_clip_key(session_id: &SessionId, window: &Window, extension: &str) -> String {
    format!(
        "sessions/{}/windows/w{}_{:.1}-{:.1}s.{}",
        session_id, window.index, window.start, window.end, extension
    )
}

/// Object storage client for window clips.
#[derive(Clone)]
pub struct ClipStore {
    client: Client,
    bucket: String,
    url_ttl: Duration,
}

impl ClipStore {
    /// Create a new store client from configuration.
    pub fn new(config: ClipStoreConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "clip-store",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            url_ttl: config.url_ttl,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload a local file under `key`.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    /// Presigned GET URL valid for the configured TTL.
    pub async fn presign_get(&self, key: &str) -> StorageResult<String> {
        let presign_config = PresigningConfig::expires_in(self.url_ttl)
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presign_config)
            .await
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        Ok(presigned.uri().to_string())
    }

    /// Delete an object.
    pub async fn delete_object(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        debug!("Deleted {}", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_clip_key() {
        let session = SessionId::from_string("s-42");
        let window = Window {
            index: 2,
            start: 20.0,
            end: 32.04,
        };
        assert_eq!(
            window_clip_key(&session, &window, "mp4"),
            "sessions/s-42/windows/w2_20.0-32.0s.mp4"
        );
    }

    #[test]
    fn test_config_debug_hides_secrets() {
        let config = ClipStoreConfig {
            endpoint_url: "http://localhost:9000".to_string(),
            access_key_id: "AKIA-visible-nowhere".to_string(),
            secret_access_key: "top-secret".to_string(),
            bucket_name: "clips".to_string(),
            region: "auto".to_string(),
            url_ttl: Duration::from_secs(60),
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("clips"));
        assert!(!debug.contains("top-secret"));
        assert!(!debug.contains("AKIA"));
    }

    #[tokio::test]
    async fn test_presign_is_local() {
        let store = ClipStore::new(ClipStoreConfig {
            endpoint_url: "http://127.0.0.1:9000".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            bucket_name: "clips".to_string(),
            region: "auto".to_string(),
            url_ttl: Duration::from_secs(600),
        });
        let url = store.presign_get("sessions/a/windows/w0_0.0-15.0s.mp4").await.unwrap();
        assert!(url.starts_with("http://127.0.0.1:9000/clips/sessions/a/windows/w0_0.0-15.0s.mp4?"));
        assert!(url.contains("X-Amz-Expires=600"));
    }
}
