//! Handing window clips to the analysis backend.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, warn};

use vlog_llm::{mime_type_for, MediaRef};
use vlog_models::{SessionId, Window};
use vlog_storage::{window_clip_key, ClipStore, StorageResult};

/// A clip made reachable for the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedClip {
    /// What the backend is given
    pub media: MediaRef,
    /// Object key when the clip was uploaded
    pub key: Option<String>,
}

/// Makes clips reachable by the backend and cleans them up afterwards.
#[async_trait]
pub trait MediaPublisher: Send + Sync {
    async fn publish(
        &self,
        session_id: &SessionId,
        window: &Window,
        clip: &Path,
    ) -> StorageResult<PublishedClip>;

    /// Called once the window is done with its clip.
    async fn retract(&self, published: &PublishedClip) -> StorageResult<()>;
}

/// Passes clips to the backend as local files.
#[derive(Debug, Clone, Default)]
pub struct LocalPublisher;

#[async_trait]
impl MediaPublisher for LocalPublisher {
    async fn publish(
        &self,
        _session_id: &SessionId,
        _window: &Window,
        clip: &Path,
    ) -> StorageResult<PublishedClip> {
        Ok(PublishedClip {
            media: MediaRef::File(clip.to_path_buf()),
            key: None,
        })
    }

    async fn retract(&self, _published: &PublishedClip) -> StorageResult<()> {
        Ok(())
    }
}

/// Uploads clips to an S3-compatible bucket and hands out presigned URLs.
#[derive(Clone)]
pub struct ObjectStorePublisher {
    store: ClipStore,
    keep_clips: bool,
}

impl ObjectStorePublisher {
    pub fn new(store: ClipStore, keep_clips: bool) -> Self {
        Self { store, keep_clips }
    }
}

#[async_trait]
impl MediaPublisher for ObjectStorePublisher {
    async fn publish(
        &self,
        session_id: &SessionId,
        window: &Window,
        clip: &Path,
    ) -> StorageResult<PublishedClip> {
        let extension = clip
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let key = window_clip_key(session_id, window, extension);

        self.store
            .upload_file(clip, &key, mime_type_for(clip))
            .await?;
        let url = self.store.presign_get(&key).await?;
        debug!(bucket = %self.store.bucket(), key = %key, "Published window clip");

        Ok(PublishedClip {
            media: MediaRef::Url(url),
            key: Some(key),
        })
    }

    async fn retract(&self, published: &PublishedClip) -> StorageResult<()> {
        if self.keep_clips {
            return Ok(());
        }
        if let Some(key) = &published.key {
            if let Err(e) = self.store.delete_object(key).await {
                warn!(key = %key, "Failed to delete published clip: {}", e);
            }
        }
        Ok(())
    }
}
