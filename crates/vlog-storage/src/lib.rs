//! S3-compatible object storage for window clips.
//!
//! Backends that cannot read local files fetch clips through presigned URLs.

pub mod client;
pub mod error;

pub use client::{window_clip_key, ClipStore, ClipStoreConfig};
pub use error::{StorageError, StorageResult};
