//! Media references and raw stream chunks.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::LlmResult;

/// Where a backend can find the clip it should analyze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "location", rename_all = "snake_case")]
pub enum MediaRef {
    /// Fetchable by the backend itself (presigned URL, gs:// URI)
    Url(String),
    /// Local file, sent inline
    File(PathBuf),
}

impl MediaRef {
    /// MIME type guessed from the file extension.
    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaRef::Url(url) => {
                // Presigned URLs carry a query string after the extension.
                let path = url.split(['?', '#']).next().unwrap_or(url);
                mime_type_for(Path::new(path))
            }
            MediaRef::File(path) => mime_type_for(path),
        }
    }

    /// Read a local file and base64 encode it.
    pub(crate) async fn read_base64(path: &Path) -> LlmResult<String> {
        let bytes = tokio::fs::read(path).await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaRef::Url(url) => write!(f, "{}", url),
            MediaRef::File(path) => write!(f, "file://{}", path.display()),
        }
    }
}

/// Video MIME type for a path, defaulting to MP4.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        _ => "video/mp4",
    }
}

/// How a backend streams its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamShape {
    /// Each update carries only the newly generated text
    Incremental,
    /// Each update resends everything generated so far
    Cumulative,
}

impl fmt::Display for StreamShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamShape::Incremental => write!(f, "incremental"),
            StreamShape::Cumulative => write!(f, "cumulative"),
        }
    }
}

/// One update as produced by a backend, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawChunk {
    /// New text only
    Delta(String),
    /// The whole output so far, in the backend's content encoding
    Snapshot(serde_json::Value),
}

impl RawChunk {
    pub fn kind(&self) -> &'static str {
        match self {
            RawChunk::Delta(_) => "delta",
            RawChunk::Snapshot(_) => "snapshot",
        }
    }
}
