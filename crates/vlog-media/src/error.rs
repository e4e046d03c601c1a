//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while probing or cutting media.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("{tool} failed: {message}{}", format_stderr(.stderr))]
    ToolFailed {
        tool: &'static str,
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Could not read a duration for {path}: {output:?}")]
    InvalidDuration { path: PathBuf, output: String },

    #[error("Invalid segment [{start:.3}, {end:.3}] for a {duration:.3}s video")]
    InvalidRange { start: f64, end: f64, duration: f64 },

    #[error("Nothing to concatenate")]
    EmptyConcat,

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_stderr(stderr: &Option<String>) -> String {
    match stderr {
        Some(tail) if !tail.is_empty() => format!(" ({})", tail),
        _ => String::new(),
    }
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::ToolFailed {
            tool: "ffmpeg",
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an FFprobe failure error.
    pub fn ffprobe_failed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ToolFailed {
            tool: "ffprobe",
            message: message.into(),
            stderr,
            exit_code: None,
        }
    }

    /// Create an invalid range error.
    pub fn invalid_range(start: f64, end: f64, duration: f64) -> Self {
        Self::InvalidRange {
            start,
            end,
            duration,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
