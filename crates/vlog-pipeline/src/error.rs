//! Pipeline error types.

use thiserror::Error;

use vlog_llm::LlmError;
use vlog_media::MediaError;
use vlog_models::{PlanningError, SessionId, WindowState};
use vlog_storage::StorageError;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that abort a session.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Session {session_id}: window planning failed: {source}")]
    Planning {
        session_id: SessionId,
        source: PlanningError,
    },

    #[error("Session {session_id}{}: media error: {source}", window_label(.window))]
    Media {
        session_id: SessionId,
        window: Option<usize>,
        source: MediaError,
    },

    #[error("Session {session_id}, window {window} ({state}): analysis failed: {source}")]
    Analysis {
        session_id: SessionId,
        window: usize,
        state: WindowState,
        source: LlmError,
    },

    #[error("Session {session_id}, window {window}: refinement failed: {source}")]
    Refinement {
        session_id: SessionId,
        window: usize,
        source: LlmError,
    },

    #[error("Session {session_id}, window {window}: clip publishing failed: {source}")]
    Publish {
        session_id: SessionId,
        window: usize,
        source: StorageError,
    },

    #[error("Session {session_id}{}: cancelled", window_label(.window))]
    Cancelled {
        session_id: SessionId,
        window: Option<usize>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn window_label(window: &Option<usize>) -> String {
    window.map(|w| format!(", window {}", w)).unwrap_or_default()
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn cancelled(session_id: &SessionId, window: Option<usize>) -> Self {
        Self::Cancelled {
            session_id: session_id.clone(),
            window,
        }
    }

    /// Wrap a media error, mapping FFmpeg cancellation onto `Cancelled`.
    pub fn media(session_id: &SessionId, window: Option<usize>, source: MediaError) -> Self {
        if source.is_cancelled() {
            return Self::cancelled(session_id, window);
        }
        Self::Media {
            session_id: session_id.clone(),
            window,
            source,
        }
    }

    pub fn analysis(
        session_id: &SessionId,
        window: usize,
        state: WindowState,
        source: LlmError,
    ) -> Self {
        Self::Analysis {
            session_id: session_id.clone(),
            window,
            state,
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Session the error belongs to, if any.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::Planning { session_id, .. }
            | Self::Media { session_id, .. }
            | Self::Analysis { session_id, .. }
            | Self::Refinement { session_id, .. }
            | Self::Publish { session_id, .. }
            | Self::Cancelled { session_id, .. } => Some(session_id),
            Self::Config(_) | Self::Io(_) => None,
        }
    }

    /// Index of the window that failed, for window-scoped errors.
    pub fn window(&self) -> Option<usize> {
        match self {
            Self::Media { window, .. } | Self::Cancelled { window, .. } => *window,
            Self::Analysis { window, .. }
            | Self::Refinement { window, .. }
            | Self::Publish { window, .. } => Some(*window),
            _ => None,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Planning { .. } => "planning",
            Self::Media { .. } => "media",
            Self::Analysis { .. } => "analysis",
            Self::Refinement { .. } => "refinement",
            Self::Publish { .. } => "publish",
            Self::Cancelled { .. } => "cancelled",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}
