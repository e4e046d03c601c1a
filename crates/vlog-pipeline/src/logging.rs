//! Structured session logging.
//!
//! Every line carries the session ID, and window-scoped lines also carry the
//! window index and its state, so one session can be followed through
//! interleaved worker logs.

use tracing::{error, info, warn, Span};

use vlog_models::{SessionId, Window, WindowState};

/// Session logger for structured logging with consistent fields.
#[derive(Debug, Clone)]
pub struct SessionLogger {
    session_id: String,
    operation: String,
}

impl SessionLogger {
    /// Create a logger for a session and operation (e.g. "sliding_window").
    pub fn new(session_id: &SessionId, operation: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            operation = %self.operation,
            "Session started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            operation = %self.operation,
            "Session progress: {}", message
        );
    }

    /// Log a window entering `state`.
    pub fn log_window(&self, window: &Window, state: WindowState) {
        info!(
            session_id = %self.session_id,
            window = window.index,
            state = %state,
            start = window.start,
            end = window.end,
            "Window {} -> {}", window.index, state
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            session_id = %self.session_id,
            operation = %self.operation,
            "Session warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            session_id = %self.session_id,
            operation = %self.operation,
            "Session error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            session_id = %self.session_id,
            operation = %self.operation,
            "Session completed: {}", message
        );
    }

    /// Span wrapping the whole session.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "session",
            session_id = %self.session_id,
            operation = %self.operation
        )
    }
}
