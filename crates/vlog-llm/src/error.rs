//! Backend error types.

use thiserror::Error;

pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, Error)]
pub enum LlmError {
    /// A streamed chunk violated the backend's declared shape.
    #[error("Stream shape violation: {0}")]
    StreamShape(String),

    #[error("{provider} returned an error{}: {message}", format_status(.status))]
    Backend {
        provider: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl LlmError {
    pub fn stream_shape(message: impl Into<String>) -> Self {
        Self::StreamShape(message.into())
    }

    pub fn backend(provider: &'static str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Backend {
            provider,
            status,
            message: message.into(),
        }
    }

    pub fn invalid_response(provider: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Transient failures worth another attempt: transport errors, rate
    /// limiting and server-side errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            LlmError::Backend {
                status: Some(status),
                ..
            } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}
