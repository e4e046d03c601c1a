//! Backend trait shared by all providers.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{LlmError, LlmResult};
use crate::normalize::normalize;
use crate::retry::{retry_async, RetryConfig};
use crate::types::{MediaRef, RawChunk, StreamShape};

/// Raw chunks as produced by a backend.
pub type RawChunkStream = BoxStream<'static, LlmResult<RawChunk>>;

/// Normalized text deltas.
pub type TextStream = BoxStream<'static, LlmResult<String>>;

/// A multimodal model provider.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Provider name used in logs and errors (e.g. "gemini", "qwen").
    fn name(&self) -> &'static str;

    /// How this provider streams, fixed per provider.
    fn shape(&self) -> StreamShape;

    /// Start a streaming analysis of `media` with `prompt`.
    ///
    /// Dropping the returned stream aborts the request.
    async fn stream_analysis(&self, prompt: &str, media: &MediaRef) -> LlmResult<RawChunkStream>;

    /// Single-shot text completion.
    async fn complete(&self, prompt: &str) -> LlmResult<String>;
}

/// Pass successful responses through; turn anything else into
/// [`LlmError::Backend`] carrying the provider's error message.
pub(crate) async fn ensure_success(
    provider: &'static str,
    response: reqwest::Response,
) -> LlmResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(LlmError::backend(
        provider,
        Some(status.as_u16()),
        error_message(&body),
    ))
}

/// Best-effort extraction of a human-readable message from an error body.
pub(crate) fn error_message(body: &str) -> String {
    const MAX_CHARS: usize = 500;

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        // Gemini: {"error": {"message": ...}}; DashScope: {"code": ..., "message": ...}
        let message = value
            .pointer("/error/message")
            .or_else(|| value.get("message"))
            .and_then(|m| m.as_str());
        if let Some(message) = message {
            return match value.get("code").and_then(|c| c.as_str()) {
                Some(code) => format!("{}: {}", code, message),
                None => message.to_string(),
            };
        }
    }
    body.trim().chars().take(MAX_CHARS).collect()
}

/// Start a streaming analysis and normalize it into text deltas.
pub async fn stream_text(
    backend: &dyn AnalysisBackend,
    prompt: &str,
    media: &MediaRef,
) -> LlmResult<TextStream> {
    let raw = backend.stream_analysis(prompt, media).await?;
    Ok(normalize(backend.shape(), raw))
}

/// Single-shot completion with retries on transient failures.
pub async fn complete_with_retry(
    backend: &dyn AnalysisBackend,
    prompt: &str,
    retry: &RetryConfig,
) -> LlmResult<String> {
    retry_async(retry, || backend.complete(prompt)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error": {"code": 429, "message": "Resource exhausted", "status": "RESOURCE_EXHAUSTED"}}"#),
            "Resource exhausted"
        );
        assert_eq!(
            error_message(r#"{"code": "InvalidApiKey", "message": "Invalid API-key provided.", "request_id": "x"}"#),
            "InvalidApiKey: Invalid API-key provided."
        );
        assert_eq!(error_message("  upstream timeout \n"), "upstream timeout");
    }
}
