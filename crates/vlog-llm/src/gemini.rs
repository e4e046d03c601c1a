//! Gemini backend.
//!
//! Streams through `streamGenerateContent?alt=sse`; every event carries only
//! the newly generated text, so the stream is [`StreamShape::Incremental`].

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::{ensure_success, AnalysisBackend, RawChunkStream};
use crate::config::ProviderSettings;
use crate::error::{LlmError, LlmResult};
use crate::sse::decode_sse;
use crate::types::{MediaRef, RawChunk, StreamShape};

const PROVIDER: &str = "gemini";

/// Gemini API request.
#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
    File {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData {
    mime_type: String,
    file_uri: String,
}

/// Gemini API response, also the payload of each streamed event.
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<u16>,
    message: String,
}

impl GeminiResponse {
    /// Text of the first candidate, or the error the payload reports.
    fn into_text(self) -> LlmResult<String> {
        if let Some(error) = self.error {
            return Err(LlmError::backend(PROVIDER, error.code, error.message));
        }
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::backend(
                PROVIDER,
                None,
                format!("prompt blocked: {}", reason),
            ));
        }

        Ok(self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default())
    }
}

/// Gemini API client.
pub struct GeminiBackend {
    http: Client,
    settings: ProviderSettings,
    timeout: Duration,
}

impl GeminiBackend {
    pub fn new(settings: ProviderSettings, timeout: Duration) -> LlmResult<Self> {
        let http = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            http,
            settings,
            timeout,
        })
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.settings.endpoint, model, method)
    }

    async fn media_part(media: &MediaRef) -> LlmResult<Part> {
        let mime_type = media.mime_type().to_string();
        Ok(match media {
            MediaRef::File(path) => Part::Inline {
                inline_data: Blob {
                    mime_type,
                    data: MediaRef::read_base64(path).await?,
                },
            },
            MediaRef::Url(url) => Part::File {
                file_data: FileData {
                    mime_type,
                    file_uri: url.clone(),
                },
            },
        })
    }
}

/// Parse one SSE payload into a delta.
fn parse_stream_event(data: &str) -> LlmResult<RawChunk> {
    let event: GeminiResponse = serde_json::from_str(data)?;
    Ok(RawChunk::Delta(event.into_text()?))
}

#[async_trait]
impl AnalysisBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn shape(&self) -> StreamShape {
        StreamShape::Incremental
    }

    async fn stream_analysis(&self, prompt: &str, media: &MediaRef) -> LlmResult<RawChunkStream> {
        info!(
            "Streaming Gemini analysis: model={}, media={}",
            self.settings.vl_model, media
        );

        let request = GeminiRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Self::media_part(media).await?,
                    Part::Text {
                        text: prompt.to_string(),
                    },
                ],
            }],
        };

        let response = self
            .http
            .post(self.url(&self.settings.vl_model, "streamGenerateContent"))
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(PROVIDER, response).await?;

        let chunks = decode_sse(response.bytes_stream())
            .map(|event| event.and_then(|e| parse_stream_event(&e.data)));
        Ok(chunks.boxed())
    }

    async fn complete(&self, prompt: &str) -> LlmResult<String> {
        debug!(
            "Gemini completion: model={}, prompt_len={}",
            self.settings.text_model,
            prompt.len()
        );

        let request = GeminiRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part::Text {
                    text: prompt.to_string(),
                }],
            }],
        };

        let response = self
            .http
            .post(self.url(&self.settings.text_model, "generateContent"))
            .header("x-goog-api-key", &self.settings.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(PROVIDER, response).await?;

        let body: GeminiResponse = response.json().await?;
        let text = body.into_text()?;
        if text.trim().is_empty() {
            return Err(LlmError::invalid_response(PROVIDER, "no text in response"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::stream_text;
    use futures::TryStreamExt;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> GeminiBackend {
        let mut settings = ProviderSettings::gemini("test-key").with_endpoint(server.uri());
        settings.vl_model = "gemini-vl".to_string();
        settings.text_model = "gemini-text".to_string();
        GeminiBackend::new(settings, Duration::from_secs(5)).unwrap()
    }

    fn sse_body(events: &[&str]) -> String {
        events
            .iter()
            .map(|e| format!("data: {}\r\n\r\n", e))
            .collect()
    }

    #[tokio::test]
    async fn test_stream_yields_deltas() {
        let server = MockServer::start().await;
        let body = sse_body(&[
            r#"{"candidates":[{"content":{"parts":[{"text":"00:00 opens "}],"role":"model"}}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":"the editor"}],"role":"model"}}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":""}],"role":"model"},"finishReason":"STOP"}]}"#,
        ]);
        Mock::given(method("POST"))
            .and(path("/models/gemini-vl:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server);
        let media = MediaRef::Url("https://bucket.example.com/w0.webm?sig=1".to_string());
        let parts: Vec<String> = stream_text(&backend, "describe", &media)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(parts, vec!["00:00 opens ", "the editor"]);

        let requests = server.received_requests().await.unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            sent["contents"][0]["parts"][0]["fileData"]["mimeType"],
            "video/webm"
        );
        assert_eq!(sent["contents"][0]["parts"][1]["text"], "describe");
    }

    #[tokio::test]
    async fn test_local_file_sent_inline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-vl:streamGenerateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse_body(&[
                r#"{"candidates":[{"content":{"parts":[{"text":"ok"}]}}]}"#,
            ])))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("w0.mp4");
        std::fs::write(&clip, b"fake-video").unwrap();

        let backend = backend(&server);
        let parts: Vec<String> = stream_text(&backend, "p", &MediaRef::File(clip))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(parts, vec!["ok"]);

        let requests = server.received_requests().await.unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let inline = &sent["contents"][0]["parts"][0]["inlineData"];
        assert_eq!(inline["mimeType"], "video/mp4");
        assert_eq!(inline["data"], "ZmFrZS12aWRlbw==");
    }

    #[tokio::test]
    async fn test_http_error_is_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string(
                r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#,
            ))
            .mount(&server)
            .await;

        let backend = backend(&server);
        let err = match backend
            .stream_analysis("p", &MediaRef::Url("gs://b/w.mp4".to_string()))
            .await
        {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        match &err {
            LlmError::Backend {
                status, message, ..
            } => {
                assert_eq!(*status, Some(429));
                assert_eq!(message, "Resource has been exhausted");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_complete_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-text:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"candidates":[{"content":{"parts":[{"text":"Debugging "},{"text":"tokio"}]}}]}"#,
            ))
            .mount(&server)
            .await;

        let text = backend(&server).complete("title please").await.unwrap();
        assert_eq!(text, "Debugging tokio");
    }

    #[tokio::test]
    async fn test_complete_blocked_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#),
            )
            .mount(&server)
            .await;

        let err = backend(&server).complete("p").await.unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_stream_event_error_payload() {
        let err = parse_stream_event(r#"{"error":{"code":500,"message":"internal"}}"#).unwrap_err();
        assert!(matches!(err, LlmError::Backend { status: Some(500), .. }));
    }
}
