//! Qwen backend over the DashScope native API.
//!
//! With `X-DashScope-SSE: enable` and non-incremental output, every event
//! resends the full message content generated so far, making this a
//! [`StreamShape::Cumulative`] stream.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::{ensure_success, error_message, AnalysisBackend, RawChunkStream};
use crate::config::ProviderSettings;
use crate::error::{LlmError, LlmResult};
use crate::sse::{decode_sse, SseEvent};
use crate::types::{MediaRef, RawChunk, StreamShape};

const PROVIDER: &str = "qwen";
const MULTIMODAL_PATH: &str = "/services/aigc/multimodal-generation/generation";
const TEXT_PATH: &str = "/services/aigc/text-generation/generation";

#[derive(Debug, Serialize)]
struct DashScopeRequest {
    model: String,
    input: Input,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct Input {
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Value,
}

/// DashScope (Qwen) API client.
pub struct DashScopeBackend {
    http: Client,
    settings: ProviderSettings,
    timeout: Duration,
}

impl DashScopeBackend {
    pub fn new(settings: ProviderSettings, timeout: Duration) -> LlmResult<Self> {
        let http = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            http,
            settings,
            timeout,
        })
    }

    /// Local clips go inline as a base64 data URI.
    async fn video_source(media: &MediaRef) -> LlmResult<String> {
        match media {
            MediaRef::Url(url) => Ok(url.clone()),
            MediaRef::File(path) => Ok(format!(
                "data:{};base64,{}",
                media.mime_type(),
                MediaRef::read_base64(path).await?
            )),
        }
    }
}

/// Parse one SSE event into a cumulative snapshot.
fn parse_stream_event(event: &SseEvent) -> LlmResult<RawChunk> {
    let value: Value = serde_json::from_str(&event.data)?;

    let has_error_code = value
        .get("code")
        .and_then(Value::as_str)
        .is_some_and(|code| !code.is_empty());
    if event.event.as_deref() == Some("error") || has_error_code {
        return Err(LlmError::backend(PROVIDER, None, error_message(&event.data)));
    }

    value
        .pointer("/output/choices/0/message/content")
        .cloned()
        .map(RawChunk::Snapshot)
        .ok_or_else(|| {
            LlmError::invalid_response(PROVIDER, "event without output.choices[0].message.content")
        })
}

#[async_trait]
impl AnalysisBackend for DashScopeBackend {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn shape(&self) -> StreamShape {
        StreamShape::Cumulative
    }

    async fn stream_analysis(&self, prompt: &str, media: &MediaRef) -> LlmResult<RawChunkStream> {
        info!(
            "Streaming Qwen analysis: model={}, media={}",
            self.settings.vl_model, media
        );

        let video = Self::video_source(media).await?;
        let request = DashScopeRequest {
            model: self.settings.vl_model.clone(),
            input: Input {
                messages: vec![Message {
                    role: "user",
                    content: json!([
                        { "video": video },
                        { "text": prompt },
                    ]),
                }],
            },
            parameters: json!({ "incremental_output": false }),
        };

        let response = self
            .http
            .post(format!("{}{}", self.settings.endpoint, MULTIMODAL_PATH))
            .bearer_auth(&self.settings.api_key)
            .header("X-DashScope-SSE", "enable")
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(PROVIDER, response).await?;

        let chunks = decode_sse(response.bytes_stream())
            .map(|event| event.and_then(|e| parse_stream_event(&e)));
        Ok(chunks.boxed())
    }

    async fn complete(&self, prompt: &str) -> LlmResult<String> {
        debug!(
            "Qwen completion: model={}, prompt_len={}",
            self.settings.text_model,
            prompt.len()
        );

        let request = DashScopeRequest {
            model: self.settings.text_model.clone(),
            input: Input {
                messages: vec![Message {
                    role: "user",
                    content: Value::String(prompt.to_string()),
                }],
            },
            parameters: json!({ "result_format": "message" }),
        };

        let response = self
            .http
            .post(format!("{}{}", self.settings.endpoint, TEXT_PATH))
            .bearer_auth(&self.settings.api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(PROVIDER, response).await?;

        let body: Value = response.json().await?;
        body.pointer("/output/choices/0/message/content")
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| LlmError::invalid_response(PROVIDER, "no message content in response"))
    }
}
