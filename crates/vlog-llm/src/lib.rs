//! Multimodal model backends for window analysis.
//!
//! This crate provides:
//! - The `AnalysisBackend` trait (streaming analysis + single-shot completion)
//! - Gemini and Qwen (DashScope) implementations
//! - SSE decoding of streaming HTTP responses
//! - Normalization of incremental and cumulative streams into text deltas
//! - Retry with exponential backoff for single-shot calls

pub mod backend;
pub mod config;
pub mod dashscope;
pub mod error;
pub mod factory;
pub mod gemini;
pub mod normalize;
pub mod retry;
pub mod sse;
pub mod types;

pub use backend::{complete_with_retry, stream_text, AnalysisBackend, RawChunkStream, TextStream};
pub use config::{LlmConfig, ProviderSettings};
pub use dashscope::DashScopeBackend;
pub use error::{LlmError, LlmResult};
pub use factory::{available_providers, create_backend, Provider};
pub use gemini::GeminiBackend;
pub use normalize::{normalize, snapshot_text, StreamNormalizer};
pub use retry::{retry_async, RetryConfig};
pub use sse::{decode_sse, SseDecoder, SseEvent};
pub use types::{mime_type_for, MediaRef, RawChunk, StreamShape};
