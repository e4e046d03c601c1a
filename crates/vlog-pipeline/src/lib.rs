//! Windowed video analysis pipeline.
//!
//! This crate provides:
//! - Environment-driven pipeline configuration
//! - Prompt construction per analysis mode
//! - The session orchestrator (slicing, streaming, refinement, title, memory)
//! - Clip publishing to the backend (local files or presigned object URLs)
//! - Progress events and structured session logging

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod orchestrator;
pub mod prompts;
pub mod publish;
pub mod recording;
pub mod stages;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use events::{EventSink, PipelineEvent};
pub use logging::SessionLogger;
pub use orchestrator::{AnalysisOrchestrator, AnalysisRequest};
pub use prompts::{DefaultPromptBuilder, PromptBuilder};
pub use publish::{LocalPublisher, MediaPublisher, ObjectStorePublisher, PublishedClip};
pub use recording::{build_master, MasterRecording};
pub use stages::{memory_or_empty, parse_memory_response};
