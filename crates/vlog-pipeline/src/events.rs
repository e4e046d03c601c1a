//! Progress events emitted while a session runs.

use serde::Serialize;
use tokio::sync::mpsc;

use vlog_models::{PromptMode, SessionId, Title, Window};

/// Event sent to the caller while a session is analyzed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    WindowStarted { window: Window, mode: PromptMode },
    /// Incremental analysis text for a window
    Token { window: usize, text: String },
    WindowRefined { window: usize, text: String },
    Title { title: Title },
    Completed { session_id: SessionId },
}

/// Optional event channel. Events are dropped once the receiver goes away.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(tx: Option<mpsc::Sender<PipelineEvent>>) -> Self {
        Self { tx }
    }

    pub async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }
}
