//! Per-window analysis state, prompt selection and session results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::{SessionId, UserMemory, Window};

/// Lifecycle of a single window inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    /// Window computed, no clip yet
    #[default]
    Planned,
    /// Clip materialized on disk
    Sliced,
    /// Backend stream in progress
    Streaming,
    /// Stream finished, raw text frozen
    Accumulated,
    /// Refinement pass produced the final text
    Refined,
    /// Refined text handed to the next window
    Done,
    /// Terminal failure; aborts the session
    Failed,
}

impl WindowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowState::Planned => "planned",
            WindowState::Sliced => "sliced",
            WindowState::Streaming => "streaming",
            WindowState::Accumulated => "accumulated",
            WindowState::Refined => "refined",
            WindowState::Done => "done",
            WindowState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WindowState::Done | WindowState::Failed)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: WindowState) -> bool {
        use WindowState::*;
        match (self, next) {
            (Done, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Planned, Sliced)
            | (Sliced, Streaming)
            | (Streaming, Accumulated)
            | (Accumulated, Refined)
            | (Refined, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for WindowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which analysis prompt a backend call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    /// Whole recording, no windowing
    Full,
    /// First window, no prior context
    FirstWindow,
    /// Later windows, prior refined text supplied as context
    SubsequentWindow,
}

impl PromptMode {
    /// Select the mode for a window given whether prior context exists.
    pub fn for_window(window: &Window, has_context: bool) -> Self {
        if window.is_first() || !has_context {
            PromptMode::FirstWindow
        } else {
            PromptMode::SubsequentWindow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptMode::Full => "full",
            PromptMode::FirstWindow => "first_window",
            PromptMode::SubsequentWindow => "subsequent_window",
        }
    }
}

impl fmt::Display for PromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output language of prompts and results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    Zh,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Zh => "zh",
            Language::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Language {
    type Err = LanguageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zh" | "zh-cn" | "chinese" => Ok(Language::Zh),
            "en" | "en-us" | "english" => Ok(Language::En),
            _ => Err(LanguageParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unsupported language: {0}")]
pub struct LanguageParseError(String);

/// Kind of activity being recorded, used to pick prompt hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Programming,
    Crafts,
    Teaching,
    #[default]
    General,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Programming => "programming",
            Scenario::Crafts => "crafts",
            Scenario::Teaching => "teaching",
            Scenario::General => "general",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Scenario {
    type Err = ScenarioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "programming" => Ok(Scenario::Programming),
            "crafts" => Ok(Scenario::Crafts),
            "teaching" => Ok(Scenario::Teaching),
            "general" => Ok(Scenario::General),
            _ => Err(ScenarioParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Invalid scenario: {0}")]
pub struct ScenarioParseError(String);

/// Short session title, bounded in characters rather than bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Title(String);

impl Title {
    /// Clean up a model completion and bound it to `max_chars` characters.
    ///
    /// Strips surrounding whitespace, quotes and a leading `Title:` label that
    /// models tend to add despite being told not to.
    pub fn from_completion(raw: &str, max_chars: usize) -> Self {
        let first_line = raw.trim().lines().next().unwrap_or_default().trim();
        let unlabeled = ["Title:", "title:", "标题:", "标题："]
            .iter()
            .find_map(|label| first_line.strip_prefix(label))
            .unwrap_or(first_line)
            .trim();
        let unquoted = unlabeled
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”' | '「' | '」' | '《' | '》'))
            .trim();

        Self(unquoted.chars().take(max_chars).collect())
    }

    /// Title used when none could be generated.
    pub fn fallback(language: Language) -> Self {
        match language {
            Language::Zh => Self("视频分析".to_string()),
            Language::En => Self("Video analysis".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final record of one analyzed window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowOutcome {
    pub window: Window,
    pub mode: PromptMode,
    /// Complete raw text accumulated from the stream
    pub raw: String,
    /// Output of the refinement pass
    pub refined: String,
    pub state: WindowState,
}

/// Everything a session produces, in window order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub duration: f64,
    pub windows: Vec<WindowOutcome>,
    pub title: Title,
    pub memory: UserMemory,
    /// Best-effort stages that failed without aborting the session
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SessionReport {
    /// Refined texts in window order.
    pub fn refined_texts(&self) -> Vec<&str> {
        self.windows.iter().map(|w| w.refined.as_str()).collect()
    }
}
