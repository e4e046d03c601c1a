//! Analysis session definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for an analysis session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a recording is analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Whole video in a single backend call
    Full,
    /// Overlapping windows, each chained to the previous one's refined text
    #[default]
    SlidingWindow,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Full => "full",
            AnalysisMode::SlidingWindow => "sliding_window",
        }
    }
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AnalysisMode {
    type Err = AnalysisModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(AnalysisMode::Full),
            "sliding_window" | "sliding" | "window" => Ok(AnalysisMode::SlidingWindow),
            _ => Err(AnalysisModeParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown analysis mode: {0}")]
pub struct AnalysisModeParseError(String);

/// One analysis request over a single source recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSession {
    /// Session ID
    pub id: SessionId,
    /// Source media on local disk
    pub source: PathBuf,
    /// Total duration in seconds (probed, never nominal)
    pub duration: f64,
    /// Window size in seconds
    pub window_size: f64,
    /// Window step in seconds
    pub window_step: f64,
    /// Analysis mode
    #[serde(default)]
    pub mode: AnalysisMode,
}

impl VideoSession {
    /// Overlap between consecutive windows, zero when windows are gapped.
    pub fn overlap(&self) -> f64 {
        (self.window_size - self.window_step).max(0.0)
    }
}
