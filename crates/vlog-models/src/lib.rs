//! Shared data models for the video activity-log pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Analysis sessions and their identifiers
//! - Time-window planning over a recording
//! - Prompt modes, languages and scenarios
//! - Per-window analysis state and results
//! - The user-memory profile and derived titles
//! - Clip encoding profiles

pub mod analysis;
pub mod encoding;
pub mod memory;
pub mod session;
pub mod window;

// Re-export common types
pub use analysis::{
    Language, LanguageParseError, PromptMode, Scenario, ScenarioParseError, SessionReport, Title,
    WindowOutcome, WindowState,
};
pub use encoding::EncodingProfile;
pub use memory::UserMemory;
pub use session::{AnalysisMode, AnalysisModeParseError, SessionId, VideoSession};
pub use window::{plan_full, plan_windows, PlanWarning, PlanningError, Window, WindowPlan};
