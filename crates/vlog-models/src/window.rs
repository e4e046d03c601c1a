//! Time-window planning over a recording.
//!
//! A recording is cut into possibly overlapping windows. Window `i` starts at
//! `i * step`; the last window's end is clamped to the recording duration and
//! may be shorter than the nominal window size.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ends closer than this to the duration are snapped onto it.
const END_EPSILON: f64 = 1e-6;

/// Errors from window planning.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanningError {
    #[error("Window step must be positive, got {0}")]
    InvalidStep(f64),

    #[error("Window size must be positive, got {0}")]
    InvalidWindowSize(f64),

    #[error("Video has no duration to plan over ({0}s)")]
    EmptyVideo(f64),
}

/// A contiguous time range of the source recording analyzed as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// 0-based position in the plan
    pub index: usize,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
}

impl Window {
    /// Actual duration of this window.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether this is the first window of a plan.
    pub fn is_first(&self) -> bool {
        self.index == 0
    }
}

/// Non-fatal observations about a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanWarning {
    /// Consecutive windows do not overlap, so context chaining has no shared footage.
    NoOverlap { size: f64, step: f64 },
}

impl std::fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanWarning::NoOverlap { size, step } => write!(
                f,
                "window step {}s >= window size {}s, windows will not overlap",
                step, size
            ),
        }
    }
}

/// Ordered windows covering a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowPlan {
    pub windows: Vec<Window>,
    #[serde(default)]
    pub warnings: Vec<PlanWarning>,
}

impl WindowPlan {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Overlap between consecutive windows in seconds.
    pub fn overlap(&self) -> f64 {
        match self.windows.as_slice() {
            [first, second, ..] => (first.end - second.start).max(0.0),
            _ => 0.0,
        }
    }
}

/// Plan sliding windows over a recording of `duration` seconds.
///
/// # Errors
/// Rejects non-positive or non-finite `size`/`step`, and recordings without a
/// positive duration.
pub fn plan_windows(duration: f64, size: f64, step: f64) -> Result<WindowPlan, PlanningError> {
    if !step.is_finite() || step <= 0.0 {
        return Err(PlanningError::InvalidStep(step));
    }
    if !size.is_finite() || size <= 0.0 {
        return Err(PlanningError::InvalidWindowSize(size));
    }
    if !duration.is_finite() || duration <= 0.0 {
        return Err(PlanningError::EmptyVideo(duration));
    }

    let mut warnings = Vec::new();
    if step >= size {
        warnings.push(PlanWarning::NoOverlap { size, step });
    }

    let mut windows = Vec::new();
    let mut index = 0usize;
    loop {
        // Derived from the index so repeated additions don't drift.
        let start = index as f64 * step;
        let mut end = (start + size).min(duration);
        if duration - end <= END_EPSILON {
            end = duration;
        }

        windows.push(Window { index, start, end });

        if end >= duration {
            break;
        }
        index += 1;
    }

    Ok(WindowPlan { windows, warnings })
}

/// Plan a single window spanning the whole recording.
pub fn plan_full(duration: f64) -> Result<WindowPlan, PlanningError> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(PlanningError::EmptyVideo(duration));
    }
    Ok(WindowPlan {
        windows: vec![Window {
            index: 0,
            start: 0.0,
            end: duration,
        }],
        warnings: Vec::new(),
    })
}
