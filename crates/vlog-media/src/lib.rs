//! FFmpeg CLI wrapper for window clip extraction.
//!
//! This crate provides:
//! - FFmpeg command building
//! - Cancellation and timeouts for FFmpeg children
//! - Duration probing via FFprobe
//! - Slicing, tail extraction, validated segments and concatenation
//! - Per-session scratch workspaces

pub mod clip;
pub mod command;
pub mod error;
pub mod probe;
pub mod workspace;

pub use clip::{plan_tail, validate_segment, ClipExtractor, Clipper, TailPlan, SEGMENT_TOLERANCE};
pub use command::{check_ffmpeg, check_ffprobe, wait_for_cancel, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::{parse_duration_output, probe_duration};
pub use workspace::SessionWorkspace;
