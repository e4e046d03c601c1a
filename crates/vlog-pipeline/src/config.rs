//! Pipeline configuration.

use std::path::PathBuf;
use std::str::FromStr;

use vlog_llm::Provider;
use vlog_models::{AnalysisMode, EncodingProfile, Language, Scenario};

use crate::error::{PipelineError, PipelineResult};

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Window size in seconds
    pub window_size: f64,
    /// Distance between window starts in seconds
    pub window_step: f64,
    /// Root under which per-session workspaces are created
    pub temp_dir: PathBuf,
    /// Prompt and result language
    pub language: Language,
    /// Recording scenario used for prompt hints
    pub scenario: Scenario,
    /// Whether analysis prompts carry the scenario hint
    pub include_scenario_hint: bool,
    /// Per-invocation FFmpeg time limit
    pub ffmpeg_timeout_secs: Option<u64>,
    /// Clips sliced concurrently ahead of analysis
    pub slice_parallelism: usize,
    /// Upper bound on title length in characters
    pub title_max_chars: usize,
    /// Default analysis mode for sessions that don't override it
    pub mode: AnalysisMode,
    /// Encoding of sliced clips and master recordings
    pub encoding: EncodingProfile,
    /// Keep published clips in object storage after analysis
    pub keep_clips: bool,
    /// Backend used for analysis and single-shot calls
    pub provider: Provider,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: 15.0,
            window_step: 10.0,
            temp_dir: PathBuf::from("/tmp/vlog"),
            language: Language::Zh,
            scenario: Scenario::General,
            include_scenario_hint: true,
            ffmpeg_timeout_secs: None,
            slice_parallelism: 2,
            title_max_chars: 50,
            mode: AnalysisMode::SlidingWindow,
            encoding: EncodingProfile::default(),
            keep_clips: false,
            provider: Provider::Qwen,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    ///
    /// Unset or unparseable numeric values fall back to defaults; unknown
    /// language, scenario, mode, encoding or provider names are rejected.
    pub fn from_env() -> PipelineResult<Self> {
        let defaults = Self::default();

        let encoding = match std::env::var("VIDEO_ENCODING") {
            Ok(name) => EncodingProfile::by_name(&name)
                .ok_or_else(|| PipelineError::config(format!("Unknown encoding: {}", name)))?,
            Err(_) => defaults.encoding,
        };
        let encoding = match env_parse::<u8>("VIDEO_CRF") {
            Some(crf) => encoding.with_crf(crf),
            None => encoding,
        };

        Ok(Self {
            window_size: env_parse("VIDEO_WINDOW_SIZE").unwrap_or(defaults.window_size),
            window_step: env_parse("VIDEO_WINDOW_STEP").unwrap_or(defaults.window_step),
            temp_dir: std::env::var("TEMP_VIDEO_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            language: env_named("PROMPT_LANGUAGE")?.unwrap_or(defaults.language),
            scenario: env_named("PROMPT_SCENARIO")?.unwrap_or(defaults.scenario),
            include_scenario_hint: env_flag("PROMPT_INCLUDE_SCENARIO_HINT")
                .unwrap_or(defaults.include_scenario_hint),
            ffmpeg_timeout_secs: env_parse("FFMPEG_TIMEOUT_SECS"),
            slice_parallelism: env_parse::<usize>("SLICE_PARALLELISM")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.slice_parallelism),
            title_max_chars: env_parse::<usize>("TITLE_MAX_CHARS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.title_max_chars),
            mode: env_named("ANALYSIS_MODE")?.unwrap_or(defaults.mode),
            encoding,
            keep_clips: env_flag("KEEP_CLIPS").unwrap_or(defaults.keep_clips),
            provider: env_named("LLM_PROVIDER")?.unwrap_or(defaults.provider),
        })
    }

    /// Overlap between consecutive windows, zero when windows are gapped.
    pub fn overlap(&self) -> f64 {
        (self.window_size - self.window_step).max(0.0)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|s| parse_flag(&s))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_named<T>(name: &str) -> PipelineResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| PipelineError::config(format!("{}: {}", name, e))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.window_size, 15.0);
        assert_eq!(config.window_step, 10.0);
        assert_eq!(config.overlap(), 5.0);
        assert_eq!(config.language, Language::Zh);
        assert_eq!(config.title_max_chars, 50);
        assert_eq!(config.encoding.extension, "mp4");
    }

    #[test]
    fn test_gapped_overlap_is_zero() {
        let config = PipelineConfig {
            window_size: 10.0,
            window_step: 20.0,
            ..Default::default()
        };
        assert_eq!(config.overlap(), 0.0);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
