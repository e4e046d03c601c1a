//! Window clip extraction.
//!
//! Every cut is re-encoded with the extractor's [`EncodingProfile`]; stream
//! copy snaps cut points to keyframes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use vlog_models::EncodingProfile;

use crate::command::{wait_for_cancel, FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::probe_duration;

/// How far past the probed duration a requested segment end may reach
/// before it is rejected instead of clamped.
pub const SEGMENT_TOLERANCE: f64 = 0.1;

/// Media operations the analysis pipeline depends on.
#[async_trait]
pub trait Clipper: Send + Sync {
    /// Container duration in seconds.
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64>;

    /// Cut `[start, start + duration]` out of `input` into `output`.
    async fn slice(&self, input: &Path, start: f64, duration: f64, output: &Path)
        -> MediaResult<()>;

    /// Join `inputs` in order into `output`.
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()>;

    /// File extension produced by this clipper, without the dot.
    fn extension(&self) -> &str;
}

/// What `extract_tail` has to do for a given source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TailPlan {
    /// Source is no longer than the tail; copy it verbatim.
    WholeFile,
    /// Cut the final `duration` seconds starting at `start`.
    Range { start: f64, duration: f64 },
}

/// Decide how to take the last `seconds` of a `duration`-long source.
pub fn plan_tail(duration: f64, seconds: f64) -> TailPlan {
    if duration <= seconds {
        TailPlan::WholeFile
    } else {
        TailPlan::Range {
            start: duration - seconds,
            duration: seconds,
        }
    }
}

/// Check `0 <= start < end <= duration`, allowing `end` to overshoot by
/// [`SEGMENT_TOLERANCE`]. Returns the range with `end` clamped to `duration`.
pub fn validate_segment(start: f64, end: f64, duration: f64) -> MediaResult<(f64, f64)> {
    let reject = || MediaError::invalid_range(start, end, duration);

    if !start.is_finite() || !end.is_finite() || start < 0.0 {
        return Err(reject());
    }
    if end > duration + SEGMENT_TOLERANCE {
        return Err(reject());
    }

    let end = end.min(duration);
    if start >= end {
        return Err(reject());
    }
    Ok((start, end))
}

/// One line of an ffconcat list. Single quotes are closed, escaped and reopened.
fn concat_list_entry(path: &Path) -> String {
    format!("file '{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

/// FFmpeg-backed [`Clipper`].
#[derive(Debug, Clone, Default)]
pub struct ClipExtractor {
    profile: EncodingProfile,
    timeout_secs: Option<u64>,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl ClipExtractor {
    pub fn new(profile: EncodingProfile) -> Self {
        Self {
            profile,
            ..Default::default()
        }
    }

    /// Bound every FFmpeg run.
    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Kill running FFmpeg children once the flag flips to `true`.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn profile(&self) -> &EncodingProfile {
        &self.profile
    }

    fn runner(&self) -> FfmpegRunner {
        let runner = FfmpegRunner::new().with_optional_timeout(self.timeout_secs);
        match &self.cancel_rx {
            Some(rx) => runner.with_cancel(rx.clone()),
            None => runner,
        }
    }

    /// Copy the last `seconds` of `input` into `output`.
    ///
    /// Sources no longer than `seconds` are copied byte for byte.
    pub async fn extract_tail(&self, input: &Path, seconds: f64, output: &Path) -> MediaResult<()> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(MediaError::invalid_range(0.0, seconds, seconds));
        }

        let duration = self.probe_duration(input).await?;
        match plan_tail(duration, seconds) {
            TailPlan::WholeFile => {
                debug!(
                    "Source {} is {:.2}s, copying whole file as tail",
                    input.display(),
                    duration
                );
                tokio::fs::copy(input, output).await?;
                Ok(())
            }
            TailPlan::Range { start, duration } => self.slice(input, start, duration, output).await,
        }
    }

    /// Cut `[start, end]` after validating it against the probed duration.
    pub async fn extract_segment(
        &self,
        input: &Path,
        start: f64,
        end: f64,
        output: &Path,
    ) -> MediaResult<()> {
        let duration = self.probe_duration(input).await?;
        let (start, end) = validate_segment(start, end, duration)?;
        self.slice(input, start, end - start, output).await
    }
}

#[async_trait]
impl Clipper for ClipExtractor {
    /// Bounded by the extractor's timeout and cancel flag like FFmpeg runs;
    /// dropping the probe kills ffprobe.
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        let probe = async {
            match self.timeout_secs {
                Some(secs) => tokio::time::timeout(Duration::from_secs(secs), probe_duration(path))
                    .await
                    .map_err(|_| MediaError::Timeout(secs))?,
                None => probe_duration(path).await,
            }
        };

        tokio::select! {
            biased;
            _ = wait_for_cancel(self.cancel_rx.clone()) => Err(MediaError::Cancelled),
            result = probe => result,
        }
    }

    async fn slice(
        &self,
        input: &Path,
        start: f64,
        duration: f64,
        output: &Path,
    ) -> MediaResult<()> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        if !start.is_finite() || start < 0.0 || !duration.is_finite() || duration <= 0.0 {
            return Err(MediaError::invalid_range(start, start + duration, f64::NAN));
        }

        info!(
            "Slicing clip: {} -> {} (start: {:.2}s, duration: {:.2}s)",
            input.display(),
            output.display(),
            start,
            duration
        );

        let cmd = FfmpegCommand::new(input, output)
            .seek(start)
            .duration(duration)
            .output_args(self.profile.to_ffmpeg_args());

        self.runner().run(&cmd).await?;
        metrics::counter!("vlog_clips_sliced_total").increment(1);
        Ok(())
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> MediaResult<()> {
        if inputs.is_empty() {
            return Err(MediaError::EmptyConcat);
        }

        let mut list = String::new();
        for input in inputs {
            let absolute = tokio::fs::canonicalize(input)
                .await
                .map_err(|_| MediaError::FileNotFound(input.clone()))?;
            list.push_str(&concat_list_entry(&absolute));
            list.push('\n');
        }

        let list_path = output.with_extension("ffconcat");
        tokio::fs::write(&list_path, list).await?;

        info!("Concatenating {} inputs into {}", inputs.len(), output.display());

        let cmd = FfmpegCommand::new(&list_path, output)
            .concat_demuxer()
            .output_args(self.profile.to_ffmpeg_args());
        let result = self.runner().run(&cmd).await;

        if let Err(e) = tokio::fs::remove_file(&list_path).await {
            debug!("Failed to remove concat list {}: {}", list_path.display(), e);
        }
        result
    }

    fn extension(&self) -> &str {
        &self.profile.extension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_tail() {
        assert_eq!(plan_tail(5.0, 10.0), TailPlan::WholeFile);
        assert_eq!(plan_tail(10.0, 10.0), TailPlan::WholeFile);
        assert_eq!(
            plan_tail(20.0, 10.0),
            TailPlan::Range {
                start: 10.0,
                duration: 10.0
            }
        );
    }

    #[test]
    fn test_validate_segment_clamps_small_overshoot() {
        assert_eq!(validate_segment(19.95, 20.0, 20.0).unwrap(), (19.95, 20.0));
        assert_eq!(validate_segment(19.95, 20.08, 20.0).unwrap(), (19.95, 20.0));
        assert_eq!(validate_segment(0.0, 20.0, 20.0).unwrap(), (0.0, 20.0));
    }

    #[test]
    fn test_validate_segment_rejects() {
        assert!(matches!(
            validate_segment(5.0, 25.0, 20.0),
            Err(MediaError::InvalidRange { .. })
        ));
        assert!(validate_segment(-1.0, 5.0, 20.0).is_err());
        assert!(validate_segment(8.0, 8.0, 20.0).is_err());
        assert!(validate_segment(9.0, 8.0, 20.0).is_err());
        // Collapses to zero length once clamped.
        assert!(validate_segment(20.0, 20.05, 20.0).is_err());
        assert!(validate_segment(f64::NAN, 5.0, 20.0).is_err());
    }

    #[test]
    fn test_concat_list_entry_escapes_quotes() {
        assert_eq!(
            concat_list_entry(Path::new("/tmp/a b/chunk_1.mp4")),
            "file '/tmp/a b/chunk_1.mp4'"
        );
        assert_eq!(
            concat_list_entry(Path::new("/tmp/it's.mp4")),
            r"file '/tmp/it'\''s.mp4'"
        );
    }

    #[tokio::test]
    async fn test_concat_rejects_empty_list() {
        let extractor = ClipExtractor::default();
        let err = extractor.concat(&[], Path::new("out.mp4")).await.unwrap_err();
        assert!(matches!(err, MediaError::EmptyConcat));
    }

    #[tokio::test]
    async fn test_slice_missing_input() {
        let extractor = ClipExtractor::default();
        let err = extractor
            .slice(Path::new("/nope/in.mp4"), 0.0, 5.0, Path::new("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_segment_probe_honors_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.mp4");
        std::fs::write(&source, b"not really a video").unwrap();

        let (_cancel_tx, cancel_rx) = watch::channel(true);
        let extractor = ClipExtractor::default().with_cancel(cancel_rx);

        let err = extractor
            .extract_segment(&source, 0.0, 5.0, &dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Cancelled));

        let err = extractor
            .extract_tail(&source, 5.0, &dir.path().join("tail.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Cancelled));
    }

    /// Requires ffmpeg and ffprobe on PATH.
    #[tokio::test]
    #[ignore]
    async fn test_slice_and_tail_with_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.mp4");
        let status = tokio::process::Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-f", "lavfi", "-i", "testsrc=duration=20:size=160x120:rate=10"])
            .args(["-f", "lavfi", "-i", "sine=duration=20", "-shortest"])
            .arg(&source)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let extractor = ClipExtractor::new(EncodingProfile::default());

        let clip = dir.path().join("w1.mp4");
        extractor.slice(&source, 10.0, 5.0, &clip).await.unwrap();
        let sliced = extractor.probe_duration(&clip).await.unwrap();
        assert!((sliced - 5.0).abs() < 0.2, "sliced duration {}", sliced);

        let tail = dir.path().join("tail.mp4");
        extractor.extract_tail(&source, 30.0, &tail).await.unwrap();
        assert_eq!(
            std::fs::metadata(&tail).unwrap().len(),
            std::fs::metadata(&source).unwrap().len()
        );

        let joined = dir.path().join("joined.mp4");
        extractor
            .concat(&[clip.clone(), clip.clone()], &joined)
            .await
            .unwrap();
        let joined_duration = extractor.probe_duration(&joined).await.unwrap();
        assert!((joined_duration - 10.0).abs() < 0.5);
    }
}
