//! FFprobe duration lookup.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Probe the container duration of a media file in seconds.
pub async fn probe_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            format!("exited with {}", output.status),
            Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_duration_output(&stdout).ok_or_else(|| MediaError::InvalidDuration {
        path: path.to_path_buf(),
        output: stdout.trim().to_string(),
    })
}

/// Parse ffprobe's bare duration output.
///
/// Returns `None` for `N/A`, empty output, negative or non-finite values.
pub fn parse_duration_output(stdout: &str) -> Option<f64> {
    let value = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let duration = value.parse::<f64>().ok()?;
    (duration.is_finite() && duration >= 0.0).then_some(duration)
}
