//! Per-session scratch directory.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

use vlog_models::Window;

use crate::error::MediaResult;

/// Scratch directory holding a session's master recording and window clips.
///
/// Removed when dropped, so a session that fails or is cancelled leaves no
/// clips behind.
#[derive(Debug)]
pub struct SessionWorkspace {
    dir: TempDir,
}

impl SessionWorkspace {
    /// Create a fresh workspace under `root`, creating `root` if needed.
    pub fn create(root: impl AsRef<Path>, session_id: &str) -> MediaResult<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", session_id))
            .tempdir_in(root)?;
        debug!("Created session workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a window's clip, e.g. `w002_20.0-32.0s.mp4`.
    pub fn clip_path(&self, window: &Window, extension: &str) -> PathBuf {
        self.dir.path().join(format!(
            "w{:03}_{:.1}-{:.1}s.{}",
            window.index, window.start, window.end, extension
        ))
    }

    /// Path for the concatenated master recording.
    pub fn master_path(&self, extension: &str) -> PathBuf {
        self.dir.path().join(format!("master.{}", extension))
    }

    /// Remove the directory now, reporting failures instead of ignoring them.
    pub fn close(self) -> MediaResult<()> {
        self.dir.close()?;
        Ok(())
    }
}
