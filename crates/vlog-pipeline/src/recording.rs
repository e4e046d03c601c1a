//! Master recording assembly.

use std::path::PathBuf;

use tracing::info;

use vlog_media::{Clipper, MediaError, MediaResult, SessionWorkspace};

/// The recording a session is planned over.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterRecording {
    pub path: PathBuf,
    /// Probed duration in seconds
    pub duration: f64,
}

/// Assemble recorded chunks into one master file and probe its duration.
///
/// A single chunk is used in place. Several chunks are concatenated (and
/// re-encoded) into the workspace, then probed again, since the container
/// durations of the parts need not add up to the result.
pub async fn build_master(
    clipper: &dyn Clipper,
    chunks: &[PathBuf],
    workspace: &SessionWorkspace,
) -> MediaResult<MasterRecording> {
    if let Some(missing) = chunks.iter().find(|chunk| !chunk.exists()) {
        return Err(MediaError::FileNotFound(missing.clone()));
    }

    let path = match chunks {
        [] => return Err(MediaError::EmptyConcat),
        [single] => single.clone(),
        _ => {
            let master = workspace.master_path(clipper.extension());
            clipper.concat(chunks, &master).await?;
            info!("Concatenated {} chunks into {}", chunks.len(), master.display());
            master
        }
    };

    let duration = clipper.probe_duration(&path).await?;
    Ok(MasterRecording { path, duration })
}
