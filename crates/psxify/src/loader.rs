//! Filesystem frame loader.

use std::io;
use std::path::{Path, PathBuf};

use psxify_pipeline::{FrameLoader, PipelineError, RasterBuffer};

/// Loads and decodes an image file.
///
/// A file that exists but may not be read is reported as
/// [`PipelineError::DecodeBlocked`]; every other I/O failure is
/// [`PipelineError::SourceUnavailable`].
#[derive(Debug, Clone)]
pub struct FileLoader {
    path: PathBuf,
}

impl FileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameLoader for FileLoader {
    fn load(&self) -> Result<RasterBuffer, PipelineError> {
        let bytes = std::fs::read(&self.path).map_err(|e| classify_io(&self.path, &e))?;
        tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "read source");
        psxify_pipeline::decode_rgba(&bytes)
    }
}

fn classify_io(path: &Path, err: &io::Error) -> PipelineError {
    let detail = format!("{}: {err}", path.display());
    if err.kind() == io::ErrorKind::PermissionDenied {
        PipelineError::DecodeBlocked(detail)
    } else {
        PipelineError::SourceUnavailable(detail)
    }
}
