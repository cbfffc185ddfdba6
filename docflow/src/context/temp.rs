//! The run's temporary working area.

use crate::errors::DocflowError;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// A temporary directory plus every file descriptor allocated in it.
///
/// [`TempArea::end`] closes the descriptors, then removes the directory
/// tree. Ending an area that is not active does nothing.
#[derive(Debug, Default)]
pub struct TempArea {
    dir: Option<TempDir>,
    files: Vec<File>,
}

impl TempArea {
    /// Creates an inactive area.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the directory if the area is not active yet.
    pub fn begin(&mut self) -> Result<&Path, DocflowError> {
        let dir = match self.dir.take() {
            Some(dir) => dir,
            None => {
                let dir = tempfile::Builder::new().prefix("docflow-").tempdir()?;
                debug!(path = %dir.path().display(), "Temporary area created");
                dir
            }
        };
        Ok(self.dir.insert(dir).path())
    }

    /// The directory, while active.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(TempDir::path)
    }

    /// Returns true between [`begin`](Self::begin) and [`end`](Self::end).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.dir.is_some()
    }

    /// Creates a uniquely named file, optionally filled with `content`, and
    /// keeps its descriptor open until the area ends.
    pub fn allocate(
        &mut self,
        suffix: Option<&str>,
        content: Option<&[u8]>,
    ) -> Result<PathBuf, DocflowError> {
        let dir = self.path().ok_or(DocflowError::TempAreaUnavailable)?;

        let mut file = tempfile::Builder::new()
            .prefix("tmp")
            .suffix(suffix.unwrap_or(""))
            .tempfile_in(dir)?;
        if let Some(content) = content {
            file.write_all(content)?;
            file.flush()?;
        }

        let (file, path) = file.keep().map_err(|err| err.error)?;
        self.files.push(file);
        Ok(path)
    }

    /// Returns true if `name` exists inside the area; false while inactive.
    #[must_use]
    pub fn contains(&self, name: impl AsRef<Path>) -> bool {
        self.path().is_some_and(|dir| dir.join(name).exists())
    }

    /// Number of descriptors still held open.
    #[must_use]
    pub fn open_descriptors(&self) -> usize {
        self.files.len()
    }

    /// Closes every tracked descriptor and removes the directory.
    pub fn end(&mut self) -> Result<(), DocflowError> {
        self.files.clear();
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            dir.close()?;
            debug!(path = %path.display(), "Temporary area removed");
        }
        Ok(())
    }
}
