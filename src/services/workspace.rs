use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, warn};

/// Fixed name of the uploaded document inside a workspace.
pub const INPUT_FILE_NAME: &str = "input.pdf";

/// Fixed name of the converted document inside a workspace.
pub const OUTPUT_FILE_NAME: &str = "output.epub";

const WORKSPACE_PREFIX: &str = "pdf2epub-";

#[derive(Debug, Error)]
#[error("Workspace error: {0}")]
pub struct WorkspaceError(#[from] pub io::Error);

/// Allocates per-request scratch directories under a fixed root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates a fresh, uniquely named directory. The returned guard owns it:
    /// call [`Workspace::release`] when done, or let the guard drop.
    pub fn acquire(&self) -> Result<Workspace, WorkspaceError> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(&self.root)?;
        debug!(path = %dir.path().display(), "workspace: acquired");
        Ok(Workspace { dir: Some(dir) })
    }
}

/// An exclusively owned scratch directory holding one input and one output file.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            // `dir` is only taken by `release`, which consumes `self`
            None => Path::new(""),
        }
    }

    pub fn input_path(&self) -> PathBuf {
        self.path().join(INPUT_FILE_NAME)
    }

    pub fn output_path(&self) -> PathBuf {
        self.path().join(OUTPUT_FILE_NAME)
    }

    /// Recursively removes the directory and everything in it.
    pub fn release(mut self) -> Result<(), WorkspaceError> {
        match self.dir.take() {
            Some(dir) => {
                let path = dir.path().to_path_buf();
                dir.close()?;
                debug!(path = %path.display(), "workspace: released");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        // Reached on early returns, panics and cancelled requests
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(path = %path.display(), "workspace: released on drop"),
                Err(e) => warn!(path = %path.display(), error = %e, "workspace: cleanup failed"),
            }
        }
    }
}
