//! Per-job workspace allocation.
//!
//! Each submission gets a fresh directory under the upload root, named by a
//! newly generated [`JobToken`]. Allocation uses an exclusive `create_dir`
//! so two concurrent callers can never end up sharing a directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::ResourceError;
use crate::identifiers::JobToken;

/// How many fresh tokens are tried before giving up with `WorkspaceExists`.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 8;

/// A job's exclusively owned output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workspace {
    token: JobToken,
    path: PathBuf,
}

impl Workspace {
    pub fn token(&self) -> &JobToken {
        &self.token
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rebuild the workspace handle for a token without touching the disk.
    pub fn locate(root: &Path, token: JobToken) -> Self {
        let path = root.join(token.as_str());
        Self { token, path }
    }
}

/// Create a fresh workspace under `root` with a random token.
pub fn create_workspace(root: &Path) -> Result<Workspace, ResourceError> {
    create_workspace_with(root, JobToken::generate)
}

/// Create a fresh workspace under `root`, drawing tokens from `next_token`.
///
/// A token whose directory already exists is discarded and a new one drawn,
/// up to [`MAX_ALLOCATION_ATTEMPTS`] times.
pub fn create_workspace_with(
    root: &Path,
    mut next_token: impl FnMut() -> JobToken,
) -> Result<Workspace, ResourceError> {
    std::fs::create_dir_all(root).map_err(|e| ResourceError::io(root, e))?;

    let mut last_collision = None;
    for _ in 0..MAX_ALLOCATION_ATTEMPTS {
        let token = next_token();
        let path = root.join(token.as_str());
        match std::fs::create_dir(&path) {
            Ok(()) => {
                tracing::debug!(job_token = %token, path = %path.display(), "Workspace created");
                return Ok(Workspace { token, path });
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::warn!(job_token = %token, "Workspace token collision, retrying");
                last_collision = Some(path);
            }
            Err(e) => return Err(ResourceError::io(path, e)),
        }
    }

    Err(ResourceError::WorkspaceExists(
        last_collision.unwrap_or_else(|| root.to_path_buf()),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
