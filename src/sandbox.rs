//! Path containment for every tool that touches the file system.
//!
//! All paths supplied by the model or the operator are resolved against the
//! project root and rejected if they land outside of it. Resolution is
//! lexical first (`.` and `..` are collapsed without touching the disk) so
//! that paths which do not exist yet, like the target of a `write_file`, can
//! be checked before any I/O happens. The deepest part of the path that does
//! exist is then canonicalized, so a symlink inside the project cannot lead
//! out of it.

use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    #[error("Path outside project: {0}")]
    OutsideRoot(String),
}

/// A resolved absolute path that is known to lie within the sandbox root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxedPath {
    absolute: PathBuf,
}

impl SandboxedPath {
    pub fn as_path(&self) -> &Path {
        &self.absolute
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.absolute
    }
}

impl AsRef<Path> for SandboxedPath {
    fn as_ref(&self) -> &Path {
        &self.absolute
    }
}

/// The project root beyond which no tool may reach.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Create a sandbox rooted at `root`. Relative roots are made absolute
    /// against the current directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&root))
                .unwrap_or(root)
        };
        Self {
            root: normalize(&root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `candidate` against the root, rejecting anything that escapes it.
    ///
    /// The comparison is case-insensitive so that case-insensitive file systems
    /// cannot be used to sidestep the check.
    pub fn resolve(&self, candidate: impl AsRef<Path>) -> Result<SandboxedPath, SandboxError> {
        let candidate = candidate.as_ref();
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };
        let full = normalize(&joined);

        if is_within(&self.root, &full) && self.stays_within_on_disk(&full) {
            Ok(SandboxedPath { absolute: full })
        } else {
            Err(SandboxError::OutsideRoot(candidate.display().to_string()))
        }
    }

    /// Follow symlinks in the deepest existing ancestor of `full` and check
    /// that the real location is still under the real root. A root that does
    /// not exist has nothing on disk to follow.
    fn stays_within_on_disk(&self, full: &Path) -> bool {
        let Ok(real_root) = self.root.canonicalize() else {
            return true;
        };
        let existing = full
            .ancestors()
            .take_while(|ancestor| is_within(&self.root, ancestor))
            .find(|ancestor| ancestor.symlink_metadata().is_ok());
        let Some(existing) = existing else {
            return true;
        };
        // Dangling or looping links cannot be followed
        match existing.canonicalize() {
            Ok(real) => is_within(&real_root, &real),
            Err(_) => false,
        }
    }
}

fn is_within(root: &Path, full: &Path) -> bool {
    let root_lower = root.to_string_lossy().to_lowercase();
    let full_lower = full.to_string_lossy().to_lowercase();

    if full_lower == root_lower {
        return true;
    }

    // A root like "/" already ends with the separator
    let prefix = if root_lower.ends_with(MAIN_SEPARATOR) {
        root_lower
    } else {
        format!("{}{}", root_lower, MAIN_SEPARATOR)
    };
    full_lower.starts_with(&prefix)
}

/// Collapse `.` and `..` components without consulting the file system.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping at the file-system root is a no-op, like `cd /..`
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
