use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ToolError;

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Confines filesystem access to a single root. Every path a tool touches
/// must normalize to a location under that root before any side effect.
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ToolError> {
        let root = fs::canonicalize(root)
            .map_err(|e| ToolError::PolicyViolation(format!("Invalid confinement root: {}", e)))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate a path that must already exist. Returns the canonical path.
    pub fn validate(&self, path: impl AsRef<Path>) -> Result<PathBuf, ToolError> {
        let path = path.as_ref();

        if path.is_absolute() {
            return Err(ToolError::PolicyViolation(
                "Absolute paths not allowed".into(),
            ));
        }

        // Reject traversal before touching the filesystem.
        if path.to_string_lossy().contains("..") {
            return Err(ToolError::PolicyViolation("Path traversal detected".into()));
        }

        let full_path = self.root.join(path);

        // Canonicalize to resolve symlinks.
        let canonical = fs::canonicalize(&full_path).map_err(|_| {
            ToolError::PolicyViolation("Path does not exist or is inaccessible".into())
        })?;

        // Re-check the boundary after canonicalization (TOCTOU protection).
        if !canonical.starts_with(&self.root) {
            return Err(ToolError::PolicyViolation(
                "Path escapes confinement root".into(),
            ));
        }

        if let Ok(metadata) = fs::metadata(&canonical) {
            if metadata.is_file() && metadata.len() > MAX_FILE_SIZE {
                return Err(ToolError::PolicyViolation("File too large".into()));
            }
        }

        Ok(canonical)
    }

    /// Validate a path that may not exist yet (write/create targets).
    /// Checks every existing component so a symlink cannot smuggle the
    /// final path outside the root.
    pub fn validate_new(&self, path: impl AsRef<Path>) -> Result<PathBuf, ToolError> {
        let path = path.as_ref();

        if path.is_absolute() {
            return Err(ToolError::PolicyViolation(
                "Absolute paths not allowed".into(),
            ));
        }

        if path.to_string_lossy().contains("..") {
            return Err(ToolError::PolicyViolation("Path traversal detected".into()));
        }

        let full_path = self.root.join(path);

        if let Some(parent) = full_path.parent() {
            if parent.exists() {
                let canonical_parent = fs::canonicalize(parent).map_err(|_| {
                    ToolError::PolicyViolation("Invalid parent directory".into())
                })?;
                if !canonical_parent.starts_with(&self.root) {
                    return Err(ToolError::PolicyViolation(
                        "Path escapes confinement root".into(),
                    ));
                }
            }
        }

        let mut current = self.root.clone();
        if let Ok(relative) = full_path.strip_prefix(&self.root) {
            for component in relative.components() {
                current.push(component);
                if current.exists() {
                    if let Ok(canonical) = fs::canonicalize(&current) {
                        if !canonical.starts_with(&self.root) {
                            return Err(ToolError::PolicyViolation(
                                "Symlink escapes confinement root".into(),
                            ));
                        }
                    }
                }
            }
        }

        Ok(full_path)
    }
}
