//! Artifact I/O
//!
//! Every generated file goes through [`sync_artifact`]: read the current
//! content (if any), build the replacement fully in memory, then write it
//! through a temporary file in the same directory and rename it into place.
//! A failure while building never touches the file on disk.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, trace};

use crate::codegen::WriteMode;
use crate::error::GraftError;

/// What happened to one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    Created,
    Updated,
    Unchanged,
    /// Check mode only: the artifact would be created or rewritten
    Stale,
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Stale => "stale",
        };
        f.write_str(label)
    }
}

/// Read, rebuild and (unless checking) write one artifact
pub fn sync_artifact<F>(path: &Path, mode: WriteMode, render: F) -> Result<ArtifactStatus, GraftError>
where
    F: FnOnce(Option<&str>) -> Result<String, GraftError>,
{
    let existing = read_existing(path)?;
    trace!(path = ?path, present = existing.is_some(), "Read artifact");

    let content = render(existing.as_deref())?;

    if existing.as_deref() == Some(content.as_str()) {
        debug!(path = ?path, "Artifact unchanged");
        return Ok(ArtifactStatus::Unchanged);
    }

    if mode == WriteMode::Check {
        debug!(path = ?path, "Artifact is stale");
        return Ok(ArtifactStatus::Stale);
    }

    write_atomic(path, &content)?;
    debug!(path = ?path, bytes = content.len(), "Wrote artifact");

    Ok(if existing.is_some() {
        ArtifactStatus::Updated
    } else {
        ArtifactStatus::Created
    })
}

fn read_existing(path: &Path) -> Result<Option<String>, GraftError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(GraftError::io(path, e)),
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<(), GraftError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| GraftError::io(dir, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| GraftError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| GraftError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_creates_then_reports_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.go");

        let status = sync_artifact(&path, WriteMode::Write, |existing| {
            assert!(existing.is_none());
            Ok("package models\n".to_string())
        })
        .unwrap();
        assert_eq!(status, ArtifactStatus::Created);

        let status = sync_artifact(&path, WriteMode::Write, |existing| {
            Ok(existing.unwrap().to_string())
        })
        .unwrap();
        assert_eq!(status, ArtifactStatus::Unchanged);
    }

    #[test]
    fn test_sync_updates_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.go");
        fs::write(&path, "package old\n").unwrap();

        let status =
            sync_artifact(&path, WriteMode::Write, |_| Ok("package models\n".to_string())).unwrap();

        assert_eq!(status, ArtifactStatus::Updated);
        assert_eq!(fs::read_to_string(&path).unwrap(), "package models\n");
    }

    #[test]
    fn test_render_failure_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.go");
        fs::write(&path, "package models\nfunc {\n").unwrap();

        let result = sync_artifact(&path, WriteMode::Write, |_| {
            Err(GraftError::Parse {
                path: path.clone(),
                message: "syntax error".to_string(),
            })
        });

        assert!(matches!(result, Err(GraftError::Parse { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "package models\nfunc {\n");
    }

    #[test]
    fn test_check_mode_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.go");

        let status =
            sync_artifact(&path, WriteMode::Check, |_| Ok("package models\n".to_string())).unwrap();

        assert_eq!(status, ArtifactStatus::Stale);
        assert!(!path.exists());
    }
}
