//! Revisions manifests: three lines naming the left, base and right
//! directories, relative to the manifest's own directory.

use std::path::{Path, PathBuf};

use semimerge_engine::Revisions;
use thiserror::Error;

/// Directory, next to the manifest, that receives merged files.
pub const MERGED_DIR: &str = "rev_merged";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("manifest must have exactly 3 lines, found {0}")]
    LineCount(usize),
    #[error("manifest line {0} is empty")]
    EmptyLine(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub path: PathBuf,
    /// Resolved revision directories.
    pub revisions: Revisions<PathBuf>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self, ManifestError> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.len() != 3 {
            return Err(ManifestError::LineCount(lines.len()));
        }
        if let Some(i) = lines.iter().position(|l| l.trim().is_empty()) {
            return Err(ManifestError::EmptyLine(i + 1));
        }

        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        let resolve = |line: &str| dir.join(line.trim());
        Ok(Self {
            path: path.to_path_buf(),
            revisions: Revisions::new(resolve(lines[0]), resolve(lines[1]), resolve(lines[2])),
        })
    }

    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    pub fn merged_dir(&self) -> PathBuf {
        self.dir().join(MERGED_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolves_against_parent() {
        let manifest = Manifest::parse(
            Path::new("/work/scenario/rev.revisions"),
            "rev_left\r\nrev_base\r\nrev_right\r\n",
        )
        .unwrap();
        assert_eq!(manifest.revisions.left, Path::new("/work/scenario/rev_left"));
        assert_eq!(manifest.revisions.base, Path::new("/work/scenario/rev_base"));
        assert_eq!(manifest.revisions.right, Path::new("/work/scenario/rev_right"));
        assert_eq!(manifest.merged_dir(), Path::new("/work/scenario/rev_merged"));
    }

    #[test]
    fn test_wrong_line_count() {
        let err = Manifest::parse(Path::new("m.revisions"), "a\nb\n").unwrap_err();
        assert!(matches!(err, ManifestError::LineCount(2)));
        let err = Manifest::parse(Path::new("m.revisions"), "a\nb\nc\nd\n").unwrap_err();
        assert!(matches!(err, ManifestError::LineCount(4)));
    }

    #[test]
    fn test_empty_line() {
        let err = Manifest::parse(Path::new("m.revisions"), "a\n  \nc\n").unwrap_err();
        assert!(matches!(err, ManifestError::EmptyLine(2)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::load(&dir.path().join("none.revisions")).unwrap_err();
        assert!(matches!(err, ManifestError::Read { .. }));
    }
}
