//! File triples: enumeration of three directory trees, validation, and a
//! read-once content cache.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use semimerge_engine::{FileMergeResult, Revisions};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum FilesError {
    #[error("{} exists but is not a regular file", path.display())]
    NotAFile { path: PathBuf },
    #[error("{} is not valid UTF-8", path.display())]
    NotUtf8 { path: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to list {}: {source}", root.display())]
    Walk {
        root: PathBuf,
        source: walkdir::Error,
    },
}

/// One file across the three revisions, plus its merge outcome once run.
#[derive(Debug, Clone)]
pub struct FilesTriple {
    /// Path relative to the revision roots; also used to pick the grammar.
    pub relative: PathBuf,
    /// `None` where the revision does not have the file.
    pub paths: Revisions<Option<PathBuf>>,
    pub result: Option<FileMergeResult>,
    /// Fatal error for this file, kept when the run continues past failures.
    pub error: Option<String>,
}

impl FilesTriple {
    pub fn new(relative: PathBuf, paths: Revisions<Option<PathBuf>>) -> Self {
        Self {
            relative,
            paths,
            result: None,
            error: None,
        }
    }

    /// A triple of explicit files. The relative path is the file name of the
    /// first present side.
    pub fn from_files(paths: Revisions<Option<PathBuf>>) -> Self {
        let relative = paths
            .iter()
            .find_map(|(_, p)| p.as_ref().and_then(|p| p.file_name()))
            .map(PathBuf::from)
            .unwrap_or_default();
        Self::new(relative, paths)
    }

    pub fn is_merged(&self) -> bool {
        self.result.is_some()
    }

    pub fn has_conflicts(&self) -> bool {
        self.result.as_ref().is_some_and(FileMergeResult::has_conflicts)
    }
}

/// Enumerate the union of files under three roots, sorted by relative path.
/// A root that does not exist contributes no files.
pub fn enumerate_triples(roots: &Revisions<PathBuf>) -> Result<Vec<FilesTriple>, FilesError> {
    let listed = roots.as_refs().try_map(|_, root| list_files(root))?;

    let all: BTreeSet<&PathBuf> = listed
        .iter()
        .flat_map(|(_, files)| files.iter())
        .collect();

    Ok(all
        .into_iter()
        .map(|relative| {
            let side = |files: &BTreeSet<PathBuf>, root: &Path| {
                files.contains(relative).then(|| root.join(relative))
            };
            let paths = Revisions::new(
                side(&listed.left, &roots.left),
                side(&listed.base, &roots.base),
                side(&listed.right, &roots.right),
            );
            FilesTriple::new(relative.clone(), paths)
        })
        .collect())
}

fn list_files(root: &Path) -> Result<BTreeSet<PathBuf>, FilesError> {
    let mut files = BTreeSet::new();
    if !root.exists() {
        return Ok(files);
    }

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| FilesError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            files.insert(relative.to_path_buf());
        }
    }

    Ok(files)
}

/// Read a source file, rejecting non-regular files and non-UTF-8 content.
pub fn read_source(path: &Path) -> Result<Arc<str>, FilesError> {
    let read_err = |source| FilesError::Read {
        path: path.to_path_buf(),
        source,
    };
    let meta = fs::metadata(path).map_err(read_err)?;
    if !meta.is_file() {
        return Err(FilesError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    let bytes = fs::read(path).map_err(read_err)?;
    let text = String::from_utf8(bytes).map_err(|_| FilesError::NotUtf8 {
        path: path.to_path_buf(),
    })?;
    Ok(Arc::from(text))
}

/// Reads each path at most once per run. Cheap to clone; clones share entries.
#[derive(Debug, Clone, Default)]
pub struct FileCache {
    entries: Arc<DashMap<PathBuf, Arc<str>>>,
}

impl FileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, path: &Path) -> Result<Arc<str>, FilesError> {
        if let Some(hit) = self.entries.get(path) {
            return Ok(hit.clone());
        }
        let content = read_source(path)?;
        self.entries.insert(path.to_path_buf(), content.clone());
        Ok(content)
    }

    /// Load the contents of a triple; absent sides stay absent.
    pub fn load(
        &self,
        paths: &Revisions<Option<PathBuf>>,
    ) -> Result<Revisions<Option<String>>, FilesError> {
        paths.as_refs().try_map(|_, path| {
            path.as_deref()
                .map(|p| self.read(p).map(|text| text.to_string()))
                .transpose()
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
