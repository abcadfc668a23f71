//! Rendering merge results to the console or to disk.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use semimerge_engine::FileMergeResult;

use crate::files::FilesTriple;
use crate::scenario::Scenario;

/// Printed in place of a file that does not exist after the merge.
pub const DELETED: &str = "<deleted>";

pub fn print_on_screen(result: &FileMergeResult) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    render_to(&mut out, result)
}

pub fn render_to(out: &mut impl Write, result: &FileMergeResult) -> anyhow::Result<()> {
    match &result.output {
        Some(text) => out.write_all(text.as_bytes())?,
        None => writeln!(out, "{DELETED}")?,
    }
    out.flush()?;
    Ok(())
}

/// Print every merged file of a scenario, each under a `==> path <==` header.
pub fn print_scenario(scenario: &Scenario) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for triple in &scenario.triples {
        if let Some(result) = &triple.result {
            writeln!(out, "==> {} <==", triple.relative.display())?;
            render_to(&mut out, result)?;
        }
    }
    Ok(())
}

/// Write the merged output to `path`, creating parent directories. A merge
/// whose result is "no file" writes nothing. Returns whether a file was written.
pub fn write_merged_file(result: &FileMergeResult, path: &Path) -> anyhow::Result<bool> {
    let Some(text) = &result.output else {
        return Ok(false);
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

/// Write one triple's merged output to `out_dir/<relative path>`.
pub fn write_tuple(out_dir: &Path, triple: &FilesTriple) -> anyhow::Result<bool> {
    match &triple.result {
        Some(result) => write_merged_file(result, &out_dir.join(&triple.relative)),
        None => Ok(false),
    }
}

/// Write every merged triple under `out_dir`. Returns the number of files written.
pub fn write_scenario(scenario: &Scenario, out_dir: &Path) -> anyhow::Result<usize> {
    let mut written = 0;
    for triple in &scenario.triples {
        if write_tuple(out_dir, triple)? {
            written += 1;
        }
    }
    tracing::info!(files = written, out = %out_dir.display(), "merged files written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use semimerge_engine::{CancelToken, FileMerger, MergeConfig, Revisions};

    fn merged(left: Option<&str>, base: Option<&str>, right: Option<&str>) -> FileMergeResult {
        FileMerger::new(MergeConfig::default())
            .merge(
                &Revisions::new(left, base, right).map(|s| s.map(str::to_string)),
                None,
                &CancelToken::new(),
            )
            .unwrap()
    }

    #[test]
    fn test_render_deleted() {
        let mut out = Vec::new();
        render_to(&mut out, &merged(None, Some("a\n"), None)).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "<deleted>\n");
    }

    #[test]
    fn test_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("out.txt");
        let result = merged(Some("new\n"), Some("old\n"), Some("old\n"));
        assert!(write_merged_file(&result, &path).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn test_deleted_result_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.txt");
        assert!(!write_merged_file(&merged(None, Some("a\n"), None), &path).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_write_tuple_uses_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut triple = FilesTriple::new("src/x.txt".into(), Revisions::default());
        triple.result = Some(merged(Some("x\n"), None, None));
        assert!(write_tuple(dir.path(), &triple).unwrap());
        assert_eq!(fs::read_to_string(dir.path().join("src/x.txt")).unwrap(), "x\n");
    }
}
