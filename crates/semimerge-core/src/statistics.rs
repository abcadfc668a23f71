use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use semimerge_engine::{count_conflict_markers, FileMergeResult, MergeStrategy};
use serde::{Deserialize, Serialize};

use crate::files::FilesTriple;
use crate::scenario::Scenario;

pub const STATISTICS_FILE: &str = "statistics.jsonl";

/// Aggregate counts over completed merges. Read-only consumer of results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub label: String,
    pub recorded_at: DateTime<Utc>,
    pub files: usize,
    /// Files that needed an engine.
    pub merged: usize,
    pub unchanged: usize,
    pub structural: usize,
    pub textual: usize,
    /// Files where the structural engine was tried but declined.
    pub degraded: usize,
    pub errors: usize,
    pub files_with_conflicts: usize,
    pub conflicts: usize,
    pub textual_conflicts: usize,
    pub textual_conflicting_lines: usize,
    pub structural_conflicts: usize,
    pub structural_conflicting_lines: usize,
    /// Conflict blocks present in the final outputs.
    pub conflict_markers: usize,
    pub decisions: BTreeMap<String, usize>,
}

impl Statistics {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            recorded_at: Utc::now(),
            ..Self::default()
        }
    }

    pub fn from_scenario(scenario: &Scenario) -> Self {
        let mut stats = Self::new(scenario.name());
        for triple in &scenario.triples {
            stats.record_triple(triple);
        }
        stats
    }

    pub fn record_triple(&mut self, triple: &FilesTriple) {
        match &triple.result {
            Some(result) => self.record(result),
            None if triple.error.is_some() => {
                self.files += 1;
                self.errors += 1;
            }
            None => {}
        }
    }

    pub fn record(&mut self, result: &FileMergeResult) {
        self.files += 1;
        match result.strategy {
            MergeStrategy::Unchanged => self.unchanged += 1,
            MergeStrategy::Structural => {
                self.merged += 1;
                self.structural += 1;
            }
            MergeStrategy::Textual => {
                self.merged += 1;
                self.textual += 1;
            }
        }
        if result.is_degraded() {
            self.degraded += 1;
        }
        if result.has_conflicts() {
            self.files_with_conflicts += 1;
        }
        self.conflicts += result.conflicts.len();

        let counters = &result.counters;
        self.textual_conflicts += counters.textual_conflicts;
        self.textual_conflicting_lines += counters.textual_conflicting_lines;
        self.structural_conflicts += counters.structural_conflicts;
        self.structural_conflicting_lines += counters.structural_conflicting_lines;
        for (decision, n) in &counters.decisions {
            *self.decisions.entry((*decision).to_string()).or_default() += n;
        }

        if let Some(text) = &result.output {
            self.conflict_markers += count_conflict_markers(text);
        }
    }

    /// Append as one JSON line to `path`, creating the file if needed.
    pub fn append_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", serde_json::to_string(self)?)?;
        Ok(())
    }

    /// Read back every recorded line, skipping ones that no longer parse.
    pub fn read_all(path: &Path) -> anyhow::Result<Vec<Self>> {
        let content = std::fs::read_to_string(path)?;
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    pub fn summary(&self) -> String {
        format!(
            "{} files ({} merged, {} unchanged): {} structural, {} textual, {} degraded, {} errors; {} conflicts in {} files",
            self.files,
            self.merged,
            self.unchanged,
            self.structural,
            self.textual,
            self.degraded,
            self.errors,
            self.conflicts,
            self.files_with_conflicts
        )
    }
}
