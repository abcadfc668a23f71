//! Per-file merge orchestration.
//!
//! The textual engine always runs as the baseline. The structural engine is
//! attempted next and its output is preferred when available; when it
//! declines, the textual output is used and the degradation is logged. Only
//! cancellation aborts a file merge.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::amalgamator::{StructuralOutcome, UnavailableReason, try_structural_merge};
use crate::cancel::CancelToken;
use crate::conflict::{Conflict, MarkerStyle};
use crate::diff3::{TextualOutput, merge_files};
use crate::error::MergeError;
use crate::types::{Language, MergeStrategy, Revisions};

/// Configuration for the per-file pipeline.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Attempt the structural engine. When off, every file is merged textually.
    pub structural: bool,
    pub style: MarkerStyle,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            structural: true,
            style: MarkerStyle::default(),
        }
    }
}

/// Counters derived from one file merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeCounters {
    pub textual_conflicts: usize,
    pub textual_conflicting_lines: usize,
    pub structural_conflicts: usize,
    pub structural_conflicting_lines: usize,
    /// Structural decisions by kind.
    pub decisions: BTreeMap<&'static str, usize>,
}

#[derive(Debug, Clone)]
pub struct FileMergeResult {
    pub language: Option<Language>,
    /// Baseline output; `None` when the merge was short-circuited.
    pub textual: Option<TextualOutput>,
    /// `None` when not attempted.
    pub structural: Option<StructuralOutcome>,
    pub strategy: MergeStrategy,
    pub degradation: Option<UnavailableReason>,
    /// Final merged content; `None` means the file does not exist after the merge.
    pub output: Option<String>,
    pub conflicts: Vec<Conflict>,
    pub counters: MergeCounters,
}

impl FileMergeResult {
    fn unchanged(language: Option<Language>, output: Option<String>) -> Self {
        Self {
            language,
            textual: None,
            structural: None,
            strategy: MergeStrategy::Unchanged,
            degradation: None,
            output,
            conflicts: Vec::new(),
            counters: MergeCounters::default(),
        }
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn is_degraded(&self) -> bool {
        self.degradation.is_some()
    }
}

pub struct FileMerger {
    config: MergeConfig,
}

impl FileMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Merge one file given its three (optionally absent) contents.
    pub fn merge(
        &self,
        contents: &Revisions<Option<String>>,
        language: Option<Language>,
        cancel: &CancelToken,
    ) -> Result<FileMergeResult, MergeError> {
        if cancel.is_cancelled() {
            return Err(MergeError::Cancelled);
        }

        let refs = contents.as_refs().map(Option::as_deref);
        if let Some(output) = short_circuit(&refs) {
            debug!("no merge needed");
            return Ok(FileMergeResult::unchanged(language, output));
        }

        let style = &self.config.style;
        let textual = merge_files(&refs, style, cancel)?;
        let structural = match language {
            Some(lang) if self.config.structural => {
                Some(try_structural_merge(&refs, Some(lang), style, cancel)?)
            }
            _ => None,
        };

        let mut counters = MergeCounters {
            textual_conflicts: textual.conflicts.len(),
            textual_conflicting_lines: textual.conflicting_lines(),
            ..MergeCounters::default()
        };

        let (strategy, degradation, output, conflicts) = match &structural {
            Some(StructuralOutcome::Merged(out)) => {
                counters.structural_conflicts = out.conflicts.len();
                counters.structural_conflicting_lines =
                    out.conflicts.iter().map(Conflict::line_count).sum();
                for (_, decision) in &out.decisions {
                    *counters.decisions.entry(decision.as_str()).or_default() += 1;
                }
                (
                    MergeStrategy::Structural,
                    None,
                    out.text.clone(),
                    out.conflicts.clone(),
                )
            }
            Some(StructuralOutcome::Unavailable(reason)) => {
                warn!(
                    language = ?language,
                    %reason,
                    "structural merge unavailable, falling back to textual merge"
                );
                (
                    MergeStrategy::Textual,
                    Some(reason.clone()),
                    Some(textual.text.clone()),
                    textual.conflicts.clone(),
                )
            }
            None => (
                MergeStrategy::Textual,
                None,
                Some(textual.text.clone()),
                textual.conflicts.clone(),
            ),
        };

        debug!(
            strategy = %strategy,
            conflicts = conflicts.len(),
            "file merged"
        );

        Ok(FileMergeResult {
            language,
            textual: Some(textual),
            structural,
            strategy,
            degradation,
            output,
            conflicts,
            counters,
        })
    }
}

/// Result of a merge that needs no engine: one side is unchanged, or both
/// sides agree.
fn short_circuit(contents: &Revisions<Option<&str>>) -> Option<Option<String>> {
    if contents.left == contents.base {
        Some(contents.right.map(str::to_string))
    } else if contents.right == contents.base || contents.left == contents.right {
        Some(contents.left.map(str::to_string))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff3::merge_texts;

    fn revs(left: Option<&str>, base: Option<&str>, right: Option<&str>) -> Revisions<Option<String>> {
        Revisions::new(left, base, right).map(|s| s.map(str::to_string))
    }

    fn merger() -> FileMerger {
        FileMerger::new(MergeConfig::default())
    }

    #[test]
    fn test_identity() {
        let text = "class A {\n    int f() { return 1; }\n}\n";
        let result = merger()
            .merge(&revs(Some(text), Some(text), Some(text)), Some(Language::Java), &CancelToken::new())
            .unwrap();
        assert_eq!(result.strategy, MergeStrategy::Unchanged);
        assert_eq!(result.output.as_deref(), Some(text));
        assert!(!result.has_conflicts());
    }

    #[test]
    fn test_one_sided_change_passes_through() {
        let base = "not { valid java";
        let right = "still { not valid";
        let result = merger()
            .merge(&revs(Some(base), Some(base), Some(right)), Some(Language::Java), &CancelToken::new())
            .unwrap();
        assert_eq!(result.output.as_deref(), Some(right));

        let result = merger()
            .merge(&revs(Some(right), Some(base), Some(base)), Some(Language::Java), &CancelToken::new())
            .unwrap();
        assert_eq!(result.output.as_deref(), Some(right));
    }

    #[test]
    fn test_agreed_deletion() {
        let result = merger()
            .merge(&revs(None, Some("a\n"), None), None, &CancelToken::new())
            .unwrap();
        assert_eq!(result.output, None);
        assert_eq!(result.strategy, MergeStrategy::Unchanged);
    }

    #[test]
    fn test_structural_preferred() {
        let base = "class A {\n    int x = 1;\n\n    int y = 1;\n}\n";
        let left = "class A {\n    int x = 2;\n\n    int y = 1;\n}\n";
        let right = "class A {\n    int x = 3;\n\n    int y = 1;\n}\n";
        let result = merger()
            .merge(&revs(Some(left), Some(base), Some(right)), Some(Language::Java), &CancelToken::new())
            .unwrap();
        assert_eq!(result.strategy, MergeStrategy::Structural);
        assert!(!result.is_degraded());
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.counters.structural_conflicts, 1);
        assert_eq!(result.counters.textual_conflicts, 1);
        assert_eq!(result.counters.decisions.get("both-modified-conflict"), Some(&1));
    }

    #[test]
    fn test_fallback_matches_textual_output() {
        let base = "class A {\n    int x = 1;\n";
        let left = "class A {\n    int x = 2;\n";
        let right = "class A {\n    int x = 3;\n";
        let result = merger()
            .merge(&revs(Some(left), Some(base), Some(right)), Some(Language::Java), &CancelToken::new())
            .unwrap();
        assert_eq!(result.strategy, MergeStrategy::Textual);
        assert!(result.is_degraded());

        let textual = merge_texts(
            &Revisions::new(left, base, right),
            &MarkerStyle::default(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(result.output.as_deref(), Some(textual.text.as_str()));
        assert_eq!(result.conflicts, textual.conflicts);
    }

    #[test]
    fn test_unknown_language_is_textual_without_degradation() {
        let result = merger()
            .merge(&revs(Some("a\nB\nc\n"), Some("a\nb\nc\n"), Some("a\nb\nC\n")), None, &CancelToken::new())
            .unwrap();
        assert_eq!(result.strategy, MergeStrategy::Textual);
        assert!(result.structural.is_none());
        assert!(!result.is_degraded());
        assert_eq!(result.output.as_deref(), Some("a\nB\nC\n"));
    }

    #[test]
    fn test_structural_disabled() {
        let merger = FileMerger::new(MergeConfig {
            structural: false,
            ..MergeConfig::default()
        });
        let base = "class A {\n    int x = 1;\n}\n";
        let left = "class A {\n    int x = 2;\n}\n";
        let right = "class A {\n    int x = 3;\n}\n";
        let result = merger
            .merge(&revs(Some(left), Some(base), Some(right)), Some(Language::Java), &CancelToken::new())
            .unwrap();
        assert_eq!(result.strategy, MergeStrategy::Textual);
        assert!(result.structural.is_none());
    }

    #[test]
    fn test_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let err = merger()
            .merge(&revs(Some("a"), Some("b"), Some("c")), None, &token)
            .unwrap_err();
        assert_eq!(err, MergeError::Cancelled);
    }
}
