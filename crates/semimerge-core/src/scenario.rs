use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use semimerge_engine::{CancelToken, FileMergeResult, FileMerger, MergeError, Revisions};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::{FatalPolicy, MergeSettings, Settings};
use crate::files::{enumerate_triples, FileCache, FilesTriple};
use crate::manifest::{Manifest, MERGED_DIR};

/// All file triples of one directory-level merge.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Manifest the revisions came from, if any.
    pub manifest: Option<PathBuf>,
    pub roots: Revisions<PathBuf>,
    /// In enumeration order.
    pub triples: Vec<FilesTriple>,
}

impl Scenario {
    /// `left | base | right` directory names.
    pub fn name(&self) -> String {
        let name = |p: &Path| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        };
        format!(
            "{} | {} | {}",
            name(&self.roots.left),
            name(&self.roots.base),
            name(&self.roots.right)
        )
    }

    /// Where merged files go by default: `rev_merged` next to the manifest.
    pub fn output_dir(&self) -> Option<PathBuf> {
        let manifest = self.manifest.as_ref()?;
        Some(
            manifest
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(MERGED_DIR),
        )
    }

    pub fn conflicts(&self) -> usize {
        self.triples
            .iter()
            .filter_map(|t| t.result.as_ref())
            .map(|r| r.conflicts.len())
            .sum()
    }

    pub fn errors(&self) -> usize {
        self.triples.iter().filter(|t| t.error.is_some()).count()
    }
}

/// Runs file merges on a bounded pool of blocking workers.
#[derive(Clone)]
pub struct ScenarioRunner {
    merger: Arc<FileMerger>,
    merge: Arc<MergeSettings>,
    jobs: usize,
    policy: FatalPolicy,
    cache: FileCache,
    cancel: CancelToken,
}

impl ScenarioRunner {
    pub fn new(settings: &Settings, cancel: CancelToken) -> Self {
        Self {
            merger: Arc::new(FileMerger::new(settings.merge.merge_config())),
            merge: Arc::new(settings.merge.clone()),
            jobs: settings.run.jobs(),
            policy: settings.run.fatal_policy,
            cache: FileCache::new(),
            cancel,
        }
    }

    pub fn cache(&self) -> &FileCache {
        &self.cache
    }

    pub async fn run_manifest(&self, manifest: &Manifest) -> anyhow::Result<Scenario> {
        info!(manifest = %manifest.path.display(), "running revisions manifest");
        let mut scenario = self.run_dirs(manifest.revisions.clone()).await?;
        scenario.manifest = Some(manifest.path.clone());
        Ok(scenario)
    }

    pub async fn run_dirs(&self, roots: Revisions<PathBuf>) -> anyhow::Result<Scenario> {
        let listing = roots.clone();
        let triples = tokio::task::spawn_blocking(move || enumerate_triples(&listing))
            .await
            .context("file enumeration task failed")??;
        info!(
            files = triples.len(),
            left = %roots.left.display(),
            base = %roots.base.display(),
            right = %roots.right.display(),
            "scenario enumerated"
        );

        let triples = self.run_triples(triples).await?;
        Ok(Scenario {
            manifest: None,
            roots,
            triples,
        })
    }

    /// Merge every triple, returning them in input order with results filled in.
    pub async fn run_triples(&self, triples: Vec<FilesTriple>) -> anyhow::Result<Vec<FilesTriple>> {
        let semaphore = Arc::new(Semaphore::new(self.jobs.max(1)));
        let stop = CancelToken::new();
        let mut handles = Vec::with_capacity(triples.len());

        for triple in triples {
            if self.cancel.is_cancelled() {
                warn!("cancelled, not dispatching remaining files");
                break;
            }
            if stop.is_cancelled() {
                break;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .context("worker pool closed")?;
            let runner = self.clone();
            let stop = stop.clone();

            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let outcome = runner.merge_triple(&triple);
                if outcome.is_err() && runner.policy == FatalPolicy::Abort {
                    stop.cancel();
                }
                (triple, outcome)
            }));
        }

        let mut done = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for handle in handles {
            let (mut triple, outcome) = handle.await.context("merge task panicked")?;
            match outcome {
                Ok(result) => triple.result = Some(result),
                Err(e) => {
                    error!(path = %triple.relative.display(), error = ?e, "file merge failed");
                    triple.error = Some(format!("{e:#}"));
                    if self.policy == FatalPolicy::Abort && first_error.is_none() {
                        first_error =
                            Some(e.context(format!("failed to merge {}", triple.relative.display())));
                    }
                }
            }
            done.push(triple);
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if self.cancel.is_cancelled() {
            return Err(MergeError::Cancelled.into());
        }
        Ok(done)
    }

    /// Load and merge a single triple on the current thread.
    pub fn merge_triple(&self, triple: &FilesTriple) -> anyhow::Result<FileMergeResult> {
        let _span = tracing::info_span!("merge", path = %triple.relative.display()).entered();

        let contents = self.cache.load(&triple.paths)?;
        let language = self.merge.language_for(&triple.relative);
        let result = self.merger.merge(&contents, language, &self.cancel)?;

        info!(
            strategy = %result.strategy,
            conflicts = result.conflicts.len(),
            degraded = result.is_degraded(),
            "merged"
        );
        Ok(result)
    }
}
