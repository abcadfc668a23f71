use thiserror::Error;

/// Errors that abort a merge. Structural failures are not errors: they are
/// reported as `StructuralOutcome::Unavailable` and absorbed by the
/// per-file orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("merge cancelled")]
    Cancelled,
}
