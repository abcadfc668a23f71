//! # semimerge-engine
//!
//! Semistructured three-way merge of source files.
//!
//! ## Approach
//!
//! Each file is merged twice:
//!
//! 1. **Textual merge** ([`diff3`]): classic line-based diff3 over the
//!    whole file. Always computable; it is the baseline and the fallback.
//!
//! 2. **Structural merge** ([`amalgamator`]): the file is parsed with
//!    tree-sitter into a tree of declarations ([`parser`]). Declarations are
//!    aligned across revisions by identity signature ([`matcher`]), so
//!    reordering does not produce spurious conflicts, and merged one by one.
//!    Declarations that both sides changed are merged textually on their own
//!    text, which scopes any conflict to that declaration.
//!
//! [`FileMerger`] runs both and prefers the structural result whenever the
//! file could be parsed.
//!
//! ## Supported Languages
//!
//! Rust, JavaScript, TypeScript, Python, Java, Go, C, C++. Any other file is
//! merged textually.
//!
//! ## Example
//!
//! ```rust
//! use semimerge_engine::{CancelToken, FileMerger, Language, MergeConfig, Revisions};
//!
//! let merger = FileMerger::new(MergeConfig::default());
//! let contents = Revisions::new(
//!     Some("fn a() { 2 }\n\nfn b() { 1 }\n".to_string()),
//!     Some("fn a() { 1 }\n\nfn b() { 1 }\n".to_string()),
//!     Some("fn a() { 1 }\n\nfn b() { 3 }\n".to_string()),
//! );
//!
//! let result = merger
//!     .merge(&contents, Some(Language::Rust), &CancelToken::new())
//!     .unwrap();
//! assert!(!result.has_conflicts());
//! assert_eq!(result.output.as_deref(), Some("fn a() { 2 }\n\nfn b() { 3 }\n"));
//! ```

pub mod amalgamator;
pub mod cancel;
pub mod conflict;
pub mod diff3;
pub mod error;
mod grammar;
pub mod matcher;
pub mod merger;
pub mod parser;
pub mod types;

// Re-export primary public API
pub use amalgamator::{StructuralOutcome, StructuralOutput, UnavailableReason, try_structural_merge};
pub use cancel::CancelToken;
pub use conflict::{Conflict, ConflictKind, ConflictLocation, MarkerStyle, count_conflict_markers};
pub use diff3::{TextualOutput, merge_files, merge_texts};
pub use error::MergeError;
pub use merger::{FileMergeResult, FileMerger, MergeConfig, MergeCounters};
pub use parser::{BuildError, TreeNode, build_tree};
pub use types::{Language, MergeDecision, MergeStrategy, Revisions, Side};
