//! Core types shared by both merge engines.
//!
//! A merge always looks at three revisions of the same logical unit:
//! - **left** (mine)
//! - **base** (the common ancestor)
//! - **right** (yours)
//!
//! Any of them may be absent, which means "intentionally does not exist in
//! that revision". Absence is modelled as `Option::None` and is never the
//! same thing as an empty file.

use std::fmt;
use std::path::Path;

/// One of the three roles a revision plays in a three-way merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Side {
    Left,
    Base,
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Base => "base",
            Side::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three revisions of a merge: left, base and right.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Revisions<T> {
    pub left: T,
    pub base: T,
    pub right: T,
}

impl<T> Revisions<T> {
    pub fn new(left: T, base: T, right: T) -> Self {
        Self { left, base, right }
    }

    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::Left => &self.left,
            Side::Base => &self.base,
            Side::Right => &self.right,
        }
    }

    pub fn as_refs(&self) -> Revisions<&T> {
        Revisions::new(&self.left, &self.base, &self.right)
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Revisions<U> {
        Revisions::new(f(self.left), f(self.base), f(self.right))
    }

    /// Like [`Revisions::map`], stopping at the first error.
    pub fn try_map<U, E>(
        self,
        mut f: impl FnMut(Side, T) -> Result<U, E>,
    ) -> Result<Revisions<U>, E> {
        Ok(Revisions::new(
            f(Side::Left, self.left)?,
            f(Side::Base, self.base)?,
            f(Side::Right, self.right)?,
        ))
    }

    /// Iterate in left, base, right order.
    pub fn iter(&self) -> impl Iterator<Item = (Side, &T)> {
        [
            (Side::Left, &self.left),
            (Side::Base, &self.base),
            (Side::Right, &self.right),
        ]
        .into_iter()
    }
}

impl<T> Revisions<Option<T>> {
    /// Number of revisions that are present.
    pub fn present_count(&self) -> usize {
        self.iter().filter(|(_, v)| v.is_some()).count()
    }
}

/// Supported programming languages for tree-sitter parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    Java,
    Rust,
    JavaScript,
    TypeScript,
    Python,
    Go,
    C,
    Cpp,
}

impl Language {
    pub const ALL: [Language; 8] = [
        Language::Java,
        Language::Rust,
        Language::JavaScript,
        Language::TypeScript,
        Language::Python,
        Language::Go,
        Language::C,
        Language::Cpp,
    ];

    /// Infer language from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "java" => Some(Language::Java),
            "rs" => Some(Language::Rust),
            "js" | "mjs" | "cjs" | "jsx" => Some(Language::JavaScript),
            "ts" | "tsx" => Some(Language::TypeScript),
            "py" => Some(Language::Python),
            "go" => Some(Language::Go),
            "c" | "h" => Some(Language::C),
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" => Some(Language::Cpp),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        Self::from_extension(path.extension()?.to_str()?)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Java => "java",
            Language::Rust => "rust",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Python => "python",
            Language::Go => "go",
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A text-level hunk from diff3. Every line keeps its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diff3Hunk {
    /// All three versions agree.
    Stable(Vec<String>),
    /// Only left changed from base.
    LeftChanged(Vec<String>),
    /// Only right changed from base.
    RightChanged(Vec<String>),
    /// Both changed, to the same result.
    BothChanged(Vec<String>),
    /// Both changed differently.
    Conflict {
        left: Vec<String>,
        base: Vec<String>,
        right: Vec<String>,
        /// 0-based line offsets where each block starts in its revision.
        starts: Revisions<usize>,
    },
}

/// Classification of one aligned node across the three revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeDecision {
    Unchanged,
    LeftAdded,
    RightAdded,
    /// Both sides added the node; `conflict` is set when the additions
    /// could not be combined.
    BothAdded { conflict: bool },
    BothDeleted,
    /// One side deleted an otherwise unchanged node.
    Deleted { by: Side },
    LeftModified,
    RightModified,
    /// Both sides changed the node. `identical` when they agree,
    /// otherwise `conflict` tells whether the finer merge failed.
    BothModified { identical: bool, conflict: bool },
    DeleteModify { deleted_by: Side },
}

impl MergeDecision {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            MergeDecision::BothAdded { conflict: true }
                | MergeDecision::BothModified { conflict: true, .. }
                | MergeDecision::DeleteModify { .. }
        )
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, MergeDecision::Unchanged)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeDecision::Unchanged => "unchanged",
            MergeDecision::LeftAdded => "left-added",
            MergeDecision::RightAdded => "right-added",
            MergeDecision::BothAdded { conflict: false } => "both-added",
            MergeDecision::BothAdded { conflict: true } => "both-added-conflict",
            MergeDecision::BothDeleted => "both-deleted",
            MergeDecision::Deleted { .. } => "deleted",
            MergeDecision::LeftModified => "left-modified",
            MergeDecision::RightModified => "right-modified",
            MergeDecision::BothModified { identical: true, .. } => "both-modified-identical",
            MergeDecision::BothModified { conflict: false, .. } => "both-modified-merged",
            MergeDecision::BothModified { conflict: true, .. } => "both-modified-conflict",
            MergeDecision::DeleteModify { .. } => "delete-modify-conflict",
        }
    }
}

impl fmt::Display for MergeDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which strategy produced the final output of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeStrategy {
    /// No merge was needed; one revision was taken as is.
    Unchanged,
    /// Line-based diff3.
    Textual,
    /// Declaration-level structural merge.
    Structural,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Unchanged => "unchanged",
            MergeStrategy::Textual => "textual",
            MergeStrategy::Structural => "structural",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
