//! Conflict records and their inline marker rendering.
//!
//! Both engines report conflicts through the same [`Conflict`] type. The
//! textual engine scopes them to line ranges, the structural engine to the
//! smallest enclosing declaration.

use std::fmt;
use std::ops::Range;

use crate::types::Revisions;

/// What kind of divergence produced a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// Overlapping line edits found by diff3.
    Textual,
    /// The same declaration was modified differently on both sides.
    BothModified,
    /// Both sides added a declaration with the same identity but different content.
    BothAdded,
    /// One side deleted a declaration the other side modified.
    DeleteModify,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::Textual => "textual",
            ConflictKind::BothModified => "both-modified",
            ConflictKind::BothAdded => "both-added",
            ConflictKind::DeleteModify => "delete-modify",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a conflict sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictLocation {
    /// A declaration, named by its qualified path (e.g. `Foo.bar(int)`).
    Node { path: String },
    /// 1-based, end-exclusive line ranges in each revision.
    Lines { ranges: Revisions<Range<usize>> },
}

impl fmt::Display for ConflictLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictLocation::Node { path } => write!(f, "{path}"),
            ConflictLocation::Lines { ranges } => write!(
                f,
                "left {}..{}, base {}..{}, right {}..{}",
                ranges.left.start,
                ranges.left.end,
                ranges.base.start,
                ranges.base.end,
                ranges.right.start,
                ranges.right.end
            ),
        }
    }
}

/// A single conflict. Contents are verbatim; `None` means the side does not
/// have the conflicting element at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub location: ConflictLocation,
    pub left: Option<String>,
    pub base: Option<String>,
    pub right: Option<String>,
}

impl Conflict {
    /// Number of lines the conflict spans on the side that has the most.
    pub fn line_count(&self) -> usize {
        [&self.left, &self.base, &self.right]
            .into_iter()
            .flatten()
            .map(|s| s.lines().count())
            .max()
            .unwrap_or(0)
    }
}

/// Marker labels and whether the base section is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerStyle {
    pub left_label: String,
    pub base_label: String,
    pub right_label: String,
    pub show_base: bool,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            left_label: "LEFT".into(),
            base_label: "BASE".into(),
            right_label: "RIGHT".into(),
            show_base: true,
        }
    }
}

pub const LEFT_MARKER: &str = "<<<<<<<";
pub const BASE_MARKER: &str = "|||||||";
pub const SEPARATOR_MARKER: &str = "=======";
pub const RIGHT_MARKER: &str = ">>>>>>>";

impl MarkerStyle {
    /// Format a git-style conflict marker block. Absent sides render as
    /// empty sections.
    pub fn render(&self, left: Option<&str>, base: Option<&str>, right: Option<&str>) -> String {
        let mut out = String::new();
        out.push_str(&format!("{LEFT_MARKER} {}\n", self.left_label));
        push_block(&mut out, left.unwrap_or(""));
        if self.show_base {
            out.push_str(&format!("{BASE_MARKER} {}\n", self.base_label));
            push_block(&mut out, base.unwrap_or(""));
        }
        out.push_str(SEPARATOR_MARKER);
        out.push('\n');
        push_block(&mut out, right.unwrap_or(""));
        out.push_str(&format!("{RIGHT_MARKER} {}\n", self.right_label));
        out
    }

    pub fn render_lines(&self, left: &[String], base: &[String], right: &[String]) -> String {
        self.render(
            Some(&left.concat()),
            Some(&base.concat()),
            Some(&right.concat()),
        )
    }
}

fn push_block(out: &mut String, block: &str) {
    out.push_str(block);
    if !block.is_empty() && !block.ends_with('\n') {
        out.push('\n');
    }
}

/// Count the conflict blocks in rendered text.
pub fn count_conflict_markers(text: &str) -> usize {
    text.lines().filter(|l| l.starts_with(LEFT_MARKER)).count()
}
