//! Three-way text merge (diff3 algorithm).
//!
//! This is the baseline merge strategy and the universal fallback. Lines of
//! left and right are aligned against base independently using the `similar`
//! crate (Myers shortest edit script, i.e. a longest-common-subsequence
//! alignment). The matched base regions common to both alignments are the
//! *sync regions*; everything between two sync regions is an unstable chunk
//! which is classified as a one-sided change, an identical change, or a
//! conflict.
//!
//! Unlike GNU diff3, a chunk both sides touched is split further: when the
//! base lines left changed and the base lines right changed do not overlap,
//! both edits are applied. An insertion touching the other side's edit
//! counts as overlapping.
//!
//! References:
//! - Khanna, Kuber, Pierce (2007), "A Formal Investigation of Diff3"
//! - GNU diff3 implementation

use std::ops::Range;

use similar::{Algorithm, DiffOp, DiffTag, capture_diff_slices};

use crate::cancel::CancelToken;
use crate::conflict::{Conflict, ConflictKind, ConflictLocation, MarkerStyle};
use crate::error::MergeError;
use crate::types::{Diff3Hunk, Revisions};

/// How many base lines are scanned between two cancellation checks.
const CANCEL_POLL_LINES: usize = 4096;

/// Output of a textual merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextualOutput {
    /// Merged text with conflict markers embedded.
    pub text: String,
    pub conflicts: Vec<Conflict>,
}

impl TextualOutput {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn conflicting_lines(&self) -> usize {
        self.conflicts.iter().map(Conflict::line_count).sum()
    }
}

/// Split text into lines, keeping each line's terminator.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Run a three-way merge on line-level text.
///
/// Returns a sequence of hunks covering the whole of every revision.
pub fn diff3_hunks(
    texts: &Revisions<&str>,
    cancel: &CancelToken,
) -> Result<Vec<Diff3Hunk>, MergeError> {
    if cancel.is_cancelled() {
        return Err(MergeError::Cancelled);
    }

    let base = split_lines(texts.base);
    let left = split_lines(texts.left);
    let right = split_lines(texts.right);

    let left_blocks = matching_blocks(&base, &left);
    let right_blocks = matching_blocks(&base, &right);
    let regions = sync_regions(&left_blocks, &right_blocks, base.len(), left.len(), right.len());

    let mut hunks = Vec::new();
    let (mut zb, mut zl, mut zr) = (0usize, 0usize, 0usize);
    let mut scanned = 0usize;

    for region in regions {
        scanned += region.base_end - zb;
        if scanned >= CANCEL_POLL_LINES {
            scanned = 0;
            if cancel.is_cancelled() {
                return Err(MergeError::Cancelled);
            }
        }

        let base_chunk = &base[zb..region.base_start];
        let left_chunk = &left[zl..region.left_start];
        let right_chunk = &right[zr..region.right_start];

        if !(base_chunk.is_empty() && left_chunk.is_empty() && right_chunk.is_empty()) {
            let left_same = left_chunk == base_chunk;
            let right_same = right_chunk == base_chunk;

            if left_same && right_same {
                hunks.push(Diff3Hunk::Stable(owned(base_chunk)));
            } else if left_chunk == right_chunk {
                hunks.push(Diff3Hunk::BothChanged(owned(left_chunk)));
            } else if left_same {
                hunks.push(Diff3Hunk::RightChanged(owned(right_chunk)));
            } else if right_same {
                hunks.push(Diff3Hunk::LeftChanged(owned(left_chunk)));
            } else if let Some(split) = split_chunk(base_chunk, left_chunk, right_chunk) {
                hunks.extend(split);
            } else {
                hunks.push(Diff3Hunk::Conflict {
                    left: owned(left_chunk),
                    base: owned(base_chunk),
                    right: owned(right_chunk),
                    starts: Revisions::new(zl, zb, zr),
                });
            }
        }

        let len = region.base_end - region.base_start;
        if len > 0 {
            hunks.push(Diff3Hunk::Stable(owned(&base[region.base_start..region.base_end])));
        }

        zb = region.base_end;
        zl = region.left_start + len;
        zr = region.right_start + len;
    }

    Ok(coalesce_hunks(hunks))
}

/// Perform a full three-way merge, embedding conflict markers for every
/// conflicting hunk.
pub fn merge_texts(
    texts: &Revisions<&str>,
    style: &MarkerStyle,
    cancel: &CancelToken,
) -> Result<TextualOutput, MergeError> {
    let hunks = diff3_hunks(texts, cancel)?;

    let mut text = String::new();
    let mut conflicts = Vec::new();

    for hunk in hunks {
        match hunk {
            Diff3Hunk::Stable(lines)
            | Diff3Hunk::LeftChanged(lines)
            | Diff3Hunk::RightChanged(lines)
            | Diff3Hunk::BothChanged(lines) => {
                for line in &lines {
                    text.push_str(line);
                }
            }
            Diff3Hunk::Conflict {
                left,
                base,
                right,
                starts,
            } => {
                // A conflict block must start on a fresh line.
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&style.render_lines(&left, &base, &right));
                conflicts.push(hunk_conflict(&left, &base, &right, &starts));
            }
        }
    }

    Ok(TextualOutput { text, conflicts })
}

/// Merge three whole-file contents where any side may be absent. An absent
/// side is merged as empty text.
pub fn merge_files(
    contents: &Revisions<Option<&str>>,
    style: &MarkerStyle,
    cancel: &CancelToken,
) -> Result<TextualOutput, MergeError> {
    let texts = Revisions::new(
        contents.left.unwrap_or(""),
        contents.base.unwrap_or(""),
        contents.right.unwrap_or(""),
    );
    merge_texts(&texts, style, cancel)
}

fn hunk_conflict(
    left: &[String],
    base: &[String],
    right: &[String],
    starts: &Revisions<usize>,
) -> Conflict {
    let range = |start: usize, len: usize| (start + 1)..(start + 1 + len);
    Conflict {
        kind: ConflictKind::Textual,
        location: ConflictLocation::Lines {
            ranges: Revisions::new(
                range(starts.left, left.len()),
                range(starts.base, base.len()),
                range(starts.right, right.len()),
            ),
        },
        left: Some(left.concat()),
        base: if base.is_empty() {
            None
        } else {
            Some(base.concat())
        },
        right: Some(right.concat()),
    }
}

fn owned(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| (*l).to_string()).collect()
}

/// Matched runs between base and another revision: `(base_index, other_index, len)`.
fn matching_blocks(base: &[&str], other: &[&str]) -> Vec<(usize, usize, usize)> {
    capture_diff_slices(Algorithm::Myers, base, other)
        .into_iter()
        .filter_map(|op| match op {
            DiffOp::Equal {
                old_index,
                new_index,
                len,
            } if len > 0 => Some((old_index, new_index, len)),
            _ => None,
        })
        .collect()
}

/// Apply both sides' edits to a chunk when they touch disjoint base lines.
/// `None` when any left edit overlaps a right edit.
fn split_chunk(base: &[&str], left: &[&str], right: &[&str]) -> Option<Vec<Diff3Hunk>> {
    let left_edits = chunk_edits(base, left);
    let right_edits = chunk_edits(base, right);
    if left_edits
        .iter()
        .any(|(l, _)| right_edits.iter().any(|(r, _)| overlaps(l, r)))
    {
        return None;
    }

    let mut edits: Vec<(Range<usize>, Diff3Hunk)> = left_edits
        .into_iter()
        .map(|(b, l)| (b, Diff3Hunk::LeftChanged(owned(&left[l]))))
        .chain(
            right_edits
                .into_iter()
                .map(|(b, r)| (b, Diff3Hunk::RightChanged(owned(&right[r])))),
        )
        .collect();
    edits.sort_by_key(|(b, _)| b.start);

    let mut hunks = Vec::with_capacity(edits.len() * 2 + 1);
    let mut at = 0;
    for (range, hunk) in edits {
        if range.start > at {
            hunks.push(Diff3Hunk::Stable(owned(&base[at..range.start])));
        }
        hunks.push(hunk);
        at = range.end;
    }
    if at < base.len() {
        hunks.push(Diff3Hunk::Stable(owned(&base[at..])));
    }
    Some(hunks)
}

/// Maximal runs of non-equal ops between `base` and `other`, as
/// `(base range, other range)`.
fn chunk_edits(base: &[&str], other: &[&str]) -> Vec<(Range<usize>, Range<usize>)> {
    let mut edits: Vec<(Range<usize>, Range<usize>)> = Vec::new();
    let mut open = false;
    for op in capture_diff_slices(Algorithm::Myers, base, other) {
        let (tag, old, new) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            open = false;
            continue;
        }
        match edits.last_mut() {
            Some((o, n)) if open => {
                o.end = old.end;
                n.end = new.end;
            }
            _ => edits.push((old, new)),
        }
        open = true;
    }
    edits
}

/// Base ranges overlap; an empty range (an insertion) also overlaps a range
/// it touches.
fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    if a.is_empty() || b.is_empty() {
        a.start <= b.end && b.start <= a.end
    } else {
        a.start < b.end && b.start < a.end
    }
}

/// A run of base lines matched identically in both left and right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SyncRegion {
    base_start: usize,
    base_end: usize,
    left_start: usize,
    right_start: usize,
}

/// Intersect the base→left and base→right matchings. The returned list ends
/// with an empty sentinel region at the end of every revision.
fn sync_regions(
    left_blocks: &[(usize, usize, usize)],
    right_blocks: &[(usize, usize, usize)],
    base_len: usize,
    left_len: usize,
    right_len: usize,
) -> Vec<SyncRegion> {
    let mut regions = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < left_blocks.len() && j < right_blocks.len() {
        let (lb, lo, llen) = left_blocks[i];
        let (rb, ro, rlen) = right_blocks[j];

        let start = lb.max(rb);
        let end = (lb + llen).min(rb + rlen);
        if start < end {
            regions.push(SyncRegion {
                base_start: start,
                base_end: end,
                left_start: lo + (start - lb),
                right_start: ro + (start - rb),
            });
        }

        if lb + llen < rb + rlen {
            i += 1;
        } else {
            j += 1;
        }
    }

    regions.push(SyncRegion {
        base_start: base_len,
        base_end: base_len,
        left_start: left_len,
        right_start: right_len,
    });
    regions
}

fn coalesce_hunks(hunks: Vec<Diff3Hunk>) -> Vec<Diff3Hunk> {
    let mut result: Vec<Diff3Hunk> = Vec::new();
    for hunk in hunks {
        let rest = match result.last_mut() {
            Some(last) => absorb(last, hunk),
            None => Some(hunk),
        };
        if let Some(hunk) = rest {
            result.push(hunk);
        }
    }
    result
}

/// Append `hunk` to `last` when both are of the same kind; otherwise hand it back.
fn absorb(last: &mut Diff3Hunk, hunk: Diff3Hunk) -> Option<Diff3Hunk> {
    match (last, hunk) {
        (Diff3Hunk::Stable(existing), Diff3Hunk::Stable(new))
        | (Diff3Hunk::LeftChanged(existing), Diff3Hunk::LeftChanged(new))
        | (Diff3Hunk::RightChanged(existing), Diff3Hunk::RightChanged(new))
        | (Diff3Hunk::BothChanged(existing), Diff3Hunk::BothChanged(new)) => {
            existing.extend(new);
            None
        }
        (_, hunk) => Some(hunk),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge(left: &str, base: &str, right: &str) -> TextualOutput {
        merge_texts(
            &Revisions::new(left, base, right),
            &MarkerStyle::default(),
            &CancelToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_no_conflict() {
        let base = "line1\nline2\nline3\n";
        let left = "line1\nmodified_left\nline3\n";
        let right = "line1\nline2\nline3_right\n";
        let out = merge(left, base, right);
        assert!(!out.has_conflicts());
        assert_eq!(out.text, "line1\nmodified_left\nline3_right\n");
    }

    #[test]
    fn test_adjacent_one_sided_edits_merge() {
        let out = merge("a\nB\nc\nd\n", "a\nb\nc\nd\n", "a\nb\nC\nD\n");
        assert!(!out.has_conflicts());
        assert_eq!(out.text, "a\nB\nC\nD\n");
    }

    #[test]
    fn test_insertion_touching_other_edit_conflicts() {
        let out = merge("a\nB\nc\n", "a\nb\nc\n", "a\nb\nx\nc\n");
        assert_eq!(out.conflicts.len(), 1);
        assert_eq!(out.conflicts[0].base.as_deref(), Some("b\n"));
    }

    #[test]
    fn test_overlap_rules() {
        assert!(!overlaps(&(0..1), &(1..2)));
        assert!(overlaps(&(0..2), &(1..3)));
        assert!(overlaps(&(1..1), &(0..1)));
        assert!(overlaps(&(2..2), &(2..2)));
        assert!(!overlaps(&(0..0), &(1..2)));
    }

    #[test]
    fn test_identical_changes() {
        let base = "line1\nline2\n";
        let left = "line1\nchanged\n";
        let right = "line1\nchanged\n";
        let out = merge(left, base, right);
        assert!(!out.has_conflicts());
        assert_eq!(out.text, left);
    }

    #[test]
    fn test_conflict_detection() {
        let out = merge("b\n", "a\n", "c\n");
        assert_eq!(out.conflicts.len(), 1);
        let conflict = &out.conflicts[0];
        assert_eq!(conflict.kind, ConflictKind::Textual);
        assert_eq!(conflict.left.as_deref(), Some("b\n"));
        assert_eq!(conflict.base.as_deref(), Some("a\n"));
        assert_eq!(conflict.right.as_deref(), Some("c\n"));
        assert_eq!(
            out.text,
            "<<<<<<< LEFT\nb\n||||||| BASE\na\n=======\nc\n>>>>>>> RIGHT\n"
        );
    }

    #[test]
    fn test_identity() {
        let text = "fn a() {}\n\nfn b() {}";
        let out = merge(text, text, text);
        assert!(!out.has_conflicts());
        assert_eq!(out.text, text);
    }

    #[test]
    fn test_one_sided_change_passes_through() {
        let base = "a\nb\nc\n";
        let right = "a\nB\nc\nd";
        assert_eq!(merge(base, base, right).text, right);
        assert_eq!(merge(right, base, base).text, right);
    }

    #[test]
    fn test_conflict_line_ranges() {
        let base = "keep\nx = 1\nend\n";
        let left = "keep\nx = 2\nend\n";
        let right = "keep\nx = 3\nend\n";
        let out = merge(left, base, right);
        assert_eq!(out.conflicts.len(), 1);
        match &out.conflicts[0].location {
            ConflictLocation::Lines { ranges } => {
                assert_eq!(ranges.left, 2..3);
                assert_eq!(ranges.base, 2..3);
                assert_eq!(ranges.right, 2..3);
            }
            other => panic!("expected line location, got {other:?}"),
        }
        assert!(out.text.starts_with("keep\n<<<<<<< LEFT\nx = 2\n"));
        assert!(out.text.ends_with(">>>>>>> RIGHT\nend\n"));
    }

    #[test]
    fn test_both_insert_differently_at_same_place() {
        let out = merge("a\nleft\n", "a\n", "a\nright\n");
        assert_eq!(out.conflicts.len(), 1);
        assert_eq!(out.conflicts[0].base, None);
    }

    #[test]
    fn test_delete_against_unchanged() {
        let out = merge("a\nc\n", "a\nb\nc\n", "a\nb\nc\n");
        assert_eq!(out.text, "a\nc\n");
    }

    #[test]
    fn test_absent_sides_merge_as_empty() {
        let out = merge_files(
            &Revisions::new(Some("new\n"), None, None),
            &MarkerStyle::default(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(out.text, "new\n");
    }

    #[test]
    fn test_missing_final_newline_in_conflict() {
        let out = merge("x = 2", "x = 1", "x = 3");
        assert_eq!(out.conflicts.len(), 1);
        assert!(out.text.contains("x = 2\n||||||| BASE\nx = 1\n=======\nx = 3\n"));
    }

    #[test]
    fn test_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let err = merge_texts(&Revisions::new("a", "b", "c"), &MarkerStyle::default(), &token);
        assert!(matches!(err, Err(MergeError::Cancelled)));
    }

    #[test]
    fn test_hunks_cover_all_lines() {
        let hunks = diff3_hunks(
            &Revisions::new("a\nb\nc\n", "a\nb\nc\n", "a\nc\n"),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(
            hunks,
            vec![
                Diff3Hunk::Stable(vec!["a\n".into()]),
                Diff3Hunk::RightChanged(vec![]),
                Diff3Hunk::Stable(vec!["c\n".into()]),
            ]
        );
    }
}
