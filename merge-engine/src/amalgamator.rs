//! Structural three-way merge over aligned declaration trees.
//!
//! Every [`MatchSet`] gets exactly one [`MergeDecision`]:
//!
//! | left vs base | right vs base | decision |
//! |---|---|---|
//! | unchanged | unchanged | unchanged, keep base |
//! | unchanged | changed | right-modified, keep right |
//! | changed | unchanged | left-modified, keep left |
//! | changed | changed, same result | both-modified (identical), keep left |
//! | changed | changed, different | both-modified, merged further |
//! | absent | unchanged | deleted |
//! | absent | changed | delete-modify conflict |
//! | added | added, same | both-added, keep one |
//! | added | added, different | both-added, merged further |
//!
//! "Merged further" means recursion for containers and a diff3 run over the
//! node's own text for opaque nodes. A conflict is recorded once, on the
//! smallest node that could not be combined.
//!
//! The line breaks before a member are layout, not content. They are chosen
//! after the members are merged, from a revision in which the member follows
//! the same sibling it follows in the output.

use std::collections::HashMap;

use thiserror::Error;

use crate::cancel::CancelToken;
use crate::conflict::{Conflict, ConflictKind, ConflictLocation, LEFT_MARKER, MarkerStyle, RIGHT_MARKER};
use crate::diff3::merge_texts;
use crate::error::MergeError;
use crate::matcher::{AlignError, MatchSet, align};
use crate::parser::{BuildError, TreeNode, build_tree, same_trivia};
use crate::types::{Language, MergeDecision, Revisions, Side};

/// A piece of merged output text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub text: String,
    /// Ends with a marker line standing in for a line break that the next
    /// fragment still carries.
    pub closes_line: bool,
}

impl Fragment {
    fn plain(text: String) -> Self {
        Self {
            text,
            closes_line: false,
        }
    }

    fn from_merge(text: String, sides: &Revisions<&str>) -> Self {
        let ends_in_marker = text
            .lines()
            .last()
            .is_some_and(|l| l.starts_with(RIGHT_MARKER));
        let open_end = sides
            .iter()
            .any(|(_, s)| !s.is_empty() && !s.ends_with('\n'));
        Self {
            text,
            closes_line: ends_in_marker && open_end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergedBody {
    /// Not part of the merged output.
    Removed,
    Leaf(Fragment),
    /// `head` covers leading trivia plus the container header.
    Container {
        head: Fragment,
        children: Vec<MergedNode>,
        suffix: Fragment,
    },
}

/// A node of the merged tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedNode {
    pub signature: String,
    pub path: String,
    pub decision: MergeDecision,
    /// Complete lines before the node. The partial line (indentation) is
    /// part of the body.
    pub leading: String,
    pub body: MergedBody,
}

impl MergedNode {
    pub fn is_removed(&self) -> bool {
        matches!(self.body, MergedBody::Removed)
    }

    /// Serialize the merged tree. `None` when the node itself was removed.
    pub fn render(&self) -> Option<String> {
        if self.is_removed() {
            return None;
        }
        let mut writer = Writer::default();
        writer.node(self);
        Some(writer.out)
    }
}

#[derive(Default)]
struct Writer {
    out: String,
    swallow_newline: bool,
}

impl Writer {
    fn node(&mut self, node: &MergedNode) {
        if node.is_removed() {
            return;
        }
        self.push(&node.leading, false);
        match &node.body {
            MergedBody::Removed => {}
            MergedBody::Leaf(fragment) => self.fragment(fragment),
            MergedBody::Container {
                head,
                children,
                suffix,
            } => {
                self.fragment(head);
                for child in children {
                    self.node(child);
                }
                self.fragment(suffix);
            }
        }
    }

    fn fragment(&mut self, fragment: &Fragment) {
        self.push(&fragment.text, fragment.closes_line);
    }

    fn push(&mut self, mut text: &str, closes_line: bool) {
        if text.is_empty() {
            return;
        }
        if self.swallow_newline {
            text = text
                .strip_prefix("\r\n")
                .or_else(|| text.strip_prefix('\n'))
                .unwrap_or(text);
        }
        // conflict blocks start at column 0
        if text.starts_with(LEFT_MARKER) && !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        self.out.push_str(text);
        self.swallow_newline = closes_line;
    }
}

/// Why the structural engine declined a file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnavailableReason {
    #[error("no grammar for this file type")]
    NoLanguage,
    #[error("{side} revision is not parsable: {error}")]
    Parse { side: Side, error: BuildError },
    #[error("alignment failed: {0}")]
    Align(#[from] AlignError),
}

#[derive(Debug, Clone)]
pub struct StructuralOutput {
    pub tree: MergedNode,
    /// Merged text; `None` when the merge result is that the file does not exist.
    pub text: Option<String>,
    pub conflicts: Vec<Conflict>,
    /// Decision per match set, in pre-order.
    pub decisions: Vec<(String, MergeDecision)>,
}

#[derive(Debug, Clone)]
pub enum StructuralOutcome {
    Merged(StructuralOutput),
    Unavailable(UnavailableReason),
}

/// Merge three file contents structurally.
///
/// Unparsable input is reported as [`StructuralOutcome::Unavailable`], never
/// as an error; only cancellation is fatal.
pub fn try_structural_merge(
    contents: &Revisions<Option<&str>>,
    lang: Option<Language>,
    style: &MarkerStyle,
    cancel: &CancelToken,
) -> Result<StructuralOutcome, MergeError> {
    let Some(lang) = lang else {
        return Ok(StructuralOutcome::Unavailable(UnavailableReason::NoLanguage));
    };
    if cancel.is_cancelled() {
        return Err(MergeError::Cancelled);
    }

    let parsed = contents.clone().try_map(|side, text| {
        text.map(|t| build_tree(t, lang))
            .transpose()
            .map_err(|error| UnavailableReason::Parse { side, error })
    });
    let trees = match parsed {
        Ok(trees) => trees,
        Err(reason) => return Ok(StructuralOutcome::Unavailable(reason)),
    };
    let root = match align(trees.as_refs().map(Option::as_ref)) {
        Ok(root) => root,
        Err(e) => return Ok(StructuralOutcome::Unavailable(e.into())),
    };

    let mut amalgamator = Amalgamator {
        style,
        cancel,
        conflicts: Vec::new(),
        decisions: Vec::new(),
    };
    let tree = amalgamator.merge_set(&root)?;
    let text = tree.render();
    Ok(StructuralOutcome::Merged(StructuralOutput {
        tree,
        text,
        conflicts: amalgamator.conflicts,
        decisions: amalgamator.decisions,
    }))
}

/// Decision for a match set from content equality alone. Both-changed cases
/// come back with `conflict` set to "needs a finer merge".
pub fn classify(nodes: &Revisions<Option<&TreeNode>>) -> MergeDecision {
    match (nodes.left, nodes.base, nodes.right) {
        (Some(_), None, None) => MergeDecision::LeftAdded,
        (None, None, Some(_)) => MergeDecision::RightAdded,
        (Some(l), None, Some(r)) => MergeDecision::BothAdded {
            conflict: !l.same_content(r),
        },
        (None, _, None) => MergeDecision::BothDeleted,
        (None, Some(b), Some(r)) => {
            if b.same_content(r) {
                MergeDecision::Deleted { by: Side::Left }
            } else {
                MergeDecision::DeleteModify {
                    deleted_by: Side::Left,
                }
            }
        }
        (Some(l), Some(b), None) => {
            if b.same_content(l) {
                MergeDecision::Deleted { by: Side::Right }
            } else {
                MergeDecision::DeleteModify {
                    deleted_by: Side::Right,
                }
            }
        }
        (Some(l), Some(b), Some(r)) => match (!l.same_content(b), !r.same_content(b)) {
            (false, false) => MergeDecision::Unchanged,
            (true, false) => MergeDecision::LeftModified,
            (false, true) => MergeDecision::RightModified,
            (true, true) => {
                let identical = l.same_content(r);
                MergeDecision::BothModified {
                    identical,
                    conflict: !identical,
                }
            }
        },
    }
}

struct Amalgamator<'s> {
    style: &'s MarkerStyle,
    cancel: &'s CancelToken,
    conflicts: Vec<Conflict>,
    decisions: Vec<(String, MergeDecision)>,
}

impl Amalgamator<'_> {
    fn merge_set(&mut self, set: &MatchSet) -> Result<MergedNode, MergeError> {
        if self.cancel.is_cancelled() {
            return Err(MergeError::Cancelled);
        }

        let tentative = classify(&set.nodes);
        let slot = self.decisions.len();
        self.decisions.push((set.path.clone(), tentative));

        let (decision, body) = match tentative {
            MergeDecision::DeleteModify { deleted_by } => {
                self.record(&set.children);
                (tentative, self.delete_modify(set, deleted_by))
            }
            MergeDecision::BothAdded { conflict: true } => {
                self.merge_both(set, ConflictKind::BothAdded)?
            }
            MergeDecision::BothModified {
                identical: false, ..
            } => self.merge_both(set, ConflictKind::BothModified)?,
            MergeDecision::Deleted { .. } | MergeDecision::BothDeleted => {
                self.record(&set.children);
                (tentative, MergedBody::Removed)
            }
            _ => {
                self.record(&set.children);
                let body = kept_node(set, tentative).map_or(MergedBody::Removed, |n| {
                    MergedBody::Leaf(Fragment::plain(indented_body(n)))
                });
                (tentative, body)
            }
        };
        self.decisions[slot].1 = decision;

        let leading = kept_node(set, decision)
            .map(|n| split_partial(&n.leading).0.to_string())
            .unwrap_or_default();
        Ok(MergedNode {
            signature: set.signature.clone(),
            path: set.path.clone(),
            decision,
            leading,
            body,
        })
    }

    /// Record decisions for the descendants of a node taken as a whole.
    fn record(&mut self, children: &[MatchSet]) {
        for child in children {
            self.decisions.push((child.path.clone(), classify(&child.nodes)));
            self.record(&child.children);
        }
    }

    fn merge_both(
        &mut self,
        set: &MatchSet,
        kind: ConflictKind,
    ) -> Result<(MergeDecision, MergedBody), MergeError> {
        let (conflict, body) = if set.is_container() {
            let (head, head_conflict) = self.merge_text(
                set,
                kind,
                |n| format!("{}{}", split_partial(&n.leading).1, n.prefix()),
                |n| n.prefix().to_string(),
            )?;
            let mut children = set
                .children
                .iter()
                .map(|c| self.merge_set(c))
                .collect::<Result<Vec<_>, _>>()?;
            place_leading(set, &mut children);
            let (suffix, suffix_conflict) = self.merge_text(
                set,
                kind,
                |n| n.suffix().to_string(),
                |n| n.suffix().to_string(),
            )?;
            (
                head_conflict || suffix_conflict,
                MergedBody::Container {
                    head,
                    children,
                    suffix,
                },
            )
        } else {
            let (fragment, conflict) =
                self.merge_text(set, kind, indented_body, TreeNode::body_source)?;
            (conflict, MergedBody::Leaf(fragment))
        };

        let decision = match kind {
            ConflictKind::BothAdded => MergeDecision::BothAdded { conflict },
            _ => MergeDecision::BothModified {
                identical: false,
                conflict,
            },
        };
        Ok((decision, body))
    }

    /// diff3 over one text span of the node. On conflict, a single node
    /// conflict is recorded carrying `shown` of each side.
    fn merge_text(
        &mut self,
        set: &MatchSet,
        kind: ConflictKind,
        span: impl Fn(&TreeNode) -> String,
        shown: impl Fn(&TreeNode) -> String,
    ) -> Result<(Fragment, bool), MergeError> {
        let texts = set.nodes.clone().map(|n| n.map(&span).unwrap_or_default());
        let sides = texts.as_refs().map(String::as_str);

        if sides.left == sides.right || sides.right == sides.base {
            return Ok((Fragment::plain(texts.left), false));
        }
        if sides.left == sides.base {
            return Ok((Fragment::plain(texts.right), false));
        }

        let output = merge_texts(&sides, self.style, self.cancel)?;
        let conflict = output.has_conflicts();
        if conflict {
            self.conflicts.push(Conflict {
                kind,
                location: ConflictLocation::Node {
                    path: set.path.clone(),
                },
                left: set.nodes.left.map(&shown),
                base: set.nodes.base.map(&shown),
                right: set.nodes.right.map(&shown),
            });
        }
        Ok((Fragment::from_merge(output.text, &sides), conflict))
    }

    /// One side dropped a node the other changed: a single block holding the
    /// whole declarations, with an empty section for the deleting side.
    fn delete_modify(&mut self, set: &MatchSet, deleted_by: Side) -> MergedBody {
        let nodes = &set.nodes;
        self.conflicts.push(Conflict {
            kind: ConflictKind::DeleteModify,
            location: ConflictLocation::Node {
                path: set.path.clone(),
            },
            left: nodes.left.map(TreeNode::body_source),
            base: nodes.base.map(TreeNode::body_source),
            right: nodes.right.map(TreeNode::body_source),
        });

        let modified = match deleted_by {
            Side::Left => nodes.right,
            _ => nodes.left,
        };
        let side = |n: Option<&TreeNode>| n.map(indented_body);
        let text = self.style.render(
            side(nodes.left).as_deref(),
            side(nodes.base).as_deref(),
            side(nodes.right).as_deref(),
        );

        MergedBody::Leaf(Fragment {
            text,
            closes_line: modified.is_some_and(|n| !n.body_source().ends_with('\n')),
        })
    }
}

/// Revisions to take a node from, most preferred first.
fn preferred_sides(decision: MergeDecision) -> [Side; 3] {
    match decision {
        MergeDecision::Unchanged => [Side::Base, Side::Left, Side::Right],
        MergeDecision::RightAdded | MergeDecision::RightModified => {
            [Side::Right, Side::Left, Side::Base]
        }
        MergeDecision::DeleteModify {
            deleted_by: Side::Left,
        } => [Side::Right, Side::Base, Side::Left],
        _ => [Side::Left, Side::Right, Side::Base],
    }
}

/// The revision of the node a decision keeps.
fn kept_node<'a>(set: &MatchSet<'a>, decision: MergeDecision) -> Option<&'a TreeNode> {
    if matches!(
        decision,
        MergeDecision::Deleted { .. } | MergeDecision::BothDeleted
    ) {
        return None;
    }
    preferred_sides(decision)
        .into_iter()
        .find_map(|side| *set.nodes.get(side))
}

/// The node's text preceded by its indentation.
fn indented_body(node: &TreeNode) -> String {
    format!("{}{}", split_partial(&node.leading).1, node.body_source())
}

/// Signature of the sibling before each node of a member list.
fn predecessors(list: &[TreeNode]) -> HashMap<&str, Option<&str>> {
    let mut prev = None;
    list.iter()
        .map(|n| {
            let entry = (n.signature.as_str(), prev);
            prev = Some(n.signature.as_str());
            entry
        })
        .collect()
}

/// Set the leading lines of each merged member of `parent`.
fn place_leading(parent: &MatchSet, merged: &mut [MergedNode]) {
    let preds = parent
        .nodes
        .clone()
        .map(|n| predecessors(n.map_or(&[][..], TreeNode::children)));

    let mut prev: Option<&str> = None;
    for (set, node) in parent.children.iter().zip(merged.iter_mut()) {
        if node.is_removed() {
            continue;
        }
        if let Some(leading) = choose_leading(set, node.decision, prev, &preds) {
            node.leading = leading.to_string();
        }
        prev = Some(set.signature.as_str());
    }
}

/// Comment and attribute edits win. Otherwise the layout comes from a
/// revision where the node follows `pred`, preferring one that changed it.
fn choose_leading<'a>(
    set: &MatchSet<'a>,
    decision: MergeDecision,
    pred: Option<&str>,
    preds: &Revisions<HashMap<&str, Option<&str>>>,
) -> Option<&'a str> {
    let lines = |side: Side| set.nodes.get(side).map(|n| split_partial(&n.leading).0);
    let order = preferred_sides(decision);
    let others = || order.into_iter().filter(|s| *s != Side::Base);
    let base = lines(Side::Base);

    if let Some(base) = base {
        let edited = others().find_map(|s| lines(s).filter(|l| !same_trivia(l, base)));
        if edited.is_some() {
            return edited;
        }
    }

    let in_place = |side: Side| {
        set.nodes.get(side).is_some()
            && preds.get(side).get(set.signature.as_str()) == Some(&pred)
    };
    let relaid = |side: Side| lines(side).filter(|l| Some(*l) != base);

    if in_place(Side::Base) {
        return others().filter(|s| in_place(*s)).find_map(relaid).or(base);
    }
    order
        .into_iter()
        .find(|s| in_place(*s))
        .and_then(lines)
        .or_else(|| others().find_map(relaid))
        .or(base)
}

/// Split leading text into complete lines and the partial line (usually
/// indentation) directly before the node.
fn split_partial(leading: &str) -> (&str, &str) {
    match leading.rfind('\n') {
        Some(i) => leading.split_at(i + 1),
        None => ("", leading),
    }
}
