//! Node alignment across three revisions.
//!
//! Within a matched container, children are aligned by identity signature,
//! never by position, so reordering, insertion or deletion on one side does
//! not desynchronize the rest. Signatures are unique among siblings (the
//! tree builder rejects collisions), so every child lands in exactly one
//! [`MatchSet`].
//!
//! Child match sets are produced in *merge order*: base order first, then
//! each side's insertions right after the nearest preceding sibling they
//! followed in the introducing side. When both sides insert after the same
//! anchor, left's insertions come first.

use std::collections::HashMap;

use thiserror::Error;

use crate::parser::TreeNode;
use crate::types::{Revisions, Side};

/// A triple of optional references to the same declaration in each revision.
#[derive(Debug, Clone)]
pub struct MatchSet<'a> {
    pub signature: String,
    pub path: String,
    pub nodes: Revisions<Option<&'a TreeNode>>,
    /// Child match sets, in merge order. Empty unless every present node is
    /// a container.
    pub children: Vec<MatchSet<'a>>,
}

impl<'a> MatchSet<'a> {
    /// True when every present node is a container.
    pub fn is_container(&self) -> bool {
        self.nodes.iter().all(|(_, n)| n.is_none_or(|n| n.is_container()))
    }

    /// Only the base reference is present: a deletion both sides agree on.
    pub fn is_agreed_deletion(&self) -> bool {
        self.nodes.base.is_some() && self.nodes.left.is_none() && self.nodes.right.is_none()
    }

    /// Number of match sets in this subtree, this one included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(MatchSet::size).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlignError {
    #[error("no revision to anchor the root match set")]
    Empty,
    #[error("root kinds disagree: {0}")]
    RootMismatch(String),
}

/// Align up to three trees, returning the root match set.
pub fn align<'a>(roots: Revisions<Option<&'a TreeNode>>) -> Result<MatchSet<'a>, AlignError> {
    let (signature, path) = {
        let mut present = roots.iter().filter_map(|(_, n)| *n);
        let first = present.next().ok_or(AlignError::Empty)?;
        if let Some(other) = present.find(|n| n.signature != first.signature) {
            return Err(AlignError::RootMismatch(format!(
                "{} vs {}",
                first.signature, other.signature
            )));
        }
        (first.signature.clone(), first.path.clone())
    };
    Ok(match_set(signature, path, roots))
}

fn match_set<'a>(
    signature: String,
    path: String,
    nodes: Revisions<Option<&'a TreeNode>>,
) -> MatchSet<'a> {
    let mut set = MatchSet {
        signature,
        path,
        nodes,
        children: Vec::new(),
    };
    if set.is_container() {
        set.children = align_children(&set.nodes);
    }
    set
}

fn align_children<'a>(parents: &Revisions<Option<&'a TreeNode>>) -> Vec<MatchSet<'a>> {
    let lists: Revisions<&'a [TreeNode]> = Revisions::new(
        parents.left.map_or(&[][..], |n| n.children()),
        parents.base.map_or(&[][..], |n| n.children()),
        parents.right.map_or(&[][..], |n| n.children()),
    );

    let index = |list: &'a [TreeNode]| -> HashMap<&'a str, &'a TreeNode> {
        list.iter().map(|n| (n.signature.as_str(), n)).collect()
    };
    let left = index(lists.left);
    let base = index(lists.base);
    let right = index(lists.right);

    merge_order(&lists)
        .into_iter()
        .map(|sig| {
            let nodes = Revisions::new(
                left.get(sig).copied(),
                base.get(sig).copied(),
                right.get(sig).copied(),
            );
            let path = nodes
                .iter()
                .find_map(|(_, n)| n.map(|n| n.path.clone()))
                .unwrap_or_default();
            match_set(sig.to_string(), path, nodes)
        })
        .collect()
}

/// Signatures of the union of all three sibling lists, in merge order.
fn merge_order<'a>(lists: &Revisions<&'a [TreeNode]>) -> Vec<&'a str> {
    let mut order: Vec<(&'a str, Side)> = lists
        .base
        .iter()
        .map(|n| (n.signature.as_str(), Side::Base))
        .collect();

    for side in [Side::Left, Side::Right] {
        let mut anchor: Option<usize> = None;
        for node in lists.get(side).iter() {
            let sig = node.signature.as_str();
            if let Some(pos) = order.iter().position(|(s, _)| *s == sig) {
                anchor = Some(pos);
                continue;
            }
            let mut at = anchor.map_or(0, |p| p + 1);
            if side == Side::Right {
                while at < order.len() && order[at].1 == Side::Left {
                    at += 1;
                }
            }
            order.insert(at, (sig, side));
            anchor = Some(at);
        }
    }

    order.into_iter().map(|(s, _)| s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::build_tree;
    use crate::types::Language;

    fn java(body: &str) -> TreeNode {
        build_tree(&format!("class A {{\n{body}}}\n"), Language::Java).unwrap()
    }

    fn class_children<'a>(root: &'a MatchSet<'a>) -> Vec<&'a str> {
        root.children[0]
            .children
            .iter()
            .map(|m| m.path.as_str())
            .collect()
    }

    #[test]
    fn test_align_identical() {
        let t = java("  void f() {}\n  void g() {}\n");
        let root = align(Revisions::new(Some(&t), Some(&t), Some(&t))).unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(class_children(&root), vec!["A.f()", "A.g()"]);
        assert!(root.children[0].children.iter().all(|m| m.nodes.present_count() == 3));
    }

    #[test]
    fn test_align_is_order_insensitive() {
        let base = java("  void f() {}\n  void g() {}\n");
        let left = java("  void g() {}\n  void f() {}\n");
        let root = align(Revisions::new(Some(&left), Some(&base), Some(&base))).unwrap();
        // base order wins and every node is matched on all sides
        assert_eq!(class_children(&root), vec!["A.f()", "A.g()"]);
        assert!(root.children[0].children.iter().all(|m| m.nodes.present_count() == 3));
    }

    #[test]
    fn test_insertions_follow_their_anchor() {
        let base = java("  void f() {}\n  void g() {}\n");
        let left = java("  void f() {}\n  void l() {}\n  void g() {}\n");
        let right = java("  void f() {}\n  void r() {}\n  void g() {}\n");
        let root = align(Revisions::new(Some(&left), Some(&base), Some(&right))).unwrap();
        assert_eq!(
            class_children(&root),
            vec!["A.f()", "A.l()", "A.r()", "A.g()"]
        );
        let l = &root.children[0].children[1];
        assert!(l.nodes.left.is_some() && l.nodes.base.is_none() && l.nodes.right.is_none());
    }

    #[test]
    fn test_insertion_at_front() {
        let base = java("  void f() {}\n");
        let right = java("  int x;\n  void f() {}\n");
        let root = align(Revisions::new(Some(&base), Some(&base), Some(&right))).unwrap();
        assert_eq!(class_children(&root), vec!["A.x", "A.f()"]);
    }

    #[test]
    fn test_agreed_deletion() {
        let base = java("  void f() {}\n  void g() {}\n");
        let side = java("  void g() {}\n");
        let root = align(Revisions::new(Some(&side), Some(&base), Some(&side))).unwrap();
        let f = &root.children[0].children[0];
        assert_eq!(f.path, "A.f()");
        assert!(f.is_agreed_deletion());
    }

    #[test]
    fn test_absent_revisions() {
        let t = java("  void f() {}\n");
        let root = align(Revisions::new(Some(&t), None, None)).unwrap();
        assert_eq!(root.nodes.present_count(), 1);
        assert_eq!(root.size(), 3);
        assert_eq!(align(Revisions::new(None, None, None)).unwrap_err(), AlignError::Empty);
    }

    #[test]
    fn test_opaque_nodes_are_not_descended() {
        let t = java("  void f() { int a = 1; }\n");
        let root = align(Revisions::new(Some(&t), Some(&t), Some(&t))).unwrap();
        let f = &root.children[0].children[0];
        assert!(!f.is_container());
        assert!(f.children.is_empty());
    }
}
