//! Tree builder: source text to a tree of declarations.
//!
//! Source code is parsed with Tree-sitter and folded into a semistructured
//! tree. Declarations that own members (classes, impls, namespaces, ...)
//! become **container** nodes whose members are aligned and merged one by
//! one; everything else becomes an **opaque** node whose text is merged as
//! a unit.
//!
//! Every byte of the input belongs to exactly one node field:
//! - `leading`: text between the previous sibling (or the opening of the
//!   member list) and the node, i.e. whitespace, comments, attributes;
//! - opaque `text`, or container `prefix` + members + `suffix`.
//!
//! Concatenating those in order reproduces the input exactly, so unchanged
//! regions come out of a merge byte-identical.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tree_sitter::Node;

use crate::grammar::Rules;
use crate::types::Language;

/// Whether a node is recursed into or merged as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Container,
    Opaque,
}

/// Content of a tree node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeBody {
    /// Exact source text of an unsplit declaration.
    Opaque { text: String },
    /// A declaration with members. `prefix` runs up to and including the
    /// opening of the member list; `suffix` holds what follows the last member.
    Container {
        prefix: String,
        children: Vec<TreeNode>,
        suffix: String,
    },
}

/// A node in the semistructured tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    /// Tree-sitter node kind, e.g. `method_declaration`.
    pub syntax: String,
    /// Identity signature, unique among siblings.
    pub signature: String,
    /// Qualified path used to name the node in conflicts, e.g. `Foo.bar(int)`.
    pub path: String,
    pub leading: String,
    pub body: NodeBody,
}

impl TreeNode {
    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Opaque { .. } => NodeKind::Opaque,
            NodeBody::Container { .. } => NodeKind::Container,
        }
    }

    pub fn is_container(&self) -> bool {
        self.kind() == NodeKind::Container
    }

    pub fn children(&self) -> &[TreeNode] {
        match &self.body {
            NodeBody::Opaque { .. } => &[],
            NodeBody::Container { children, .. } => children,
        }
    }

    /// Container header up to and including the member list opening.
    pub fn prefix(&self) -> &str {
        match &self.body {
            NodeBody::Opaque { .. } => "",
            NodeBody::Container { prefix, .. } => prefix,
        }
    }

    pub fn suffix(&self) -> &str {
        match &self.body {
            NodeBody::Opaque { .. } => "",
            NodeBody::Container { suffix, .. } => suffix,
        }
    }

    /// The node's own text, without leading trivia.
    pub fn body_source(&self) -> String {
        let mut out = String::new();
        self.write_body(&mut out);
        out
    }

    /// Leading trivia followed by the node's own text.
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        self.write_source(&mut out);
        out
    }

    fn write_source(&self, out: &mut String) {
        out.push_str(&self.leading);
        self.write_body(out);
    }

    fn write_body(&self, out: &mut String) {
        match &self.body {
            NodeBody::Opaque { text } => out.push_str(text),
            NodeBody::Container {
                prefix,
                children,
                suffix,
            } => {
                out.push_str(prefix);
                for child in children {
                    child.write_source(out);
                }
                out.push_str(suffix);
            }
        }
    }

    /// Equality of the node's own text and of the comments and attributes
    /// in its leading trivia. The whitespace separating it from the previous
    /// sibling is layout and does not count: it changes whenever a neighbor
    /// is inserted or moved.
    pub fn same_content(&self, other: &TreeNode) -> bool {
        self.body == other.body && same_trivia(&self.leading, &other.leading)
    }

    /// Compute the total number of nodes in this subtree.
    pub fn size(&self) -> usize {
        1 + self.children().iter().map(|c| c.size()).sum::<usize>()
    }
}

/// Leading texts are equal up to whitespace.
pub fn same_trivia(a: &str, b: &str) -> bool {
    a.split_whitespace().eq(b.split_whitespace())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("language error: {0}")]
    Language(String),
    #[error("parse failed")]
    ParseFailed,
    #[error("syntax error near line {line}")]
    Syntax { line: usize },
    #[error("member out of order near line {line}")]
    Layout { line: usize },
    #[error("duplicate signature `{signature}` in `{scope}`")]
    DuplicateSignature { signature: String, scope: String },
}

/// Parse source code into a semistructured tree.
///
/// Returns an error when the text cannot be parsed cleanly; callers treat
/// that as "structural merge unavailable", never as a fatal condition.
pub fn build_tree(source: &str, lang: Language) -> Result<TreeNode, BuildError> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&lang.tree_sitter_language())
        .map_err(|e| BuildError::Language(e.to_string()))?;

    let tree = parser.parse(source, None).ok_or(BuildError::ParseFailed)?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(BuildError::Syntax {
            line: first_error_line(&root).unwrap_or(1),
        });
    }

    let builder = Builder {
        source,
        rules: lang.rules(),
    };
    let members = builder.members(&root);
    let (children, suffix) = builder.siblings(&members, 0, source.len(), "")?;

    Ok(TreeNode {
        syntax: root.kind().to_string(),
        signature: root.kind().to_string(),
        path: String::new(),
        leading: String::new(),
        body: NodeBody::Container {
            prefix: String::new(),
            children,
            suffix,
        },
    })
}

fn first_error_line(node: &Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    (0..node.child_count())
        .filter_map(|i| node.child(i))
        .filter(|c| c.has_error())
        .find_map(|c| first_error_line(&c))
}

/// How a declaration is identified among its siblings.
struct Ident {
    kind: String,
    name: String,
    params: Option<String>,
}

impl Ident {
    fn signature(&self) -> String {
        match &self.params {
            Some(p) => format!("{}:{}({})", self.kind, self.name, p),
            None => format!("{}:{}", self.kind, self.name),
        }
    }

    fn display(&self) -> String {
        match &self.params {
            Some(p) => format!("{}({})", self.name, p),
            None => self.name.clone(),
        }
    }
}

const MAX_NAME_DEPTH: usize = 8;

struct Builder<'s> {
    source: &'s str,
    rules: &'static Rules,
}

impl<'s> Builder<'s> {
    fn text(&self, start: usize, end: usize) -> &'s str {
        self.source.get(start..end).unwrap_or("")
    }

    fn node_text(&self, node: &Node) -> &'s str {
        self.text(node.start_byte(), node.end_byte())
    }

    /// Named members of a member list, trivia dropped and transparent
    /// lists flattened.
    fn members<'t>(&self, list: &Node<'t>) -> Vec<Node<'t>> {
        let mut out = Vec::new();
        for i in 0..list.named_child_count() {
            let Some(child) = list.named_child(i) else {
                continue;
            };
            if child.is_extra() || self.rules.is_trivia(child.kind()) {
                continue;
            }
            if self.rules.is_transparent(child.kind()) {
                out.extend(self.members(&child));
            } else {
                out.push(child);
            }
        }
        out
    }

    /// Build sibling nodes spanning `open..close`. Returns the nodes and the
    /// text after the last one.
    fn siblings(
        &self,
        members: &[Node],
        open: usize,
        close: usize,
        scope: &str,
    ) -> Result<(Vec<TreeNode>, String), BuildError> {
        let mut nodes = Vec::with_capacity(members.len());
        let mut seen: HashSet<String> = HashSet::new();
        let mut unnamed: HashMap<String, usize> = HashMap::new();
        let mut cursor = open;

        for member in members {
            if member.start_byte() < cursor || member.end_byte() > close {
                return Err(BuildError::Layout {
                    line: member.start_position().row + 1,
                });
            }
            let leading = self.text(cursor, member.start_byte()).to_string();
            let node = self.node(member, leading, scope, &mut unnamed)?;
            if !seen.insert(node.signature.clone()) {
                return Err(BuildError::DuplicateSignature {
                    signature: node.signature,
                    scope: scope.to_string(),
                });
            }
            cursor = member.end_byte();
            nodes.push(node);
        }

        Ok((nodes, self.text(cursor, close).to_string()))
    }

    fn node(
        &self,
        member: &Node,
        leading: String,
        scope: &str,
        unnamed: &mut HashMap<String, usize>,
    ) -> Result<TreeNode, BuildError> {
        let syntax = member.kind().to_string();
        let decl = self.declaration(member);

        let ident = self.identify(&decl);
        let named = ident.is_some();
        let (signature, display) = match ident {
            Some(ident) => (ident.signature(), ident.display()),
            None => {
                let n = unnamed.entry(syntax.clone()).or_insert(0);
                let positional = format!("{syntax}#{n}");
                *n += 1;
                (positional.clone(), positional)
            }
        };
        let path = if scope.is_empty() {
            display
        } else {
            format!("{scope}.{display}")
        };

        let start = member.start_byte();
        let end = member.end_byte();

        let body_list = self
            .rules
            .container_body(decl.kind())
            .and_then(|field| decl.child_by_field_name(field))
            .filter(|_| named);

        let body = match body_list {
            Some(list) => {
                let open = list_open(&list);
                let members = self.members(&list);
                let (children, suffix) = self.siblings(&members, open, end, &path)?;
                NodeBody::Container {
                    prefix: self.text(start, open).to_string(),
                    children,
                    suffix,
                }
            }
            None => NodeBody::Opaque {
                text: self.text(start, end).to_string(),
            },
        };

        Ok(TreeNode {
            syntax,
            signature,
            path,
            leading,
            body,
        })
    }

    /// The node that carries a member's identity: wrappers such as Python
    /// decorators or JS `export` defer to the declaration they wrap.
    fn declaration<'t>(&self, member: &Node<'t>) -> Node<'t> {
        let mut node = *member;
        while let Some(inner) = self
            .rules
            .wrapped_field(node.kind())
            .and_then(|field| node.child_by_field_name(field))
        {
            node = inner;
        }
        node
    }

    fn identify(&self, decl: &Node) -> Option<Ident> {
        let kind = decl.kind();
        if self.rules.wrapped_field(kind).is_some() {
            // A wrapper without a wrapped declaration, e.g. `export { a, b }`.
            return None;
        }
        if self.rules.is_text_named(kind) {
            return Some(Ident {
                kind: kind.to_string(),
                name: collapse_whitespace(self.node_text(decl)),
                params: None,
            });
        }

        let name = match kind {
            "impl_item" => self.impl_name(decl)?,
            "method_declaration" if decl.child_by_field_name("receiver").is_some() => {
                self.go_method_name(decl)?
            }
            _ => match self.rules.carrier_kinds(kind) {
                Some(inner_kinds) => {
                    let carrier = (0..decl.named_child_count())
                        .filter_map(|i| decl.named_child(i))
                        .find(|c| inner_kinds.contains(&c.kind()))?;
                    self.find_name(&carrier, 0)?
                }
                None => self.find_name(decl, 0)?,
            },
        };

        Some(Ident {
            kind: kind.to_string(),
            name,
            params: self.parameters(decl, 0).map(|p| self.param_shape(&p)),
        })
    }

    fn find_name(&self, node: &Node, depth: usize) -> Option<String> {
        if depth > MAX_NAME_DEPTH {
            return None;
        }
        let kind = node.kind();
        if kind.ends_with("identifier") || kind.ends_with("_name") {
            return Some(strip_whitespace(self.node_text(node)));
        }
        for field in ["name", "declarator", "property", "left"] {
            if let Some(child) = node.child_by_field_name(field) {
                return self.find_name(&child, depth + 1);
            }
        }
        None
    }

    fn impl_name(&self, decl: &Node) -> Option<String> {
        let ty = strip_whitespace(self.node_text(&decl.child_by_field_name("type")?));
        Some(match decl.child_by_field_name("trait") {
            Some(tr) => format!("{} for {}", strip_whitespace(self.node_text(&tr)), ty),
            None => ty,
        })
    }

    fn go_method_name(&self, decl: &Node) -> Option<String> {
        let name = self.node_text(&decl.child_by_field_name("name")?);
        let receiver = decl.child_by_field_name("receiver")?;
        let receiver_type = receiver
            .named_child(0)
            .and_then(|p| p.child_by_field_name("type"))
            .map(|t| strip_whitespace(self.node_text(&t)))
            .unwrap_or_else(|| strip_whitespace(self.node_text(&receiver)));
        Some(format!("{receiver_type}.{name}"))
    }

    /// Parameter list of a callable, looking through C-style declarators.
    fn parameters<'t>(&self, node: &Node<'t>, depth: usize) -> Option<Node<'t>> {
        if depth > MAX_NAME_DEPTH {
            return None;
        }
        if let Some(params) = node.child_by_field_name("parameters") {
            return Some(params);
        }
        let declarator = node.child_by_field_name("declarator")?;
        self.parameters(&declarator, depth + 1)
    }

    /// `T1,T2,..` with `_` for parameters without a declared type.
    fn param_shape(&self, params: &Node) -> String {
        (0..params.named_child_count())
            .filter_map(|i| params.named_child(i))
            .filter(|p| !p.is_extra())
            .map(|p| match p.child_by_field_name("type") {
                Some(ty) => strip_whitespace(self.node_text(&ty)),
                None => "_".to_string(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Byte offset just past the opening delimiter of a member list, or the
/// list start when it has no delimiter (Python blocks).
fn list_open(list: &Node) -> usize {
    match list.child(0) {
        Some(first) if !first.is_named() => first.end_byte(),
        _ => list.start_byte(),
    }
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAVA_SRC: &str = "package demo;\n\nimport java.util.List;\n\n/** Doc. */\npublic class Foo {\n    int x = 1;\n\n    int f() { return 1; }\n\n    int f(int a) { return a; }\n\n    static class Inner {\n        void g() {}\n    }\n}\n";

    fn signatures(node: &TreeNode) -> Vec<&str> {
        node.children().iter().map(|c| c.signature.as_str()).collect()
    }

    #[test]
    fn test_java_tree() {
        let tree = build_tree(JAVA_SRC, Language::Java).unwrap();
        assert_eq!(tree.kind(), NodeKind::Container);
        assert_eq!(
            signatures(&tree),
            vec![
                "package_declaration:package demo;",
                "import_declaration:import java.util.List;",
                "class_declaration:Foo",
            ]
        );

        let class = &tree.children()[2];
        assert!(class.is_container());
        assert!(class.leading.contains("/** Doc. */"));
        assert_eq!(
            signatures(class),
            vec![
                "field_declaration:x",
                "method_declaration:f()",
                "method_declaration:f(int)",
                "class_declaration:Inner",
            ]
        );
        assert_eq!(class.children()[2].path, "Foo.f(int)");
        assert_eq!(class.children()[3].children()[0].path, "Foo.Inner.g()");
    }

    #[test]
    fn test_leaf_reconstruction() {
        let tree = build_tree(JAVA_SRC, Language::Java).unwrap();
        assert_eq!(tree.to_source(), JAVA_SRC);
    }

    #[test]
    fn test_opaque_keeps_exact_text() {
        let tree = build_tree(JAVA_SRC, Language::Java).unwrap();
        let field = &tree.children()[2].children()[0];
        assert_eq!(field.kind(), NodeKind::Opaque);
        assert_eq!(field.body_source(), "int x = 1;");
    }

    #[test]
    fn test_parse_rust() {
        let src = "use std::fmt;\n\n#[derive(Debug)]\nstruct A;\n\nimpl fmt::Display for A {\n    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { Ok(()) }\n}\n\nfn main() { let x = 1; }\n";
        let tree = build_tree(src, Language::Rust).unwrap();
        assert_eq!(tree.to_source(), src);
        let sigs = signatures(&tree);
        assert!(sigs.contains(&"struct_item:A"));
        assert!(sigs.contains(&"impl_item:fmt::Display for A"));
        assert!(sigs.contains(&"function_item:main()"));
        let strukt = tree.children().iter().find(|c| c.signature == "struct_item:A").unwrap();
        assert!(strukt.leading.contains("#[derive(Debug)]"));
    }

    #[test]
    fn test_parse_python() {
        let src = "import os\n\nX = 1\n\nclass A:\n    def f(self, a: int):\n        return a\n\n    @staticmethod\n    def g():\n        pass\n";
        let tree = build_tree(src, Language::Python).unwrap();
        assert_eq!(tree.to_source(), src);
        let sigs = signatures(&tree);
        assert!(sigs.contains(&"expression_statement:X"));
        let class = tree.children().iter().find(|c| c.signature == "class_definition:A").unwrap();
        assert_eq!(
            signatures(class),
            vec!["function_definition:f(_,int)", "function_definition:g()"]
        );
    }

    #[test]
    fn test_parse_javascript() {
        let src = "function foo() { return 42; }\nconst bar = 1;\n";
        let tree = build_tree(src, Language::JavaScript).unwrap();
        assert_eq!(tree.syntax, "program");
        assert_eq!(
            signatures(&tree),
            vec!["function_declaration:foo()", "lexical_declaration:bar"]
        );
    }

    #[test]
    fn test_unnamed_members_are_positional() {
        let src = "print(1)\nprint(2)\n";
        let tree = build_tree(src, Language::Python).unwrap();
        assert_eq!(
            signatures(&tree),
            vec!["expression_statement#0", "expression_statement#1"]
        );
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let err = build_tree("class { broken", Language::Java).unwrap_err();
        assert!(matches!(err, BuildError::Syntax { .. }));
    }

    #[test]
    fn test_layout_whitespace_is_not_content() {
        let base = build_tree("class A {\n    int f() { return 1; }\n}\n", Language::Java).unwrap();
        let spaced =
            build_tree("class A {\n\n\n    int f() { return 1; }\n}\n", Language::Java).unwrap();
        let documented = build_tree(
            "class A {\n    /** f. */\n    int f() { return 1; }\n}\n",
            Language::Java,
        )
        .unwrap();

        let f = &base.children()[0].children()[0];
        assert!(f.same_content(&spaced.children()[0].children()[0]));
        assert!(!f.same_content(&documented.children()[0].children()[0]));
    }

    #[test]
    fn test_duplicate_signature_is_reported() {
        let src = "def f():\n    pass\n\ndef f():\n    pass\n";
        let err = build_tree(src, Language::Python).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateSignature { .. }));
    }
}
