//! Per-language node tables used by the tree builder.
//!
//! Tree-sitter grammars name their nodes differently, so each language
//! declares which node kinds are containers worth recursing into, which
//! kinds only wrap another declaration, which are spliced into their
//! parent's member list, and which never form nodes of their own.

use crate::types::Language;

pub(crate) struct Rules {
    /// Container kinds and the field holding their member list.
    pub containers: &'static [(&'static str, &'static str)],
    /// Kinds whose identity comes from the inner declaration in the given field.
    pub wrappers: &'static [(&'static str, &'static str)],
    /// Member-list kinds whose named children belong to the enclosing list.
    pub transparent: &'static [&'static str],
    /// Kinds that attach to the following node as leading text.
    pub trivia: &'static [&'static str],
    /// Kinds identified by their whole (whitespace-normalized) text.
    pub text_named: &'static [&'static str],
    /// Kinds that carry their name on a specific inner node.
    pub carriers: &'static [(&'static str, &'static [&'static str])],
}

impl Rules {
    pub fn container_body(&self, kind: &str) -> Option<&'static str> {
        lookup(self.containers, kind)
    }

    pub fn wrapped_field(&self, kind: &str) -> Option<&'static str> {
        lookup(self.wrappers, kind)
    }

    pub fn is_transparent(&self, kind: &str) -> bool {
        self.transparent.contains(&kind)
    }

    pub fn is_trivia(&self, kind: &str) -> bool {
        self.trivia.contains(&kind)
    }

    pub fn is_text_named(&self, kind: &str) -> bool {
        self.text_named.contains(&kind)
    }

    pub fn carrier_kinds(&self, kind: &str) -> Option<&'static [&'static str]> {
        lookup(self.carriers, kind)
    }
}

fn lookup<T: Copy>(table: &'static [(&'static str, T)], kind: &str) -> Option<T> {
    table.iter().find(|(k, _)| *k == kind).map(|(_, v)| *v)
}

static JAVA: Rules = Rules {
    containers: &[
        ("class_declaration", "body"),
        ("interface_declaration", "body"),
        ("enum_declaration", "body"),
        ("record_declaration", "body"),
        ("annotation_type_declaration", "body"),
    ],
    wrappers: &[],
    transparent: &["enum_body_declarations"],
    trivia: &["line_comment", "block_comment"],
    text_named: &["package_declaration", "import_declaration"],
    carriers: &[],
};

static RUST: Rules = Rules {
    containers: &[
        ("impl_item", "body"),
        ("trait_item", "body"),
        ("mod_item", "body"),
    ],
    wrappers: &[],
    transparent: &[],
    trivia: &[
        "line_comment",
        "block_comment",
        "attribute_item",
        "inner_attribute_item",
    ],
    text_named: &["use_declaration", "extern_crate_declaration"],
    carriers: &[],
};

static PYTHON: Rules = Rules {
    containers: &[("class_definition", "body")],
    wrappers: &[("decorated_definition", "definition")],
    transparent: &[],
    trivia: &["comment"],
    text_named: &[
        "import_statement",
        "import_from_statement",
        "future_import_statement",
    ],
    carriers: &[("expression_statement", &["assignment"])],
};

static JAVASCRIPT: Rules = Rules {
    containers: &[("class_declaration", "body")],
    wrappers: &[("export_statement", "declaration")],
    transparent: &[],
    trivia: &["comment"],
    text_named: &["import_statement"],
    carriers: &[
        ("lexical_declaration", &["variable_declarator"]),
        ("variable_declaration", &["variable_declarator"]),
    ],
};

static TYPESCRIPT: Rules = Rules {
    containers: &[
        ("class_declaration", "body"),
        ("abstract_class_declaration", "body"),
        ("interface_declaration", "body"),
        ("internal_module", "body"),
    ],
    wrappers: &[("export_statement", "declaration")],
    transparent: &[],
    trivia: &["comment"],
    text_named: &["import_statement"],
    carriers: &[
        ("lexical_declaration", &["variable_declarator"]),
        ("variable_declaration", &["variable_declarator"]),
    ],
};

static GO: Rules = Rules {
    containers: &[],
    wrappers: &[],
    transparent: &[],
    trivia: &["comment"],
    text_named: &["package_clause", "import_declaration"],
    carriers: &[
        ("type_declaration", &["type_spec", "type_alias"]),
        ("const_declaration", &["const_spec"]),
        ("var_declaration", &["var_spec"]),
    ],
};

static C: Rules = Rules {
    containers: &[("struct_specifier", "body"), ("union_specifier", "body")],
    wrappers: &[],
    transparent: &[],
    trivia: &["comment"],
    text_named: &["preproc_include"],
    carriers: &[],
};

static CPP: Rules = Rules {
    containers: &[
        ("namespace_definition", "body"),
        ("class_specifier", "body"),
        ("struct_specifier", "body"),
        ("union_specifier", "body"),
    ],
    wrappers: &[],
    transparent: &[],
    trivia: &["comment", "access_specifier"],
    text_named: &["preproc_include", "using_declaration"],
    carriers: &[],
};

impl Language {
    pub(crate) fn rules(self) -> &'static Rules {
        match self {
            Language::Java => &JAVA,
            Language::Rust => &RUST,
            Language::Python => &PYTHON,
            Language::JavaScript => &JAVASCRIPT,
            Language::TypeScript => &TYPESCRIPT,
            Language::Go => &GO,
            Language::C => &C,
            Language::Cpp => &CPP,
        }
    }

    /// Get the tree-sitter Language object for this language.
    pub(crate) fn tree_sitter_language(self) -> tree_sitter::Language {
        let lang_ref = match self {
            Language::Java => tree_sitter_java::LANGUAGE,
            Language::Rust => tree_sitter_rust::LANGUAGE,
            Language::JavaScript => tree_sitter_javascript::LANGUAGE,
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT,
            Language::Python => tree_sitter_python::LANGUAGE,
            Language::Go => tree_sitter_go::LANGUAGE,
            Language::C => tree_sitter_c::LANGUAGE,
            Language::Cpp => tree_sitter_cpp::LANGUAGE,
        };
        lang_ref.into()
    }
}
