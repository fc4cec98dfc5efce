//! Per-language extraction and resolution rules.
//!
//! Every supported language is one [`LanguageRules`] entry. The walker in
//! [`crate::ingest::extract`] and the resolver in
//! [`crate::graph::module_resolver`] only ever consult this table, so a new
//! language is a new row plus a grammar in [`crate::ingest::pool::grammar`].

use crate::graph::module_resolver::{self, KnownFiles};
use crate::ingest::imports;
use crate::ingest::{ImportSpec, Language, ScopeSeparator};

/// Extracts import specs from one import node.
pub type ImportExtractFn = fn(&tree_sitter::Node, &[u8]) -> Vec<ImportSpec>;

/// Resolves one import spec of the file labelled `importer` to known file labels.
pub type ImportResolveFn = fn(&ImportSpec, &str, &KnownFiles) -> Vec<String>;

pub struct LanguageRules {
    pub language: Language,
    pub separator: ScopeSeparator,
    /// Node kinds reported as `class`
    pub class_kinds: &'static [&'static str],
    /// Class nodes without a `body` field are forward declarations (C/C++)
    pub class_requires_body: bool,
    /// Node kinds reported as `function`
    pub function_kinds: &'static [&'static str],
    /// Nodes that give their children a class context without being declared
    /// themselves, named by their `type` field (Rust `impl`)
    pub scope_kinds: &'static [&'static str],
    /// Function names come from the declarator chain instead of a `name` field
    pub declarator_names: bool,
    /// `const f = () => {}` declares `f`
    pub bound_function_values: bool,
    pub call_kinds: &'static [&'static str],
    /// Field of a call node holding the callee expression
    pub callee_field: &'static str,
    /// Fields followed to reduce `a.b.c` to its final token `c`
    pub member_fields: &'static [&'static str],
    pub import_kinds: &'static [&'static str],
    pub extract_import: ImportExtractFn,
    pub resolve_import: ImportResolveFn,
}

impl LanguageRules {
    pub fn is_class(&self, kind: &str) -> bool {
        self.class_kinds.contains(&kind)
    }

    pub fn is_function(&self, kind: &str) -> bool {
        self.function_kinds.contains(&kind)
    }

    pub fn is_scope(&self, kind: &str) -> bool {
        self.scope_kinds.contains(&kind)
    }

    pub fn is_call(&self, kind: &str) -> bool {
        self.call_kinds.contains(&kind)
    }

    pub fn is_import(&self, kind: &str) -> bool {
        self.import_kinds.contains(&kind)
    }
}

/// Value kinds that make a JS/TS variable declarator a function declaration.
pub const FUNCTION_VALUE_KINDS: &[&str] = &[
    "arrow_function",
    "function",
    "function_expression",
    "generator_function",
];

static PYTHON: LanguageRules = LanguageRules {
    language: Language::Python,
    separator: ScopeSeparator::Dot,
    class_kinds: &["class_definition"],
    class_requires_body: false,
    function_kinds: &["function_definition"],
    scope_kinds: &[],
    declarator_names: false,
    bound_function_values: false,
    call_kinds: &["call"],
    callee_field: "function",
    member_fields: &["attribute"],
    import_kinds: &["import_statement", "import_from_statement"],
    extract_import: imports::python_imports,
    resolve_import: module_resolver::resolve_python,
};

static JAVASCRIPT: LanguageRules = LanguageRules {
    language: Language::JavaScript,
    separator: ScopeSeparator::Dot,
    class_kinds: &["class_declaration"],
    class_requires_body: false,
    function_kinds: &[
        "function_declaration",
        "generator_function_declaration",
        "method_definition",
    ],
    scope_kinds: &[],
    declarator_names: false,
    bound_function_values: true,
    call_kinds: &["call_expression"],
    callee_field: "function",
    member_fields: &["property"],
    import_kinds: &["import_statement", "export_statement"],
    extract_import: imports::js_imports,
    resolve_import: module_resolver::resolve_js,
};

const TYPESCRIPT_RULES: LanguageRules = LanguageRules {
    language: Language::TypeScript,
    separator: ScopeSeparator::Dot,
    class_kinds: &[
        "class_declaration",
        "abstract_class_declaration",
        "interface_declaration",
    ],
    class_requires_body: false,
    function_kinds: &[
        "function_declaration",
        "generator_function_declaration",
        "method_definition",
    ],
    scope_kinds: &[],
    declarator_names: false,
    bound_function_values: true,
    call_kinds: &["call_expression"],
    callee_field: "function",
    member_fields: &["property"],
    import_kinds: &["import_statement", "export_statement"],
    extract_import: imports::js_imports,
    resolve_import: module_resolver::resolve_js,
};

static TYPESCRIPT: LanguageRules = TYPESCRIPT_RULES;

static TSX: LanguageRules = LanguageRules {
    language: Language::Tsx,
    ..TYPESCRIPT_RULES
};

static RUST: LanguageRules = LanguageRules {
    language: Language::Rust,
    separator: ScopeSeparator::DoubleColon,
    class_kinds: &["struct_item", "enum_item", "trait_item", "union_item"],
    class_requires_body: false,
    function_kinds: &["function_item"],
    scope_kinds: &["impl_item"],
    declarator_names: false,
    bound_function_values: false,
    call_kinds: &["call_expression"],
    callee_field: "function",
    member_fields: &["field", "name", "function"],
    import_kinds: &["use_declaration", "mod_item"],
    extract_import: imports::rust_imports,
    resolve_import: module_resolver::resolve_rust,
};

static JAVA: LanguageRules = LanguageRules {
    language: Language::Java,
    separator: ScopeSeparator::Dot,
    class_kinds: &[
        "class_declaration",
        "interface_declaration",
        "enum_declaration",
        "record_declaration",
    ],
    class_requires_body: false,
    function_kinds: &["method_declaration", "constructor_declaration"],
    scope_kinds: &[],
    declarator_names: false,
    bound_function_values: false,
    call_kinds: &["method_invocation"],
    callee_field: "name",
    member_fields: &[],
    import_kinds: &["import_declaration"],
    extract_import: imports::java_imports,
    resolve_import: module_resolver::resolve_java,
};

static C: LanguageRules = LanguageRules {
    language: Language::C,
    separator: ScopeSeparator::DoubleColon,
    class_kinds: &["struct_specifier", "union_specifier", "enum_specifier"],
    class_requires_body: true,
    function_kinds: &["function_definition"],
    scope_kinds: &[],
    declarator_names: true,
    bound_function_values: false,
    call_kinds: &["call_expression"],
    callee_field: "function",
    member_fields: &["field"],
    import_kinds: &["preproc_include"],
    extract_import: imports::c_includes,
    resolve_import: module_resolver::resolve_c,
};

static CPP: LanguageRules = LanguageRules {
    language: Language::Cpp,
    separator: ScopeSeparator::DoubleColon,
    class_kinds: &[
        "class_specifier",
        "struct_specifier",
        "union_specifier",
        "enum_specifier",
    ],
    class_requires_body: true,
    function_kinds: &["function_definition"],
    scope_kinds: &[],
    declarator_names: true,
    bound_function_values: false,
    call_kinds: &["call_expression"],
    callee_field: "function",
    member_fields: &["field", "name"],
    import_kinds: &["preproc_include"],
    extract_import: imports::c_includes,
    resolve_import: module_resolver::resolve_c,
};

/// Rule set for a language.
pub fn rules_for(language: Language) -> &'static LanguageRules {
    match language {
        Language::Python => &PYTHON,
        Language::JavaScript => &JAVASCRIPT,
        Language::TypeScript => &TYPESCRIPT,
        Language::Tsx => &TSX,
        Language::Rust => &RUST,
        Language::Java => &JAVA,
        Language::C => &C,
        Language::Cpp => &CPP,
    }
}
