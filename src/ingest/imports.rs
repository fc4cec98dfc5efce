//! Import statement extraction.
//!
//! One function per language family, each turning a single import node into
//! zero or more [`ImportSpec`]s. Specifiers are left unresolved; resolution
//! against the scanned file set lives in `graph::module_resolver`.

use crate::common::node_text;
use crate::ingest::ImportSpec;

fn line_of(node: &tree_sitter::Node) -> usize {
    node.start_position().row + 1
}

/// Strip one pair of surrounding string quotes.
pub fn strip_quotes(text: &str) -> &str {
    let trimmed = text.trim();
    for quote in ['"', '\'', '`'] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return &trimmed[1..trimmed.len() - 1];
        }
    }
    trimmed
}

/// Name bound by a Python `dotted_name` or `aliased_import` child.
fn python_imported_name(node: &tree_sitter::Node, source: &[u8]) -> Option<String> {
    let target = if node.kind() == "aliased_import" {
        node.child_by_field_name("name")?
    } else {
        *node
    };
    node_text(&target, source).map(|s| s.to_string())
}

/// `import a.b, c as d` and `from .pkg import mod, other as o`.
pub fn python_imports(node: &tree_sitter::Node, source: &[u8]) -> Vec<ImportSpec> {
    let line = line_of(node);
    let mut cursor = node.walk();
    match node.kind() {
        "import_statement" => node
            .children_by_field_name("name", &mut cursor)
            .filter_map(|child| python_imported_name(&child, source))
            .map(|specifier| ImportSpec {
                specifier,
                names: Vec::new(),
                line,
            })
            .collect(),
        "import_from_statement" => {
            let Some(module) = node
                .child_by_field_name("module_name")
                .and_then(|m| node_text(&m, source))
            else {
                return Vec::new();
            };
            let names = node
                .children_by_field_name("name", &mut cursor)
                .filter_map(|child| python_imported_name(&child, source))
                .collect();
            vec![ImportSpec {
                specifier: module.to_string(),
                names,
                line,
            }]
        }
        _ => Vec::new(),
    }
}

/// `import x from './a'`, `export { y } from './b'`.
///
/// `require('./c')` and `import('./d')` are call expressions and are picked up
/// by [`js_call_import`] instead.
pub fn js_imports(node: &tree_sitter::Node, source: &[u8]) -> Vec<ImportSpec> {
    let Some(source_node) = node.child_by_field_name("source") else {
        return Vec::new();
    };
    match node_text(&source_node, source) {
        Some(text) => vec![ImportSpec {
            specifier: strip_quotes(text).to_string(),
            names: Vec::new(),
            line: line_of(node),
        }],
        None => Vec::new(),
    }
}

/// `require("x")` or `import("x")` with a string literal argument.
///
/// Returns None for every other call, which then counts as a call site.
pub fn js_call_import(call: &tree_sitter::Node, source: &[u8]) -> Option<ImportSpec> {
    let callee = call.child_by_field_name("function")?;
    let is_loader = match callee.kind() {
        "import" => true,
        "identifier" => node_text(&callee, source) == Some("require"),
        _ => false,
    };
    if !is_loader {
        return None;
    }
    let args = call.child_by_field_name("arguments")?;
    let first = args.named_child(0)?;
    if first.kind() != "string" && first.kind() != "template_string" {
        return None;
    }
    Some(ImportSpec {
        specifier: strip_quotes(node_text(&first, source)?).to_string(),
        names: Vec::new(),
        line: line_of(call),
    })
}

/// Split a Rust `use` argument into its base path and listed names.
///
/// - `crate::a::b` -> (`crate::a::b`, [])
/// - `crate::a::{b, c as d}` -> (`crate::a`, [b, c])
/// - `super::a::*` -> (`super::a`, [*])
pub fn split_rust_use(path: &str) -> (String, Vec<String>) {
    let compact: String = path.split_whitespace().collect::<Vec<_>>().join(" ");
    if let Some(open) = compact.find('{') {
        let base = compact[..open].trim().trim_end_matches("::").to_string();
        let inner = &compact[open + 1..];
        let inner = &inner[..inner.rfind('}').unwrap_or(inner.len())];
        let names = inner
            .split(',')
            .filter_map(|item| item.split(" as ").next())
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();
        return (base, names);
    }
    if let Some(base) = compact.strip_suffix("::*") {
        return (base.trim().to_string(), vec!["*".to_string()]);
    }
    let base = compact.split(" as ").next().unwrap_or(&compact).trim();
    (base.to_string(), Vec::new())
}

/// `use` declarations and file-backed `mod foo;` items.
pub fn rust_imports(node: &tree_sitter::Node, source: &[u8]) -> Vec<ImportSpec> {
    let line = line_of(node);
    match node.kind() {
        "use_declaration" => {
            let Some(text) = node
                .child_by_field_name("argument")
                .and_then(|arg| node_text(&arg, source))
            else {
                return Vec::new();
            };
            let (specifier, names) = split_rust_use(text);
            vec![ImportSpec {
                specifier,
                names,
                line,
            }]
        }
        // Inline `mod foo { ... }` blocks are not imports
        "mod_item" if node.child_by_field_name("body").is_none() => {
            match node
                .child_by_field_name("name")
                .and_then(|n| node_text(&n, source))
            {
                Some(name) => vec![ImportSpec {
                    specifier: format!("self::{}", name),
                    names: Vec::new(),
                    line,
                }],
                None => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

/// `import a.b.C;`, `import static a.b.C.m;`, `import a.b.*;`.
pub fn java_imports(node: &tree_sitter::Node, source: &[u8]) -> Vec<ImportSpec> {
    let mut cursor = node.walk();
    let mut specifier = None;
    let mut wildcard = false;
    for child in node.children(&mut cursor) {
        match child.kind() {
            "scoped_identifier" | "identifier" => {
                specifier = node_text(&child, source).map(|s| s.to_string());
            }
            "asterisk" => wildcard = true,
            _ => {}
        }
    }
    match specifier {
        Some(specifier) => vec![ImportSpec {
            specifier,
            names: if wildcard {
                vec!["*".to_string()]
            } else {
                Vec::new()
            },
            line: line_of(node),
        }],
        None => Vec::new(),
    }
}

/// `#include "x.h"` keeps the bare path, `#include <x.h>` keeps its brackets.
pub fn c_includes(node: &tree_sitter::Node, source: &[u8]) -> Vec<ImportSpec> {
    let Some(path) = node.child_by_field_name("path") else {
        return Vec::new();
    };
    let Some(text) = node_text(&path, source) else {
        return Vec::new();
    };
    let specifier = if path.kind() == "system_lib_string" {
        text.trim().to_string()
    } else {
        strip_quotes(text).to_string()
    };
    vec![ImportSpec {
        specifier,
        names: Vec::new(),
        line: line_of(node),
    }]
}
