//! Map language server symbol outlines onto [`Declaration`]s.
//!
//! Nesting follows the syntax extractor: classes and functions are reported
//! at function depth zero, methods carry their class path, and anything
//! declared inside a function is dropped. Positions arrive as 0-based lines
//! and UTF-16 columns and leave as 1-based lines and byte columns.

use lsp_types::{DocumentSymbol, DocumentSymbolResponse, SymbolInformation, SymbolKind as LspKind};
use std::collections::HashSet;

use crate::common::{line_at, snippet_lines, utf16_to_byte_col};
use crate::ingest::extract::SNIPPET_LINES;
use crate::ingest::rules::rules_for;
use crate::ingest::{Declaration, Language, SourceRange, SymbolKind};

enum Role {
    Class,
    Function,
    /// Modules and namespaces: transparent
    Container,
    /// rust-analyzer reports `impl Foo` blocks as objects
    Impl(String),
    Other,
}

fn role(kind: LspKind, name: &str) -> Role {
    if kind == LspKind::CLASS
        || kind == LspKind::STRUCT
        || kind == LspKind::INTERFACE
        || kind == LspKind::ENUM
    {
        Role::Class
    } else if kind == LspKind::FUNCTION || kind == LspKind::METHOD || kind == LspKind::CONSTRUCTOR {
        Role::Function
    } else if kind == LspKind::MODULE || kind == LspKind::NAMESPACE || kind == LspKind::PACKAGE {
        Role::Container
    } else if let Some(target) = name
        .strip_prefix("impl")
        .filter(|rest| rest.starts_with(' ') || rest.starts_with('<'))
    {
        match impl_target(target) {
            Some(ty) => Role::Impl(ty),
            None => Role::Other,
        }
    } else {
        Role::Other
    }
}

/// `Trait for Foo<T>` and `<T> Foo<T>` both give `Foo`.
fn impl_target(text: &str) -> Option<String> {
    let mut rest = text.trim();
    if rest.starts_with('<') {
        let close = rest.find('>')?;
        rest = rest[close + 1..].trim();
    }
    if let Some((_, ty)) = rest.split_once(" for ") {
        rest = ty.trim();
    }
    let base = rest.split('<').next().unwrap_or(rest).trim();
    let base = base.rsplit("::").next().unwrap_or(base);
    if base.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}

struct Converter<'a> {
    text: &'a str,
    separator: &'static str,
    out: Vec<Declaration>,
}

impl<'a> Converter<'a> {
    fn range(&self, range: &lsp_types::Range) -> SourceRange {
        let convert = |pos: &lsp_types::Position| {
            let line = pos.line as usize + 1;
            let text = line_at(self.text, line).unwrap_or("");
            (line, utf16_to_byte_col(text, pos.character))
        };
        let (start_line, start_col) = convert(&range.start);
        let (end_line, end_col) = convert(&range.end);
        SourceRange::new(start_line, start_col, end_line, end_col)
    }

    fn push(&mut self, kind: SymbolKind, name: &str, class_name: Option<String>, range: SourceRange) {
        let snippet = snippet_lines(self.text, range.start_line, range.end_line, SNIPPET_LINES);
        self.out.push(Declaration {
            kind,
            name: name.to_string(),
            class_name,
            range,
            snippet,
        });
    }

    fn qualify(&self, class_name: &Option<String>, name: &str) -> String {
        match class_name {
            Some(outer) => format!("{}{}{}", outer, self.separator, name),
            None => name.to_string(),
        }
    }

    fn nested(&mut self, symbols: &[DocumentSymbol], class_name: Option<String>) {
        for symbol in symbols {
            let children = symbol.children.as_deref().unwrap_or(&[]);
            match role(symbol.kind, &symbol.name) {
                Role::Class => {
                    let range = self.range(&symbol.range);
                    self.push(SymbolKind::Class, &symbol.name, class_name.clone(), range);
                    let inner = self.qualify(&class_name, &symbol.name);
                    self.nested(children, Some(inner));
                }
                Role::Function => {
                    let range = self.range(&symbol.range);
                    self.push(SymbolKind::Function, &symbol.name, class_name.clone(), range);
                }
                Role::Container => self.nested(children, class_name.clone()),
                Role::Impl(target) => self.nested(children, Some(target)),
                Role::Other => {}
            }
        }
    }

    fn flat(&mut self, symbols: &[SymbolInformation]) {
        let classes: HashSet<&str> = symbols
            .iter()
            .filter(|s| matches!(role(s.kind, &s.name), Role::Class))
            .map(|s| s.name.as_str())
            .collect();
        let functions: HashSet<&str> = symbols
            .iter()
            .filter(|s| matches!(role(s.kind, &s.name), Role::Function))
            .map(|s| s.name.as_str())
            .collect();

        for symbol in symbols {
            let container = symbol.container_name.as_deref().filter(|c| !c.is_empty());
            // Declared inside a function
            if container.map(|c| functions.contains(c)).unwrap_or(false) {
                continue;
            }
            let class_name = container
                .filter(|c| classes.contains(c))
                .map(|c| c.to_string());
            let kind = match role(symbol.kind, &symbol.name) {
                Role::Class => SymbolKind::Class,
                Role::Function => SymbolKind::Function,
                _ => continue,
            };
            let range = self.range(&symbol.location.range);
            self.push(kind, &symbol.name, class_name, range);
        }
    }
}

/// Convert a `textDocument/documentSymbol` response for a file with `text`.
pub fn declarations_from_response(
    response: DocumentSymbolResponse,
    language: Language,
    text: &str,
) -> Vec<Declaration> {
    let mut converter = Converter {
        text,
        separator: rules_for(language).separator.as_str(),
        out: Vec::new(),
    };
    match response {
        DocumentSymbolResponse::Nested(symbols) => converter.nested(&symbols, None),
        DocumentSymbolResponse::Flat(symbols) => converter.flat(&symbols),
    }
    converter.out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pos(line: u32, character: u32) -> serde_json::Value {
        json!({"line": line, "character": character})
    }

    fn range(l0: u32, c0: u32, l1: u32, c1: u32) -> serde_json::Value {
        json!({"start": pos(l0, c0), "end": pos(l1, c1)})
    }

    #[test]
    fn test_nested_outline_skips_function_locals() {
        let text = "class Store:\n    def save(self):\n        def inner(): pass\n\ndef main():\n    pass\n";
        let response: DocumentSymbolResponse = serde_json::from_value(json!([
            {"name": "Store", "kind": 5, "range": range(0, 0, 2, 25), "selectionRange": range(0, 6, 0, 11),
             "children": [
                {"name": "save", "kind": 6, "range": range(1, 4, 2, 25), "selectionRange": range(1, 8, 1, 12),
                 "children": [
                    {"name": "inner", "kind": 12, "range": range(2, 8, 2, 25), "selectionRange": range(2, 12, 2, 17)}
                 ]}
             ]},
            {"name": "main", "kind": 12, "range": range(4, 0, 5, 8), "selectionRange": range(4, 4, 4, 8)},
            {"name": "CONSTANT", "kind": 14, "range": range(6, 0, 6, 5), "selectionRange": range(6, 0, 6, 5)}
        ]))
        .unwrap();

        let decls = declarations_from_response(response, Language::Python, text);
        let summary: Vec<(SymbolKind, Option<&str>, &str)> = decls
            .iter()
            .map(|d| (d.kind, d.class_name.as_deref(), d.name.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (SymbolKind::Class, None, "Store"),
                (SymbolKind::Function, Some("Store"), "save"),
                (SymbolKind::Function, None, "main"),
            ]
        );
        assert_eq!(decls[1].range.start_line, 2);
        assert_eq!(decls[1].range.start_col, 4);
    }

    #[test]
    fn test_rust_impl_blocks_give_class_context() {
        let text = "struct A;\nimpl<T> Trait for A {\n    fn go(&self) {}\n}\n";
        let response: DocumentSymbolResponse = serde_json::from_value(json!([
            {"name": "A", "kind": 23, "range": range(0, 0, 0, 9), "selectionRange": range(0, 7, 0, 8)},
            {"name": "impl<T> Trait for A", "kind": 19, "range": range(1, 0, 3, 1), "selectionRange": range(1, 0, 1, 4),
             "children": [
                {"name": "go", "kind": 6, "range": range(2, 4, 2, 19), "selectionRange": range(2, 7, 2, 9)}
             ]}
        ]))
        .unwrap();
        let decls = declarations_from_response(response, Language::Rust, text);
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[1].name, "go");
        assert_eq!(decls[1].class_name.as_deref(), Some("A"));
    }

    #[test]
    fn test_impl_target_parsing() {
        assert_eq!(impl_target("Foo").as_deref(), Some("Foo"));
        assert_eq!(impl_target("<T> Foo<T>").as_deref(), Some("Foo"));
        assert_eq!(impl_target("fmt::Display for a::Bar").as_deref(), Some("Bar"));
    }

    #[test]
    fn test_flat_outline_uses_container_names() {
        let text = "class K:\n    def m(self): pass\n";
        let response: DocumentSymbolResponse = serde_json::from_value(json!([
            {"name": "K", "kind": 5, "location": {"uri": "file:///tmp/k.py", "range": range(0, 0, 1, 21)}},
            {"name": "m", "kind": 6, "containerName": "K",
             "location": {"uri": "file:///tmp/k.py", "range": range(1, 4, 1, 21)}}
        ]))
        .unwrap();
        let decls = declarations_from_response(response, Language::Python, text);
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[1].class_name.as_deref(), Some("K"));
    }

    #[test]
    fn test_utf16_columns_converted_to_bytes() {
        let text = "x = 'é'; def f(): pass\n";
        let response: DocumentSymbolResponse = serde_json::from_value(json!([
            {"name": "f", "kind": 12, "range": range(0, 9, 0, 22), "selectionRange": range(0, 13, 0, 14)}
        ]))
        .unwrap();
        let decls = declarations_from_response(response, Language::Python, text);
        // 'é' is one UTF-16 unit but two bytes
        assert_eq!(decls[0].range.start_col, 10);
    }
}
