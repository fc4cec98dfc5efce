//! Table-driven tree walker shared by every language.
//!
//! Walks a tree-sitter tree once and collects declarations, imports and call
//! sites according to a [`LanguageRules`] entry. Declarations are only taken
//! at function depth zero: top-level functions, classes and methods of
//! top-level classes. Call sites and imports are taken at any depth.

use crate::common::{node_text, snippet_lines};
use crate::ingest::imports::js_call_import;
use crate::ingest::pool;
use crate::ingest::rules::{LanguageRules, FUNCTION_VALUE_KINDS};
use crate::ingest::{
    CallSite, Declaration, Extraction, Language, ScopeStack, SourceRange, SymbolKind,
};

/// Lines of source kept as a declaration snippet.
pub const SNIPPET_LINES: usize = 12;

/// Extract everything `rules` describes from `text`.
pub fn extract(text: &str, rules: &LanguageRules) -> Extraction {
    let source = text.as_bytes();
    let Some(tree) = pool::parse(rules.language, source) else {
        return Extraction::default();
    };

    let mut walker = Walker {
        rules,
        text,
        source,
        scope: ScopeStack::new(rules.separator),
        out: Extraction::default(),
    };
    walker.run(tree.root_node());
    walker.out
}

struct Walker<'a> {
    rules: &'a LanguageRules,
    text: &'a str,
    source: &'a [u8],
    scope: ScopeStack,
    out: Extraction,
}

/// Pending walker work. Trees nest one level per operand of a long
/// operator chain, so traversal keeps its own stack.
enum Step<'t> {
    Visit(tree_sitter::Node<'t>, usize),
    LeaveScope,
}

/// Queue `node`'s children so they pop in source order.
fn push_children<'t>(node: &tree_sitter::Node<'t>, fn_depth: usize, stack: &mut Vec<Step<'t>>) {
    let start = stack.len();
    let mut cursor = node.walk();
    stack.extend(node.children(&mut cursor).map(|child| Step::Visit(child, fn_depth)));
    stack[start..].reverse();
}

impl<'a> Walker<'a> {
    fn run(&mut self, root: tree_sitter::Node<'_>) {
        let mut stack = vec![Step::Visit(root, 0)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Visit(node, fn_depth) => self.visit(&node, fn_depth, &mut stack),
                Step::LeaveScope => {
                    self.scope.pop();
                }
            }
        }
    }

    /// Enter a named scope until every child queued after it is done.
    fn enter_scope<'t>(
        &mut self,
        name: String,
        node: &tree_sitter::Node<'t>,
        fn_depth: usize,
        stack: &mut Vec<Step<'t>>,
    ) {
        self.scope.push(name);
        stack.push(Step::LeaveScope);
        push_children(node, fn_depth, stack);
    }

    fn visit<'t>(&mut self, node: &tree_sitter::Node<'t>, fn_depth: usize, stack: &mut Vec<Step<'t>>) {
        let kind = node.kind();

        if self.rules.is_class(kind) && self.is_class_definition(node) {
            if fn_depth == 0 {
                if let Some(name) = self.field_text(node, "name") {
                    self.declare(SymbolKind::Class, name.clone(), self.scope.current(), node);
                    self.enter_scope(name, node, fn_depth, stack);
                    return;
                }
            }
            push_children(node, fn_depth, stack);
            return;
        }

        if self.rules.is_scope(kind) {
            if let Some(name) = self.impl_type_name(node) {
                self.enter_scope(name, node, fn_depth, stack);
                return;
            }
        }

        if self.rules.is_function(kind) {
            if fn_depth == 0 {
                if let Some((name, qualifier)) = self.function_name(node) {
                    let class_name = self.scope.current().or(qualifier);
                    self.declare(SymbolKind::Function, name, class_name, node);
                }
            }
            push_children(node, fn_depth + 1, stack);
            return;
        }

        if self.rules.bound_function_values && kind == "variable_declarator" {
            if let Some(name) = self.bound_function_name(node) {
                if fn_depth == 0 {
                    self.declare(SymbolKind::Function, name, self.scope.current(), node);
                }
                push_children(node, fn_depth + 1, stack);
                return;
            }
        }

        if self.rules.is_import(kind) {
            let specs = (self.rules.extract_import)(node, self.source);
            self.out.imports.extend(specs);
        }

        if self.rules.is_call(kind) {
            self.record_call(node);
        }

        push_children(node, fn_depth, stack);
    }

    fn declare(
        &mut self,
        kind: SymbolKind,
        name: String,
        class_name: Option<String>,
        node: &tree_sitter::Node,
    ) {
        let range = SourceRange::from_node(node);
        let snippet = snippet_lines(self.text, range.start_line, range.end_line, SNIPPET_LINES);
        self.out.declarations.push(Declaration {
            kind,
            name,
            class_name,
            range,
            snippet,
        });
    }

    fn field_text(&self, node: &tree_sitter::Node, field: &str) -> Option<String> {
        let child = node.child_by_field_name(field)?;
        node_text(&child, self.source).map(|s| s.to_string())
    }

    fn is_class_definition(&self, node: &tree_sitter::Node) -> bool {
        !self.rules.class_requires_body || node.child_by_field_name("body").is_some()
    }

    /// `impl<T> Foo<T>` and `impl Trait for Foo` both name `Foo`.
    fn impl_type_name(&self, node: &tree_sitter::Node) -> Option<String> {
        let text = self.field_text(node, "type")?;
        let base = text.split('<').next().unwrap_or(&text).trim();
        let base = base.rsplit("::").next().unwrap_or(base);
        if base.is_empty() {
            None
        } else {
            Some(base.to_string())
        }
    }

    /// Function name plus an out-of-line class qualifier (`void T::m()`).
    fn function_name(&self, node: &tree_sitter::Node) -> Option<(String, Option<String>)> {
        if !self.rules.declarator_names {
            return self.field_text(node, "name").map(|name| (name, None));
        }
        let mut current = node.child_by_field_name("declarator")?;
        loop {
            match current.kind() {
                "identifier" | "field_identifier" | "destructor_name" | "operator_name" => {
                    return node_text(&current, self.source).map(|s| (s.to_string(), None));
                }
                "qualified_identifier" => {
                    let scope = current
                        .child_by_field_name("scope")
                        .and_then(|s| node_text(&s, self.source))
                        .map(|s| s.to_string());
                    let name = current.child_by_field_name("name")?;
                    if name.kind() == "qualified_identifier" {
                        current = name;
                        continue;
                    }
                    return node_text(&name, self.source).map(|s| (s.to_string(), scope));
                }
                _ => {
                    current = current.child_by_field_name("declarator")?;
                }
            }
        }
    }

    fn bound_function_name(&self, node: &tree_sitter::Node) -> Option<String> {
        let value = node.child_by_field_name("value")?;
        if !FUNCTION_VALUE_KINDS.contains(&value.kind()) {
            return None;
        }
        let name = node.child_by_field_name("name")?;
        if name.kind() != "identifier" {
            return None;
        }
        node_text(&name, self.source).map(|s| s.to_string())
    }

    fn record_call(&mut self, call: &tree_sitter::Node) {
        if matches!(
            self.rules.language,
            Language::JavaScript | Language::TypeScript | Language::Tsx
        ) {
            if let Some(spec) = js_call_import(call, self.source) {
                self.out.imports.push(spec);
                return;
            }
        }

        let Some(mut callee) = call.child_by_field_name(self.rules.callee_field) else {
            return;
        };
        'reduce: loop {
            for field in self.rules.member_fields {
                if let Some(next) = callee.child_by_field_name(field) {
                    callee = next;
                    continue 'reduce;
                }
            }
            break;
        }

        // Only plain tokens are call targets; `f()()` or `(a || b)()` are skipped
        if callee.named_child_count() > 0 {
            return;
        }
        let Some(name) = node_text(&callee, self.source) else {
            return;
        };
        let position = callee.start_position();
        self.out.call_sites.push(CallSite {
            line: position.row + 1,
            column: position.column,
            name: name.to_string(),
        });
    }
}
