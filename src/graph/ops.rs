//! Per-file parsing and graph population.
//!
//! # Behavior
//! 1. Read the file (lossy UTF-8)
//! 2. Run the syntax extractor; imports always come from here
//! 3. When a session pool is supplied, ask the semantic backend for the
//!    outline; an empty outline is an answer, an error falls back to the
//!    syntax declarations and is recorded on the result
//! 4. [`add_parsed_file`] turns declarations into nodes and a range index;
//!    [`import_edges`] resolves imports once every file is known

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::module_resolver::{resolve_all, KnownFiles};
use super::range_index::RangeIndex;
use super::schema::{module_id, symbol_id, Edge, Node};
use super::{FileRecord, Graph};
use crate::ingest::rules::rules_for;
use crate::ingest::{Declaration, ImportSpec, Language, SymbolKind, SyntaxExtractor};
use crate::semantic::{detect_workspace_root, SessionPool, UnavailableReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlineSource {
    Semantic,
    Syntax,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub label: String,
    pub language: Language,
    pub declarations: Vec<Declaration>,
    pub imports: Vec<ImportSpec>,
    pub outline_source: OutlineSource,
    /// Why the semantic outline was not used, when one was requested
    pub fallback: Option<UnavailableReason>,
}

pub struct FileParser<'a> {
    pool: Option<&'a SessionPool>,
    repo_root: &'a Path,
    markers: &'a [String],
    extractor: SyntaxExtractor,
}

impl<'a> FileParser<'a> {
    /// Parser for files under `repo_root`. Without a pool every outline
    /// comes from the syntax extractor.
    pub fn new(pool: Option<&'a SessionPool>, repo_root: &'a Path, markers: &'a [String]) -> Self {
        Self {
            pool,
            repo_root,
            markers,
            extractor: SyntaxExtractor::new(),
        }
    }

    pub fn parse(&self, path: &Path, label: &str, language: Language) -> Result<ParsedFile> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let text = String::from_utf8_lossy(&bytes);
        let extraction = self.extractor.extract(&text, language);

        let mut parsed = ParsedFile {
            path: path.to_path_buf(),
            label: label.to_string(),
            language,
            declarations: extraction.declarations,
            imports: extraction.imports,
            outline_source: OutlineSource::Syntax,
            fallback: None,
        };

        if let Some(pool) = self.pool {
            let workspace = detect_workspace_root(path, self.repo_root, self.markers);
            match pool.with_session(language, &workspace, |session| session.outline(path)) {
                Ok(declarations) => {
                    parsed.declarations = declarations;
                    parsed.outline_source = OutlineSource::Semantic;
                }
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "semantic outline unavailable, using syntax");
                    parsed.fallback = Some(err.reason());
                }
            }
        }
        Ok(parsed)
    }
}

fn module_name(label: &str) -> String {
    let file = label.rsplit('/').next().unwrap_or(label);
    match file.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file.to_string(),
    }
}

fn nesting_depth(class_name: Option<&str>, separator: &str) -> usize {
    class_name.map_or(0, |c| c.matches(separator).count() + 1)
}

/// Add the module, class and function nodes of `parsed` to `graph`.
///
/// Classes are added outermost first so every member can name its parent;
/// a member whose class is not declared in the file hangs off the module.
/// Returns the number of nodes added.
pub fn add_parsed_file(graph: &mut Graph, parsed: &ParsedFile) -> usize {
    let label = parsed.label.as_str();
    let module = module_id(label);
    let separator = rules_for(parsed.language).separator.as_str();

    graph.add_file(FileRecord {
        label: label.to_string(),
        path: parsed.path.clone(),
        language: parsed.language,
        module_id: module.clone(),
    });
    graph.add_node(Node {
        id: module.clone(),
        kind: SymbolKind::Module,
        label: label.to_string(),
        name: module_name(label),
        class_name: None,
        file: label.to_string(),
        range: None,
        parent: None,
        snippet: String::new(),
    });

    let qualify = |decl: &Declaration| match &decl.class_name {
        Some(class) => format!("{}{}{}", class, separator, decl.name),
        None => decl.name.clone(),
    };

    let mut classes: Vec<&Declaration> = parsed
        .declarations
        .iter()
        .filter(|d| d.kind == SymbolKind::Class)
        .collect();
    classes.sort_by_key(|d| (nesting_depth(d.class_name.as_deref(), separator), d.range.start()));
    let functions = parsed
        .declarations
        .iter()
        .filter(|d| d.kind == SymbolKind::Function);

    let mut class_ids: HashMap<String, String> = HashMap::new();
    let mut ranges: Vec<(crate::ingest::SourceRange, String)> = Vec::new();
    let mut added = 1;

    for decl in classes.into_iter().chain(functions) {
        let id = symbol_id(label, decl.class_name.as_deref(), &decl.name, decl.range.start_line);
        let qualified = qualify(decl);
        let parent = decl
            .class_name
            .as_ref()
            .and_then(|class| class_ids.get(class))
            .cloned()
            .unwrap_or_else(|| module.clone());
        if decl.kind == SymbolKind::Class {
            class_ids.entry(qualified.clone()).or_insert_with(|| id.clone());
        }
        ranges.push((decl.range, id.clone()));
        graph.add_node(Node {
            id,
            kind: decl.kind,
            label: qualified,
            name: decl.name.clone(),
            class_name: decl.class_name.clone(),
            file: label.to_string(),
            range: Some(decl.range),
            parent: Some(parent),
            snippet: decl.snippet.clone(),
        });
        added += 1;
    }

    graph.set_range_index(label, RangeIndex::new(ranges));
    added
}

/// Module-to-module import edges of `parsed`.
///
/// Only targets in `known` produce edges. Returns the edges plus the
/// number of import statements that did and did not resolve.
pub fn import_edges(parsed: &ParsedFile, known: &KnownFiles) -> (Vec<Edge>, usize, usize) {
    let from = module_id(&parsed.label);
    let mut edges = Vec::new();
    let (mut resolved, mut unresolved) = (0, 0);
    for spec in &parsed.imports {
        let targets = resolve_all(spec, &parsed.label, parsed.language, known);
        if targets.is_empty() {
            unresolved += 1;
            continue;
        }
        resolved += 1;
        for target in targets {
            edges.push(Edge::import(from.clone(), module_id(&target)));
        }
    }
    (edges, resolved, unresolved)
}
