//! Import resolution against the set of scanned files
//!
//! Every resolver maps one [`ImportSpec`] from an importing file to the
//! labels of local files it names. Labels are repository-relative with `/`
//! separators. A resolver only ever returns labels present in
//! [`KnownFiles`], so import edges never leave the scanned repository.
//!
//! Rust paths go through a module index (`crate::a::b` -> `src/a/b.rs`)
//! built once from the known `.rs` files, grouped per crate root (the
//! nearest `src/` directory).

use std::collections::{BTreeSet, HashMap};

use crate::ingest::rules::rules_for;
use crate::ingest::{ImportSpec, Language};

const PYTHON_SOURCE_DIRS: &[&str] = &["", "src"];
const JS_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Labels of every file found by the scan, plus derived lookup tables.
#[derive(Debug, Clone, Default)]
pub struct KnownFiles {
    labels: BTreeSet<String>,
    /// (crate root, module path) -> label
    rust_modules: HashMap<(String, String), String>,
}

impl KnownFiles {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: BTreeSet<String> = labels.into_iter().map(Into::into).collect();
        let mut rust_modules = HashMap::new();
        for label in labels.iter().filter(|l| l.ends_with(".rs")) {
            let (root, module) = rust_module_path(label);
            rust_modules.insert((root, module), label.clone());
        }
        Self {
            labels,
            rust_modules,
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    fn rust_module(&self, root: &str, module: &str) -> Option<&String> {
        self.rust_modules
            .get(&(root.to_string(), module.to_string()))
    }
}

/// Directory part of a label, `""` at the repository root.
fn dir_of(label: &str) -> &str {
    label.rfind('/').map(|i| &label[..i]).unwrap_or("")
}

/// Join `rel` onto `dir`, folding `.` and `..`.
///
/// Returns None when the path climbs above the repository root.
pub fn join_label(dir: &str, rel: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in rel.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

fn push_known(out: &mut Vec<String>, known: &KnownFiles, candidate: &str) {
    if known.contains(candidate) && !out.iter().any(|l| l == candidate) {
        out.push(candidate.to_string());
    }
}

// Python

fn python_module(known: &KnownFiles, base: &str) -> Option<String> {
    let candidates = if base.is_empty() {
        vec!["__init__.py".to_string()]
    } else {
        vec![
            format!("{}.py", base),
            format!("{}.pyi", base),
            format!("{}/__init__.py", base),
        ]
    };
    candidates.into_iter().find(|c| known.contains(c))
}

/// `import a.b`, `from .pkg import mod`, `from .. import x`.
pub fn resolve_python(spec: &ImportSpec, importing: &str, known: &KnownFiles) -> Vec<String> {
    let dots = spec.specifier.chars().take_while(|c| *c == '.').count();
    let rest = spec.specifier[dots..].replace('.', "/");

    let bases: Vec<String> = if dots > 0 {
        let mut dir = dir_of(importing).to_string();
        for _ in 1..dots {
            match join_label(&dir, "..") {
                Some(parent) => dir = parent,
                None => return Vec::new(),
            }
        }
        join_label(&dir, &rest).into_iter().collect()
    } else {
        let mut bases: Vec<String> = Vec::new();
        for root in PYTHON_SOURCE_DIRS
            .iter()
            .map(|r| r.to_string())
            .chain(std::iter::once(dir_of(importing).to_string()))
        {
            if let Some(base) = join_label(&root, &rest) {
                if !bases.contains(&base) {
                    bases.push(base);
                }
            }
        }
        bases
    };

    let mut out = Vec::new();
    for base in bases {
        for name in spec.names.iter().filter(|n| n.as_str() != "*") {
            let sub = join_label(&base, name).unwrap_or_default();
            if let Some(label) = python_module(known, &sub) {
                push_known(&mut out, known, &label);
            }
        }
        if let Some(label) = python_module(known, &base) {
            push_known(&mut out, known, &label);
        }
        // First source root that knows the module wins
        if !out.is_empty() {
            break;
        }
    }
    out
}

// JavaScript / TypeScript

/// Relative specifiers only; bare package names never resolve.
pub fn resolve_js(spec: &ImportSpec, importing: &str, known: &KnownFiles) -> Vec<String> {
    let specifier = spec.specifier.as_str();
    if !(specifier.starts_with("./") || specifier.starts_with("../")) {
        return Vec::new();
    }
    let Some(base) = join_label(dir_of(importing), specifier) else {
        return Vec::new();
    };

    let mut candidates = vec![base.clone()];
    for ext in JS_EXTENSIONS {
        candidates.push(format!("{}.{}", base, ext));
    }
    for ext in JS_EXTENSIONS {
        candidates.push(format!("{}/index.{}", base, ext));
    }
    // `./util.js` written against a TypeScript source
    for js_ext in [".js", ".jsx", ".mjs", ".cjs"] {
        if let Some(stem) = base.strip_suffix(js_ext) {
            candidates.push(format!("{}.ts", stem));
            candidates.push(format!("{}.tsx", stem));
        }
    }

    candidates
        .into_iter()
        .find(|c| known.contains(c))
        .into_iter()
        .collect()
}

// Rust

/// Crate root directory (through the nearest `src/`) and module path.
///
/// Examples:
/// - "src/lib.rs" -> ("src", "crate")
/// - "src/foo/mod.rs" -> ("src", "crate::foo")
/// - "crates/x/src/a/b.rs" -> ("crates/x/src", "crate::a::b")
pub fn rust_module_path(label: &str) -> (String, String) {
    let segments: Vec<&str> = label.split('/').collect();
    let src_at = segments.iter().rposition(|s| *s == "src");
    let (root, rel) = match src_at {
        Some(i) => (segments[..=i].join("/"), &segments[i + 1..]),
        None => (String::new(), &segments[..]),
    };

    let mut module = vec!["crate".to_string()];
    for (i, segment) in rel.iter().enumerate() {
        let last = i + 1 == rel.len();
        if !last {
            module.push(segment.to_string());
            continue;
        }
        let stem = segment.strip_suffix(".rs").unwrap_or(segment);
        let is_root_file = i == 0 && (stem == "lib" || stem == "main");
        if stem != "mod" && !is_root_file {
            module.push(stem.to_string());
        }
    }
    (root, module.join("::"))
}

/// Longest known module prefix of `path` within `root`, at least `min_len`
/// segments long.
fn longest_rust_module(
    known: &KnownFiles,
    root: &str,
    path: &[String],
    min_len: usize,
) -> Option<String> {
    (min_len.max(1)..=path.len())
        .rev()
        .find_map(|n| known.rust_module(root, &path[..n].join("::")))
        .cloned()
}

/// `use crate::a::{b, c}`, `use super::x`, `mod y;` (as `self::y`).
pub fn resolve_rust(spec: &ImportSpec, importing: &str, known: &KnownFiles) -> Vec<String> {
    let (root, current) = rust_module_path(importing);
    let mut segments: Vec<String> = spec
        .specifier
        .split("::")
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if segments.is_empty() {
        return Vec::new();
    }

    let current: Vec<String> = current.split("::").map(str::to_string).collect();
    // Plain paths are mostly external crates: never fall back to the crate root
    let min_len = match segments[0].as_str() {
        "crate" | "self" | "super" => 1,
        _ => 2,
    };
    let absolute: Vec<String> = match segments[0].as_str() {
        "crate" => segments,
        "self" => {
            segments.remove(0);
            current.iter().cloned().chain(segments).collect()
        }
        "super" => {
            let mut base = current.clone();
            while segments.first().map(String::as_str) == Some("super") {
                segments.remove(0);
                if base.len() <= 1 {
                    return Vec::new();
                }
                base.pop();
            }
            base.into_iter().chain(segments).collect()
        }
        _ => std::iter::once("crate".to_string()).chain(segments).collect(),
    };

    let mut out = Vec::new();
    let members: Vec<&String> = spec
        .names
        .iter()
        .filter(|n| n.as_str() != "*" && n.as_str() != "self")
        .collect();
    for name in &members {
        let mut path = absolute.clone();
        path.push((*name).clone());
        if let Some(label) = longest_rust_module(known, &root, &path, min_len) {
            push_known(&mut out, known, &label);
        }
    }
    if members.is_empty() || spec.names.iter().any(|n| n == "*" || n == "self") {
        if let Some(label) = longest_rust_module(known, &root, &absolute, min_len) {
            push_known(&mut out, known, &label);
        }
    }
    // A bare `use crate::Item;` from lib.rs would point at itself
    out.retain(|l| l != importing);
    out
}

// Java

fn java_by_suffix(known: &KnownFiles, path: &str) -> Vec<String> {
    let file = format!("{}.java", path);
    let suffix = format!("/{}", file);
    known
        .iter()
        .filter(|l| *l == file || l.ends_with(&suffix))
        .map(str::to_string)
        .collect()
}

/// `a.b.C` matched by path suffix; `a.b.*` takes the package's files;
/// static imports fall back to the declaring class.
pub fn resolve_java(spec: &ImportSpec, _importing: &str, known: &KnownFiles) -> Vec<String> {
    let path = spec.specifier.replace('.', "/");
    if spec.names.iter().any(|n| n == "*") {
        let package = format!("{}/", path);
        return known
            .iter()
            .filter(|l| l.ends_with(".java"))
            .filter(|l| {
                let dir = format!("{}/", dir_of(l));
                dir == package || dir.ends_with(&format!("/{}", package))
            })
            .map(str::to_string)
            .collect();
    }

    let direct = java_by_suffix(known, &path);
    if !direct.is_empty() {
        return direct;
    }
    match path.rfind('/') {
        Some(i) => java_by_suffix(known, &path[..i]),
        None => Vec::new(),
    }
}

// C / C++

/// Quoted includes: next to the includer, then from the repository root.
pub fn resolve_c(spec: &ImportSpec, importing: &str, known: &KnownFiles) -> Vec<String> {
    if spec.specifier.starts_with('<') {
        return Vec::new();
    }
    [dir_of(importing), ""]
        .iter()
        .filter_map(|dir| join_label(dir, &spec.specifier))
        .find(|c| known.contains(c))
        .into_iter()
        .collect()
}

/// All local files `spec` names, using `language`'s rules.
///
/// Results are deduplicated, exclude the importing file and are always
/// members of `known`.
pub fn resolve_all(
    spec: &ImportSpec,
    importing: &str,
    language: Language,
    known: &KnownFiles,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in (rules_for(language).resolve_import)(spec, importing, known) {
        if label != importing && known.contains(&label) && !out.contains(&label) {
            out.push(label);
        }
    }
    out
}

/// First local file `spec` names, if any.
pub fn resolve(
    spec: &ImportSpec,
    importing: &str,
    language: Language,
    known: &KnownFiles,
) -> Option<String> {
    resolve_all(spec, importing, language, known).into_iter().next()
}
