//! Thread-local parser pool for reusing tree-sitter Parser instances.
//!
//! Creating a parser and loading a grammar for every file is wasted work
//! during a repository scan. Each thread keeps one parser per language,
//! created lazily on first use.
//!
//! # Design
//!
//! - Thread-local storage: no locks, rayon workers each own their parsers
//! - Lazy initialization: a grammar is loaded the first time a thread needs it
//! - Keyed by [`Language`], so adding a language only touches [`grammar`]

use crate::ingest::detect::Language;
use anyhow::Result;
use std::cell::RefCell;
use std::collections::HashMap;

thread_local! {
    static PARSERS: RefCell<HashMap<Language, tree_sitter::Parser>> = RefCell::new(HashMap::new());
}

/// tree-sitter grammar for a language.
pub fn grammar(language: Language) -> tree_sitter::Language {
    match language {
        Language::Python => tree_sitter_python::language(),
        Language::JavaScript => tree_sitter_javascript::language(),
        Language::TypeScript => tree_sitter_typescript::language_typescript(),
        Language::Tsx => tree_sitter_typescript::language_tsx(),
        Language::Rust => tree_sitter_rust::language(),
        Language::Java => tree_sitter_java::language(),
        Language::C => tree_sitter_c::language(),
        Language::Cpp => tree_sitter_cpp::language(),
    }
}

/// Execute a function with the calling thread's parser for `language`.
///
/// # Returns
///
/// The result of the closure, or an error if the grammar could not be loaded
/// (ABI mismatch between the grammar crate and tree-sitter).
///
/// # Example
///
/// ```rust
/// use codegraph_core::ingest::pool::with_parser;
/// use codegraph_core::Language;
///
/// let parsed = with_parser(Language::Python, |parser| parser.parse(b"x = 1", None).is_some());
/// assert!(parsed.unwrap());
/// ```
pub fn with_parser<F, R>(language: Language, f: F) -> Result<R>
where
    F: FnOnce(&mut tree_sitter::Parser) -> R,
{
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        if !parsers.contains_key(&language) {
            let mut parser = tree_sitter::Parser::new();
            parser.set_language(&grammar(language))?;
            parsers.insert(language, parser);
        }
        match parsers.get_mut(&language) {
            Some(parser) => Ok(f(parser)),
            None => Err(anyhow::anyhow!("parser for {} missing after initialization", language)),
        }
    })
}

/// Parse `source` with the pooled parser for `language`.
///
/// Returns None when the grammar cannot be loaded or parsing was aborted.
pub fn parse(language: Language, source: &[u8]) -> Option<tree_sitter::Tree> {
    with_parser(language, |parser| parser.parse(source, None))
        .ok()
        .flatten()
}
