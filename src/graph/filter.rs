//! File filtering for the repository scanner.
//!
//! Rules are applied in a fixed order and the first match wins:
//! 1. Hard internal ignores (`.git/`, `node_modules/`, virtualenvs, ...)
//! 2. Gitignore-style rules (`.gitignore`, `.ignore` at the root)
//! 3. Language support
//! 4. Include globs (if any are configured)
//! 5. Exclude globs
//!
//! Same inputs always give the same answer.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Component, Path, PathBuf};
use tracing::warn;

use crate::diagnostics::SkipReason;
use crate::ingest::detect_language;

/// Directories never descended into.
pub const INTERNAL_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    ".venv",
    "venv",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    ".idea",
    ".vscode",
];

pub struct FileFilter {
    root: PathBuf,
    gitignore: Gitignore,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl FileFilter {
    /// Filter for `root` with optional include and exclude globs.
    ///
    /// Globs match repository-relative paths with `/` separators. An invalid
    /// glob is an error; an unreadable `.gitignore` is only logged.
    pub fn new(root: &Path, include: &[String], exclude: &[String]) -> Result<Self> {
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let gitignore = Self::load_gitignore(&root)?;
        Ok(Self {
            include: Self::compile_globs(include)?,
            exclude: Self::compile_globs(exclude)?,
            gitignore,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load_gitignore(root: &Path) -> Result<Gitignore> {
        let mut builder = GitignoreBuilder::new(root);
        for name in [".gitignore", ".ignore"] {
            let path = root.join(name);
            if path.exists() {
                if let Some(err) = builder.add(&path) {
                    warn!(path = %path.display(), error = %err, "failed to load ignore file");
                }
            }
        }
        builder.build().context("building gitignore matcher")
    }

    fn compile_globs(patterns: &[String]) -> Result<Option<GlobSet>> {
        if patterns.is_empty() {
            return Ok(None);
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .with_context(|| format!("invalid glob pattern '{}'", pattern))?;
            builder.add(glob);
        }
        Ok(Some(builder.build()?))
    }

    fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    fn has_internal_component(relative: &Path) -> bool {
        relative.components().any(|c| match c {
            Component::Normal(part) => part
                .to_str()
                .map(|p| INTERNAL_IGNORE_DIRS.contains(&p))
                .unwrap_or(false),
            _ => false,
        })
    }

    /// True for directories the walker should not enter.
    pub fn is_ignored_dir(&self, dir: &Path) -> bool {
        if dir == self.root {
            return false;
        }
        let relative = self.relative(dir);
        if Self::has_internal_component(relative) {
            return true;
        }
        // The gitignore matcher only accepts paths under its root
        relative != dir
            && self
                .gitignore
                .matched_path_or_any_parents(relative, true)
                .is_ignore()
    }

    /// Reason to skip `path`, or None when it should be parsed.
    pub fn should_skip(&self, path: &Path) -> Option<SkipReason> {
        if !path.is_file() {
            return Some(SkipReason::NotAFile);
        }
        let relative = self.relative(path);
        if Self::has_internal_component(relative) {
            return Some(SkipReason::IgnoredInternal);
        }
        if relative != path
            && self
                .gitignore
                .matched_path_or_any_parents(relative, false)
                .is_ignore()
        {
            return Some(SkipReason::IgnoredByGitignore);
        }
        if detect_language(path).is_none() {
            return Some(SkipReason::UnsupportedLanguage);
        }

        let label = relative.to_string_lossy().replace('\\', "/");
        if let Some(include) = &self.include {
            if !include.is_match(&label) {
                return Some(SkipReason::ExcludedByGlob);
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(&label) {
                return Some(SkipReason::ExcludedByGlob);
            }
        }
        None
    }
}
