//! Repository scanning: which files a parse covers.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::filter::FileFilter;
use super::symbol_index::FileTask;
use crate::common::file_label;
use crate::config::ScanConfig;
use crate::diagnostics::SkipReason;
use crate::ingest::detect_language;

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Canonical repository root
    pub root: PathBuf,
    /// Accepted files in label order
    pub files: Vec<FileTask>,
    pub skipped: BTreeMap<SkipReason, usize>,
}

impl ScanResult {
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.label.as_str())
    }
}

/// Walk `root` and collect every parseable source file.
///
/// # Guarantees
/// - Ignored directories are pruned, never descended into
/// - Files over `max_file_size` bytes are skipped as `TooLarge`
/// - Output order is sorted by label, independent of directory order
pub fn scan_repository(root: &Path, config: &ScanConfig) -> Result<ScanResult> {
    let filter = FileFilter::new(root, &config.include, &config.exclude)
        .with_context(|| format!("building file filter for {}", root.display()))?;
    let root = filter.root().to_path_buf();

    let mut result = ScanResult {
        root: root.clone(),
        ..ScanResult::default()
    };

    let walker = WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && filter.is_ignored_dir(entry.path())));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(error = %err, "skipping unreadable directory entry");
                *result.skipped.entry(SkipReason::Unreadable).or_insert(0) += 1;
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path();
        if let Some(reason) = filter.should_skip(path) {
            // Non-source files are the common case and not worth a log line
            if reason != SkipReason::UnsupportedLanguage {
                debug!(path = %path.display(), %reason, "skipped");
            }
            *result.skipped.entry(reason).or_insert(0) += 1;
            continue;
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(_) => {
                *result.skipped.entry(SkipReason::Unreadable).or_insert(0) += 1;
                continue;
            }
        };
        if size > config.max_file_size {
            debug!(path = %path.display(), size, "file too large");
            *result.skipped.entry(SkipReason::TooLarge).or_insert(0) += 1;
            continue;
        }

        let (Some(label), Some(language)) = (file_label(&root, path), detect_language(path)) else {
            continue;
        };
        result.files.push(FileTask {
            path: path.to_path_buf(),
            label,
            language,
        });
    }

    result.files.sort_by(|a, b| a.label.cmp(&b.label));
    info!(
        root = %root.display(),
        files = result.files.len(),
        skipped = result.skipped.values().sum::<usize>(),
        "scanned repository"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Language;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        fs::write(root.join("pkg/z.py"), "def z(): pass").unwrap();
        fs::write(root.join("a.ts"), "export function a() {}").unwrap();
        fs::write(root.join("README.md"), "# readme").unwrap();
        fs::write(root.join("node_modules/dep/index.js"), "x()").unwrap();

        let result = scan_repository(root, &ScanConfig::default()).unwrap();
        let labels: Vec<&str> = result.labels().collect();
        assert_eq!(labels, vec!["a.ts", "pkg/z.py"]);
        assert_eq!(result.files[1].language, Language::Python);
        assert_eq!(result.skipped.get(&SkipReason::UnsupportedLanguage), Some(&1));
        // Pruned directories contribute nothing, not even skip counts
        assert_eq!(result.skipped.get(&SkipReason::IgnoredInternal), None);
    }

    #[test]
    fn test_oversize_files_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("big.py"), "x = 1\n".repeat(100)).unwrap();
        fs::write(dir.path().join("small.py"), "x = 1\n").unwrap();

        let config = ScanConfig {
            max_file_size: 64,
            ..ScanConfig::default()
        };
        let result = scan_repository(dir.path(), &config).unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].label, "small.py");
        assert_eq!(result.skipped.get(&SkipReason::TooLarge), Some(&1));
    }

    #[test]
    fn test_empty_repository() {
        let dir = TempDir::new().unwrap();
        let result = scan_repository(dir.path(), &ScanConfig::default()).unwrap();
        assert!(result.files.is_empty());
        assert!(result.skipped.is_empty());
    }
}
