//! Workspace root detection for language server sessions.

use std::path::{Path, PathBuf};

/// Nearest ancestor of `file` (up to and including `repo_root`) holding one
/// of `markers`, or `repo_root` when none does.
///
/// Files outside `repo_root` also get `repo_root`, so a session is never
/// rooted above the repository being indexed.
pub fn detect_workspace_root(file: &Path, repo_root: &Path, markers: &[String]) -> PathBuf {
    if !file.starts_with(repo_root) {
        return repo_root.to_path_buf();
    }
    let mut dir = file.parent();
    while let Some(candidate) = dir {
        if markers.iter().any(|m| candidate.join(m).exists()) {
            return candidate.to_path_buf();
        }
        if candidate == repo_root {
            break;
        }
        dir = candidate.parent();
    }
    repo_root.to_path_buf()
}
