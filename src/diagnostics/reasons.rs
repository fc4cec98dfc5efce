//! Skip and stop reasons with a deterministic reporting order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Reason why a file was left out of a scan.
///
/// Each variant represents a deterministic decision point in the filtering pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// File is not a regular file (directory, symlink, etc.)
    NotAFile,
    /// No grammar registered for the extension
    UnsupportedLanguage,
    /// Internal hard-coded ignore rules (.git/, target/, node_modules/, etc.)
    IgnoredInternal,
    /// Matched by gitignore-style rules (.gitignore, .ignore)
    IgnoredByGitignore,
    /// Excluded by an include/exclude glob
    ExcludedByGlob,
    /// Larger than the configured size limit
    TooLarge,
    /// Could not be read or is not UTF-8
    Unreadable,
}

impl SkipReason {
    /// Stable sort key for deterministic ordering.
    ///
    /// Lower values = higher priority in reporting.
    pub fn sort_key(&self) -> u8 {
        match self {
            SkipReason::IgnoredInternal => 0,
            SkipReason::IgnoredByGitignore => 1,
            SkipReason::ExcludedByGlob => 2,
            SkipReason::UnsupportedLanguage => 3,
            SkipReason::TooLarge => 4,
            SkipReason::Unreadable => 5,
            SkipReason::NotAFile => 6,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SkipReason::NotAFile => "not a regular file",
            SkipReason::UnsupportedLanguage => "language not supported",
            SkipReason::IgnoredInternal => "internal ignore rule",
            SkipReason::IgnoredByGitignore => "matched by gitignore",
            SkipReason::ExcludedByGlob => "excluded by pattern",
            SkipReason::TooLarge => "file too large",
            SkipReason::Unreadable => "unreadable",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl PartialOrd for SkipReason {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SkipReason {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Why a call-graph pass stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every file was processed
    #[default]
    Completed,
    /// Wall-clock budget exhausted
    BudgetTime,
    /// Total call-site budget exhausted
    BudgetSites,
    /// `should_continue` returned false (superseded generation)
    Cancelled,
}

impl StopReason {
    /// True when the pass stopped before processing every file.
    pub fn is_partial(&self) -> bool {
        !matches!(self, StopReason::Completed)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::Completed => "completed",
            StopReason::BudgetTime => "time budget exceeded",
            StopReason::BudgetSites => "call-site budget exceeded",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_reason_ordering() {
        let mut reasons = vec![
            SkipReason::NotAFile,
            SkipReason::TooLarge,
            SkipReason::IgnoredInternal,
            SkipReason::ExcludedByGlob,
        ];
        reasons.sort();
        assert_eq!(
            reasons,
            vec![
                SkipReason::IgnoredInternal,
                SkipReason::ExcludedByGlob,
                SkipReason::TooLarge,
                SkipReason::NotAFile,
            ]
        );
    }

    #[test]
    fn test_stop_reason_partial() {
        assert!(!StopReason::Completed.is_partial());
        assert!(StopReason::BudgetTime.is_partial());
        assert!(StopReason::Cancelled.is_partial());
        assert_eq!(
            serde_json::to_string(&StopReason::BudgetSites).unwrap(),
            "\"budget_sites\""
        );
    }
}
