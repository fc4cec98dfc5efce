//! Engine configuration.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. Unknown keys are rejected to catch typos.
//!
//! # Example
//!
//! ```toml
//! [scan]
//! exclude = ["vendor/**", "**/*_generated.py"]
//! max_file_size = 524288
//!
//! [semantic]
//! available_binaries = ["pyright-langserver", "rust-analyzer"]
//! request_timeout_ms = 5000
//!
//! [semantic.servers.python]
//! command = "pylsp"
//! args = []
//!
//! [budgets.foreground]
//! max_duration_ms = 1500
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::graph::CallBudget;
use crate::ingest::Language;
use crate::semantic::PoolSettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphConfig {
    pub scan: ScanConfig,
    pub semantic: SemanticConfig,
    pub budgets: BudgetConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Repository-relative globs; when non-empty only matching files are parsed
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Files larger than this many bytes are skipped
    pub max_file_size: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            max_file_size: 1_048_576,
        }
    }
}

/// How to launch one language server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ServerConfig {
    fn new(command: &str, args: &[&str]) -> Self {
        Self {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SemanticConfig {
    pub enabled: bool,
    /// Launch specs keyed by language name (`python`, `rust`, ...)
    pub servers: BTreeMap<String, ServerConfig>,
    /// Installed server executables. When set, a language whose command is
    /// not listed is never spawned.
    pub available_binaries: Option<Vec<String>>,
    pub max_sessions: usize,
    pub idle_ttl_secs: u64,
    pub startup_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Concurrent requests per session
    pub max_in_flight: usize,
    /// Documents kept open per server; the least recently used is closed
    pub max_open_documents: usize,
    pub outline_cache_size: usize,
    pub definition_cache_size: usize,
    /// Files marking a workspace root for session keying
    pub root_markers: Vec<String>,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        let typescript = ServerConfig::new("typescript-language-server", &["--stdio"]);
        let mut servers = BTreeMap::new();
        servers.insert(
            "python".to_string(),
            ServerConfig::new("pyright-langserver", &["--stdio"]),
        );
        servers.insert("javascript".to_string(), typescript.clone());
        servers.insert("typescript".to_string(), typescript.clone());
        servers.insert("tsx".to_string(), typescript);
        servers.insert("rust".to_string(), ServerConfig::new("rust-analyzer", &[]));
        servers.insert("java".to_string(), ServerConfig::new("jdtls", &[]));
        servers.insert("c".to_string(), ServerConfig::new("clangd", &[]));
        servers.insert("cpp".to_string(), ServerConfig::new("clangd", &[]));

        Self {
            enabled: true,
            servers,
            available_binaries: None,
            max_sessions: 8,
            idle_ttl_secs: 600,
            startup_timeout_ms: 30_000,
            request_timeout_ms: 10_000,
            max_in_flight: 16,
            max_open_documents: 256,
            outline_cache_size: 4096,
            definition_cache_size: 65_536,
            root_markers: [
                "pyproject.toml",
                "setup.py",
                "package.json",
                "tsconfig.json",
                "Cargo.toml",
                "pom.xml",
                "build.gradle",
                "go.mod",
                ".git",
            ]
            .iter()
            .map(|m| m.to_string())
            .collect(),
        }
    }
}

impl SemanticConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BudgetConfig {
    pub foreground: CallBudget,
    pub background: CallBudget,
    /// Run the larger deferred pass after each parse
    pub background_enabled: bool,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            foreground: CallBudget::foreground(),
            background: CallBudget::background(),
            background_enabled: true,
        }
    }
}

impl GraphConfig {
    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: GraphConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.semantic.max_sessions == 0 {
            return Err(ConfigError::Invalid("semantic.max_sessions must be at least 1".into()));
        }
        if self.semantic.max_in_flight == 0 {
            return Err(ConfigError::Invalid("semantic.max_in_flight must be at least 1".into()));
        }
        if self.semantic.max_open_documents == 0 {
            return Err(ConfigError::Invalid(
                "semantic.max_open_documents must be at least 1".into(),
            ));
        }
        for (name, server) in &self.semantic.servers {
            if Language::from_name(name).is_none() {
                return Err(ConfigError::Invalid(format!("unknown language '{}' in semantic.servers", name)));
            }
            if server.command.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("semantic.servers.{} has an empty command", name)));
            }
        }
        Ok(())
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_sessions: self.semantic.max_sessions,
            outline_cache_size: self.semantic.outline_cache_size,
            definition_cache_size: self.semantic.definition_cache_size,
            available_binaries: self
                .semantic
                .available_binaries
                .as_ref()
                .map(|list| list.iter().cloned().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config = GraphConfig::from_toml_str("").unwrap();
        assert_eq!(config, GraphConfig::default());
        assert_eq!(config.scan.max_file_size, 1_048_576);
        assert_eq!(config.semantic.servers["python"].command, "pyright-langserver");
        assert!(config.budgets.background_enabled);
        assert_eq!(config.budgets.background, CallBudget::background());
    }

    #[test]
    fn test_partial_tables_keep_other_defaults() {
        let config = GraphConfig::from_toml_str(
            r#"
            [scan]
            exclude = ["vendor/**"]

            [semantic]
            available_binaries = ["rust-analyzer"]

            [semantic.servers.python]
            command = "pylsp"

            [budgets.foreground]
            max_duration_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.scan.exclude, vec!["vendor/**".to_string()]);
        assert_eq!(config.scan.max_file_size, 1_048_576);
        assert_eq!(config.semantic.servers.len(), 1);
        assert_eq!(config.semantic.servers["python"].args, Vec::<String>::new());
        assert_eq!(config.budgets.foreground.max_duration_ms, 500);
        assert_eq!(config.budgets.foreground.max_total_sites, 2_000);

        let pool = config.pool_settings();
        assert!(pool.available_binaries.unwrap().contains("rust-analyzer"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            GraphConfig::from_toml_str("[scan]\nmax_file_sise = 1\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            GraphConfig::from_toml_str("[semantic]\nmax_sessions = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GraphConfig::from_toml_str("[semantic]\nmax_open_documents = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GraphConfig::from_toml_str("[semantic.servers.cobol]\ncommand = \"x\"\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = GraphConfig::load(Path::new("/nonexistent/codegraph.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
