use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::catalog::{CatalogError, RuleCatalog};

/// Config file looked up in the project root.
pub const CONFIG_FILE: &str = ".health-audit.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Top-level configuration loaded from `.health-audit.toml`.
///
/// All fields are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub fix: FixConfig,

    /// Optional external rule catalog (TOML). The built-in catalog is used otherwise.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directories under the root that are sampled for source files
    pub search_dirs: Vec<String>,
    /// File extensions considered source, without the dot
    pub extensions: Vec<String>,
    /// Sampling bound: at most this many matching files per search directory per check.
    /// Scans are incomplete by design; a clean result is not proof of absence.
    pub max_files_per_check: usize,
    /// Branching tokens per file above which a file is flagged as complex
    pub complexity_threshold: usize,
    /// Declared dependencies above which the dependency tree is flagged
    pub max_dependencies: usize,
    /// Sampled file count from which bundle splitting is expected
    pub code_splitting_min_files: usize,
    pub io_timeout_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            search_dirs: ["app", "components", "lib", "hooks", "pages", "src"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extensions: ["ts", "tsx", "js", "jsx"].iter().map(|s| s.to_string()).collect(),
            max_files_per_check: 50,
            complexity_threshold: 15,
            max_dependencies: 50,
            code_splitting_min_files: 20,
            io_timeout_ms: 5_000,
        }
    }
}

impl ScanConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FixConfig {
    /// Pause between fixes in a batch, bounding write pressure
    pub delay_ms: u64,
    pub io_timeout_ms: u64,
    /// Upper bound on package-manager invocations
    pub command_timeout_secs: u64,
    /// Where relocated secrets are documented, relative to the root
    pub env_example_file: String,
}

impl Default for FixConfig {
    fn default() -> Self {
        Self {
            delay_ms: 100,
            io_timeout_ms: 5_000,
            command_timeout_secs: 120,
            env_example_file: ".env.example".to_string(),
        }
    }
}

impl FixConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Config {
    /// Load configuration from `.health-audit.toml` in the given project root.
    /// Returns default config if the file doesn't exist.
    pub fn load(root: &Path) -> Result<Config, ConfigError> {
        let path = root.join(CONFIG_FILE);
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        // A relative catalog path is relative to the config file.
        if let (Some(catalog), Some(parent)) = (config.catalog.as_mut(), path.parent()) {
            if catalog.is_relative() {
                *catalog = parent.join(&*catalog);
            }
        }
        Ok(config)
    }

    /// The configured catalog, or the built-in one. Always validated.
    pub fn rule_catalog(&self) -> Result<RuleCatalog, ConfigError> {
        let catalog = match &self.catalog {
            Some(path) => RuleCatalog::load_from(path)?,
            None => RuleCatalog::builtin(),
        };
        catalog.validate()?;
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scan.search_dirs.len(), 6);
        assert_eq!(config.scan.extensions, vec!["ts", "tsx", "js", "jsx"]);
        assert_eq!(config.fix.env_example_file, ".env.example");
        assert!(config.catalog.is_none());
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[scan]
max_files_per_check = 10
search_dirs = ["src"]

[fix]
delay_ms = 0
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scan.max_files_per_check, 10);
        assert_eq!(config.scan.search_dirs, vec!["src"]);
        assert_eq!(config.scan.complexity_threshold, 15);
        assert_eq!(config.fix.delay(), Duration::ZERO);
        assert_eq!(config.fix.command_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.scan.max_files_per_check, 50);
        config.rule_catalog().unwrap();
    }

    #[test]
    fn test_load_resolves_relative_catalog() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "catalog = \"rules.toml\"\n").unwrap();
        std::fs::write(
            dir.path().join("rules.toml"),
            "[weights]\ncode_quality = 1.0\nperformance = 0.0\nsecurity = 0.0\naccessibility = 0.0\ndependency = 0.0\n",
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.catalog.as_deref(), Some(dir.path().join("rules.toml").as_path()));
        let catalog = config.rule_catalog().unwrap();
        assert!(catalog.rules.is_empty());
        assert_eq!(catalog.weights.code_quality, 1.0);
    }
}
