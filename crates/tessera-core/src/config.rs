//! Engine configuration, loadable from a TOML file

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::Root;

/// Directory-scoped rule file consulted in every directory.
pub const DEFAULT_RULE_FILE: &str = ".gitignore";

/// Per-root override file replacing the default deny-list.
pub const DEFAULT_OVERRIDE_FILE: &str = ".ignore";

/// Cache directory: .tessera/
pub const CACHE_DIR: &str = ".tessera";

/// Weight cache document
pub const WEIGHT_CACHE: &str = "weights.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Read override files and directory rule files. When off, only the
    /// minimal hardcoded excludes (plus `override_patterns`) apply.
    pub honor_rule_files: bool,
    /// Raw override-pattern text, one pattern per line.
    pub override_patterns: Option<String>,
    pub rule_file_name: String,
    pub override_file_name: String,
    /// Weight cache document; defaults to `<first root>/.tessera/weights.json`.
    pub cache_path: Option<PathBuf>,
    /// Quiet window before a pending cache write is committed.
    pub flush_quiet_ms: u64,
    /// Maximum directories a single cascade or select-all may enter.
    pub sweep_directory_limit: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            honor_rule_files: true,
            override_patterns: None,
            rule_file_name: DEFAULT_RULE_FILE.to_string(),
            override_file_name: DEFAULT_OVERRIDE_FILE.to_string(),
            cache_path: None,
            flush_quiet_ms: 5_000,
            sweep_directory_limit: Some(10_000),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (key, name) in [
            ("rule_file_name", &self.rule_file_name),
            ("override_file_name", &self.override_file_name),
        ] {
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                return Err(Error::Config(format!(
                    "{key} must be a bare file name, got {name:?}"
                )));
            }
        }
        Ok(())
    }

    /// Whether a file with this name feeds the rule set.
    pub fn is_rule_file_name(&self, name: &str) -> bool {
        name == self.rule_file_name || name == self.override_file_name
    }

    pub fn flush_quiet(&self) -> Duration {
        Duration::from_millis(self.flush_quiet_ms)
    }

    pub fn cache_path_for(&self, roots: &[Root]) -> PathBuf {
        if let Some(path) = &self.cache_path {
            return path.clone();
        }
        let base = roots
            .first()
            .map(|r| r.path.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        base.join(CACHE_DIR).join(WEIGHT_CACHE)
    }
}
