//! Crawler configuration: TOML file loading with optional variable
//! substitution, validation, and the work-directory layout derived from
//! the crawler id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::PipelineErrorKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// What to do with cached references never re-encountered this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanStrategy {
    #[default]
    Ignore,
    Process,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Sled,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FsCollectorConfig {
    /// File extensions accepted by the queue filter; empty accepts all.
    pub include_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Unique crawler identifier; required, names the work sub-directory.
    pub id: String,
    pub work_dir: PathBuf,
    pub num_threads: usize,
    /// Stop dequeueing once this many references were processed;
    /// 0 means unlimited.
    pub max_documents: u64,
    pub orphan_strategy: OrphanStrategy,
    /// Pipeline error kinds that stop the whole crawl after the failing
    /// reference is finalized.
    pub stop_on_errors: Vec<PipelineErrorKind>,
    pub store: StoreKind,
    /// Root references queued on a fresh run.
    pub seeds: Vec<String>,
    pub filesystem: FsCollectorConfig,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            work_dir: PathBuf::from("./crawl-work"),
            num_threads: 2,
            max_documents: 0,
            orphan_strategy: OrphanStrategy::Ignore,
            stop_on_errors: Vec::new(),
            store: StoreKind::Sled,
            seeds: Vec::new(),
            filesystem: FsCollectorConfig::default(),
        }
    }
}

impl CrawlerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "crawler must be given a unique identifier (id)".to_string(),
            ));
        }
        if self.num_threads == 0 {
            return Err(ConfigError::Invalid(
                "num_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-crawler directory under the work dir, named after the id with
    /// filesystem-unsafe characters replaced.
    pub fn crawler_dir(&self) -> PathBuf {
        self.work_dir.join(safe_file_name(&self.id))
    }

    pub fn store_dir(&self) -> PathBuf {
        self.crawler_dir().join("store")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.crawler_dir().join("downloads")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.crawler_dir().join("logs")
    }

    /// Marker file the `stop` subcommand drops for a running crawler.
    pub fn stop_file(&self) -> PathBuf {
        self.crawler_dir().join("stop.request")
    }
}

/// Replace anything outside [A-Za-z0-9._-] so an id can name a directory.
pub fn safe_file_name(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Load a TOML configuration, substituting `${name}` placeholders from an
/// optional `name = value` variables file first.
pub fn load_config(path: &Path, variables: Option<&Path>) -> Result<CrawlerConfig, ConfigError> {
    let mut raw = std::fs::read_to_string(path)?;

    if let Some(variables) = variables {
        let vars = parse_variables(variables)?;
        raw = substitute_variables(&raw, &vars);
    }

    let config: CrawlerConfig = toml::from_str(&raw)?;
    config.validate()?;
    Ok(config)
}

fn parse_variables(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let mut vars = HashMap::new();
    for line in std::fs::read_to_string(path)?.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::Invalid(format!(
                "variables file line is not name = value: {line}"
            )));
        };
        vars.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(vars)
}

fn substitute_variables(raw: &str, vars: &HashMap<String, String>) -> String {
    let mut out = raw.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("${{{key}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = CrawlerConfig::default();
        assert_eq!(config.num_threads, 2);
        assert_eq!(config.max_documents, 0);
        assert_eq!(config.orphan_strategy, OrphanStrategy::Ignore);
        assert_eq!(config.store, StoreKind::Sled);
    }

    #[test]
    fn test_validate_requires_id() {
        let config = CrawlerConfig::default();
        assert!(config.validate().is_err());

        let config = CrawlerConfig {
            id: "docs".to_string(),
            ..CrawlerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("my crawler/1"), "my_crawler_1");
        assert_eq!(safe_file_name("plain-id_2.0"), "plain-id_2.0");
    }

    #[test]
    fn test_load_config_with_variables() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("crawler.toml");
        let vars_path = dir.path().join("vars.txt");

        std::fs::write(
            &config_path,
            "id = \"${name}\"\nnum_threads = 4\norphan_strategy = \"delete\"\nstop_on_errors = [\"fetch\"]\n",
        )
        .unwrap();
        std::fs::write(&vars_path, "# run variables\nname = docs\n").unwrap();

        let config = load_config(&config_path, Some(&vars_path)).unwrap();
        assert_eq!(config.id, "docs");
        assert_eq!(config.num_threads, 4);
        assert_eq!(config.orphan_strategy, OrphanStrategy::Delete);
        assert_eq!(config.stop_on_errors, vec![PipelineErrorKind::Fetch]);
    }

    #[test]
    fn test_load_config_rejects_blank_id() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("crawler.toml");
        std::fs::write(&config_path, "num_threads = 1\n").unwrap();
        assert!(load_config(&config_path, None).is_err());
    }

    #[test]
    fn test_directory_layout() {
        let config = CrawlerConfig {
            id: "my docs".to_string(),
            work_dir: PathBuf::from("/tmp/work"),
            ..CrawlerConfig::default()
        };
        assert_eq!(config.store_dir(), PathBuf::from("/tmp/work/my_docs/store"));
        assert_eq!(
            config.downloads_dir(),
            PathBuf::from("/tmp/work/my_docs/downloads")
        );
    }
}
