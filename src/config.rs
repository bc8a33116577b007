use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::ingest::RecordKind;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Archive layout and database location
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Base directory holding `submissions/`, `comments/` and the
    /// per-kind progress ledgers.
    pub base_dir: PathBuf,
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Stream decoder tuning
#[derive(Debug, Clone, Deserialize)]
pub struct DecoderConfig {
    /// Bytes of decompressed data requested per read.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Maximum bytes buffered while resolving one decode boundary error.
    #[serde(default = "default_max_window")]
    pub max_window: u64,
    /// Yield a trailing unterminated line instead of dropping it.
    #[serde(default)]
    pub yield_trailing_line: bool,
}

/// Ingestion cadence
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Lines between progress reports and commits.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_window: default_max_window(),
            yield_trailing_line: false,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            progress_interval: default_progress_interval(),
        }
    }
}

fn default_chunk_size() -> usize {
    1 << 27 // 128 MiB
}

fn default_max_window() -> u64 {
    (1 << 29) * 2
}

fn default_progress_interval() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in REDARC_CONFIG environment variable
    /// 2. ./redarc.toml in current directory
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config_path = std::env::var("REDARC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("redarc.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse redarc.toml")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if !self.archive.base_dir.exists() {
            anyhow::bail!(
                "base_dir path does not exist: {}. Set base_dir in redarc.toml to your archive directory.",
                self.archive.base_dir.display()
            );
        }

        if !self.archive.base_dir.is_dir() {
            anyhow::bail!(
                "base_dir must be a directory, not a file: {}",
                self.archive.base_dir.display()
            );
        }

        if self.decoder.chunk_size == 0 {
            anyhow::bail!("decoder.chunk_size must be greater than 0");
        }

        if self.decoder.max_window < self.decoder.chunk_size as u64 {
            anyhow::bail!("decoder.max_window must be at least decoder.chunk_size");
        }

        if self.ingest.progress_interval == 0 {
            anyhow::bail!("ingest.progress_interval must be greater than 0");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.archive.db_path
    }

    /// Get the archive base directory
    pub fn base_dir(&self) -> &Path {
        &self.archive.base_dir
    }

    /// Directory holding the archive files of one kind
    pub fn kind_dir(&self, kind: RecordKind) -> PathBuf {
        self.archive.base_dir.join(kind.dir_name())
    }

    /// Path of the shared progress ledger for one kind
    pub fn ledger_path(&self, kind: RecordKind) -> PathBuf {
        self.archive.base_dir.join(kind.ledger_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    fn create_test_config(temp_dir: &TempDir) -> String {
        let base_dir = temp_dir.path().canonicalize().unwrap();
        let base_dir_str = base_dir.to_str().unwrap().replace('\\', "\\\\");
        format!(
            r#"
[archive]
base_dir = "{}"
db_path = "./redarc.db"
log_level = "debug"

[decoder]
chunk_size = 65536
max_window = 1048576

[ingest]
progress_interval = 5000
"#,
            base_dir_str
        )
    }

    fn with_config_env(config_path: &std::path::Path, f: impl FnOnce()) {
        let original = std::env::var("REDARC_CONFIG").ok();
        std::env::set_var("REDARC_CONFIG", config_path.to_str().unwrap());
        f();
        std::env::remove_var("REDARC_CONFIG");
        if let Some(val) = original {
            std::env::set_var("REDARC_CONFIG", val);
        }
    }

    #[test]
    fn test_config_load_success() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_content = create_test_config(&temp_dir);
        let config_path = temp_dir.path().join("redarc.toml");
        fs::write(&config_path, config_content).unwrap();
        let config_path = config_path.canonicalize().unwrap();
        with_config_env(&config_path, || {
            let config = Config::load();
            assert!(config.is_ok(), "Config::load() failed: {:?}", config.err());
            let config = config.unwrap();
            assert_eq!(config.archive.log_level, "debug");
            assert_eq!(config.decoder.chunk_size, 65536);
            assert_eq!(config.ingest.progress_interval, 5000);
            assert!(!config.decoder.yield_trailing_line);
        });
    }

    #[test]
    fn test_config_defaults() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let base_dir = temp_dir.path().canonicalize().unwrap();
        let content = format!(
            "[archive]\nbase_dir = \"{}\"\ndb_path = \"./redarc.db\"\n",
            base_dir.to_str().unwrap().replace('\\', "\\\\")
        );
        let config_path = temp_dir.path().join("redarc.toml");
        fs::write(&config_path, content).unwrap();
        let config_path = config_path.canonicalize().unwrap();
        with_config_env(&config_path, || {
            let config = Config::load().unwrap();
            assert_eq!(config.decoder.chunk_size, 1 << 27);
            assert_eq!(config.decoder.max_window, (1 << 29) * 2);
            assert_eq!(config.ingest.progress_interval, 10_000);
            assert_eq!(config.archive.log_level, "info");
        });
    }

    #[test]
    fn test_config_rejects_missing_base_dir() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let content = "[archive]\nbase_dir = \"/nonexistent/redarc\"\ndb_path = \"./redarc.db\"\n";
        let config_path = temp_dir.path().join("redarc.toml");
        fs::write(&config_path, content).unwrap();
        let config_path = config_path.canonicalize().unwrap();
        with_config_env(&config_path, || {
            let config = Config::load();
            assert!(config.is_err());
            assert!(config.unwrap_err().to_string().contains("base_dir"));
        });
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("REDARC_CONFIG").ok();
        std::env::set_var("REDARC_CONFIG", "nonexistent.toml");
        let config = Config::load();
        assert!(config.is_err());
        std::env::remove_var("REDARC_CONFIG");
        if let Some(v) = original {
            std::env::set_var("REDARC_CONFIG", v);
        }
    }

    #[test]
    fn test_kind_paths() {
        let config = Config {
            archive: ArchiveConfig {
                base_dir: PathBuf::from("/data/reddit"),
                db_path: PathBuf::from("/data/redarc.db"),
                log_level: "info".to_string(),
            },
            decoder: DecoderConfig::default(),
            ingest: IngestConfig::default(),
        };
        assert_eq!(
            config.kind_dir(RecordKind::Submission),
            PathBuf::from("/data/reddit/submissions")
        );
        assert_eq!(
            config.ledger_path(RecordKind::Comment),
            PathBuf::from("/data/reddit/comments-progress.txt")
        );
    }
}
