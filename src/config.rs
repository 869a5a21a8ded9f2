//! Configuration types for ccfetch

use crate::error::{Error, Result};
use crate::types::Language;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default retrieval endpoint for Common Crawl archives
pub const DEFAULT_BASE_URL: &str = "https://data.commoncrawl.org/";

/// How a run treats output left behind by an earlier run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Start from nothing; existing output is an error
    #[default]
    Fresh,
    /// Keep existing output and skip ids it already holds
    Resume,
    /// Delete existing output and logs before building the index
    Restart,
}

impl RunMode {
    /// Build the run mode from the two CLI switches
    ///
    /// Restart and resume are mutually exclusive.
    pub fn from_flags(restart: bool, resume: bool) -> Result<Self> {
        match (restart, resume) {
            (true, true) => Err(Error::config(
                "cannot restart and resume at the same time",
                "run_mode",
            )),
            (true, false) => Ok(RunMode::Restart),
            (false, true) => Ok(RunMode::Resume),
            (false, false) => Ok(RunMode::Fresh),
        }
    }
}

/// What happens when extracted content does not match its expected checksum
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Log a warning and keep the document
    #[default]
    Lenient,
    /// Fail the archive attempt; every wanted record must also be found
    Strict,
}

impl ValidationMode {
    /// Whether mismatches and missing records fail the attempt
    pub fn is_strict(&self) -> bool {
        matches!(self, ValidationMode::Strict)
    }
}

/// Horizontal partition of the work across independent instances
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    /// This instance's index, `0..count`
    pub index: usize,
    /// Total number of instances
    pub count: usize,
}

impl ShardConfig {
    /// Whether the item at `position` in the index belongs to this shard
    pub fn owns(&self, position: usize) -> bool {
        position % self.count == self.index
    }
}

/// Retry configuration for archive attempts
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per archive before it is abandoned (default: 20)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt (default: 0 seconds)
    #[serde(default, with = "fractional_secs")]
    pub initial_delay: Duration,

    /// Maximum delay between attempts (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "fractional_secs")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: Duration::ZERO,
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for a retrieval run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding per-language output and run logs (default: "./data")
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Manifest files per language (one JSON object per line, optionally gzipped)
    #[serde(default)]
    pub manifests: BTreeMap<Language, Vec<PathBuf>>,

    /// Archives processed concurrently by this instance (default: 4)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Archive retry behaviour
    #[serde(default)]
    pub retry: RetryConfig,

    /// Checksum validation strictness
    #[serde(default)]
    pub validation: ValidationMode,

    /// Treatment of output from earlier runs
    #[serde(default)]
    pub run_mode: RunMode,

    /// Fetch and validate without writing any output
    #[serde(default)]
    pub dry_run: bool,

    /// Horizontal shard of this instance (None = process everything)
    #[serde(default)]
    pub shard: Option<ShardConfig>,

    /// Cap on archives attempted by this instance (None = no cap)
    #[serde(default)]
    pub limit: Option<usize>,

    /// Retrieval endpoint; an archive URL is this prefix followed by the archive path
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            manifests: BTreeMap::new(),
            workers: default_workers(),
            retry: RetryConfig::default(),
            validation: ValidationMode::default(),
            run_mode: RunMode::default(),
            dry_run: false,
            shard: None,
            limit: None,
            base_url: default_base_url(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Check that the options are usable and consistent
    pub fn validate(&self) -> Result<()> {
        if self.manifests.values().all(|files| files.is_empty()) {
            return Err(Error::config("no languages to process", "manifests"));
        }
        if self.workers == 0 {
            return Err(Error::config("workers must be at least 1", "workers"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config(
                "max_attempts must be at least 1",
                "retry.max_attempts",
            ));
        }
        if let Some(shard) = self.shard {
            if shard.count == 0 {
                return Err(Error::config("shard count must be at least 1", "shard"));
            }
            if shard.index >= shard.count {
                return Err(Error::config(
                    format!(
                        "shard index {} out of range for {} shards",
                        shard.index, shard.count
                    ),
                    "shard",
                ));
            }
        }
        if let Err(e) = url::Url::parse(&self.base_url) {
            return Err(Error::config(
                format!("invalid base url '{}': {}", self.base_url, e),
                "base_url",
            ));
        }
        Ok(())
    }

    /// Languages with at least one manifest file
    pub fn languages(&self) -> impl Iterator<Item = &Language> {
        self.manifests
            .iter()
            .filter(|(_, files)| !files.is_empty())
            .map(|(lang, _)| lang)
    }

    /// File-name tag of this instance's files: `"3."` whenever a shard is set, even a
    /// single one, so sharded and unsharded runs never share a file
    pub fn shard_tag(&self) -> String {
        self.shard
            .map(|shard| format!("{}.", shard.index))
            .unwrap_or_default()
    }

    /// Output file for a language: `<storage>/<lang>/docs.[<shard>.]jsonl`
    pub fn output_path(&self, lang: &Language) -> PathBuf {
        self.storage_dir
            .join(lang.as_str())
            .join(format!("docs.{}jsonl", self.shard_tag()))
    }

    /// Run log file: `<storage>/download_log.[<shard>.]txt`
    pub fn log_path(&self) -> PathBuf {
        self.storage_dir
            .join(format!("download_log.{}txt", self.shard_tag()))
    }
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_workers() -> usize {
    4
}

fn default_max_attempts() -> u32 {
    20
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Delays as (possibly fractional) seconds, so `0.25` means 250ms
mod fractional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(delay.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid delay {secs}s: {e}")))
    }
}
