use crate::classify::CommandClassifier;
use crate::consolidate::{EligibilityFilter, ShardPlanner, StoreLayout};
use crate::defaults;
use crate::error::{CorpusError, Result};
use crate::import::CantonRegions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub segmentation: SegmentationConfig,
    pub classification: ClassificationConfig,
    pub consolidation: ConsolidationConfig,
    pub sharding: ShardingConfig,
    pub import: ImportConfig,
}

/// Where corpora and partitions live on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Per-recording stores and ledgers, plus diarization JSON and WAV input.
    pub recordings_dir: PathBuf,
    pub dialect_dir: PathBuf,
    pub shard_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentationConfig {
    pub sample_rate: u32,
    pub first_sample_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Upper bound in seconds for one classifier input group.
    pub group_max_secs: f64,
    /// Classifier program and arguments, e.g. `["python3", "predict_did.py"]`.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Concurrent partition workers; 0 runs one per partition.
    pub max_workers: usize,
    pub excluded_dialects: Vec<String>,
    pub missing_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ImportConfig {
    /// Canton abbreviation to dialect region, on top of the built-in table.
    pub canton_regions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShardingConfig {
    pub shard_count: usize,
    pub slack_hours: f64,
    pub seed: u64,
    /// Corpus spread over all shards by count rather than duration.
    pub distributed_corpus: Option<String>,
    pub distributed_padding: usize,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("recordings"),
            dialect_dir: PathBuf::from("dialects"),
            shard_dir: PathBuf::from("shards"),
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            first_sample_id: defaults::FIRST_SAMPLE_ID,
        }
    }
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            group_max_secs: defaults::CLASSIFICATION_GROUP_SECS,
            command: Vec::new(),
        }
    }
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            excluded_dialects: vec![defaults::EXCLUDED_DIALECT.to_string()],
            missing_text: defaults::MISSING_TEXT.to_string(),
        }
    }
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            shard_count: defaults::SHARD_COUNT,
            slack_hours: defaults::SHARD_SLACK_HOURS,
            seed: defaults::SHUFFLE_SEED,
            distributed_corpus: None,
            distributed_padding: defaults::DISTRIBUTED_PADDING,
        }
    }
}

impl ClassificationConfig {
    /// Fails when no command is configured.
    pub fn classifier(&self) -> Result<CommandClassifier> {
        CommandClassifier::from_command_line(&self.command)
    }
}

impl ImportConfig {
    pub fn regions(&self) -> CantonRegions {
        CantonRegions::with_overrides(&self.canton_regions)
    }
}

impl ConsolidationConfig {
    pub fn eligibility_filter(&self) -> EligibilityFilter {
        EligibilityFilter::new(&self.missing_text, &self.excluded_dialects)
    }
}

impl ShardingConfig {
    /// Fails when `shard_count` is 0.
    pub fn planner(&self) -> Result<ShardPlanner> {
        Ok(ShardPlanner::new(self.shard_count)?
            .with_slack_hours(self.slack_hours)
            .with_seed(self.seed)
            .with_distributed_padding(self.distributed_padding))
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values; invalid TOML is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CorpusError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                CorpusError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(CorpusError::ConfigFileNotFound { .. }) => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - CORPUSMILL_RECORDINGS_DIR → paths.recordings_dir
    /// - CORPUSMILL_DIALECT_DIR → paths.dialect_dir
    /// - CORPUSMILL_SHARD_DIR → paths.shard_dir
    /// - CORPUSMILL_MAX_WORKERS → consolidation.max_workers
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("CORPUSMILL_RECORDINGS_DIR")
            && !dir.is_empty()
        {
            self.paths.recordings_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("CORPUSMILL_DIALECT_DIR")
            && !dir.is_empty()
        {
            self.paths.dialect_dir = PathBuf::from(dir);
        }

        if let Ok(dir) = std::env::var("CORPUSMILL_SHARD_DIR")
            && !dir.is_empty()
        {
            self.paths.shard_dir = PathBuf::from(dir);
        }

        if let Ok(workers) = std::env::var("CORPUSMILL_MAX_WORKERS")
            && !workers.is_empty()
        {
            match workers.parse() {
                Ok(n) => self.consolidation.max_workers = n,
                Err(_) => tracing::warn!(
                    "Ignoring CORPUSMILL_MAX_WORKERS={}: not a worker count",
                    workers
                ),
            }
        }

        self
    }

    /// Layout for consolidating recording corpora by dialect.
    pub fn dialect_layout(&self) -> StoreLayout {
        StoreLayout::new(&self.paths.recordings_dir, &self.paths.dialect_dir)
    }

    /// Layout for shuffling recording corpora into shards.
    pub fn shard_layout(&self) -> StoreLayout {
        StoreLayout::new(&self.paths.recordings_dir, &self.paths.shard_dir)
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/corpusmill/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("corpusmill").join("config.toml"))
            .ok_or_else(|| CorpusError::Other("Could not determine config directory".to_string()))
    }
}
