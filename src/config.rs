use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::checkpoint::CheckpointManagerConfig;
use crate::corpus::CorpusConfig;
use crate::decode::DecoderConfig;
use crate::error::ConfigError;
use crate::policy::{PolicyConfig, PolicyKind};
use crate::stats::{RewardConfig, RewardType};
use crate::training::trainer::TrainerConfig;

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub training: TrainerConfig,
    pub decoder: DecoderConfig,
    pub reward: RewardConfig,
    pub policy: PolicyConfig,
    pub corpus: CorpusConfig,
    pub checkpoint: CheckpointManagerConfig,
}

/// Per-field overrides, typically from the command line. `Some` wins.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub workspace: Option<PathBuf>,
    pub seed: Option<u64>,
    pub batch_size: Option<usize>,
    pub samples: Option<usize>,
    pub reward_type: Option<RewardType>,
    pub policy: Option<PolicyKind>,
    pub learning_rate: Option<f32>,
    pub min_source_len: Option<usize>,
    pub upper: Option<bool>,
    pub remote: Option<bool>,
    pub max_iterations: Option<usize>,
    pub finetune: Option<bool>,
    pub train_source: Option<PathBuf>,
    pub train_target: Option<PathBuf>,
    pub valid_source: Option<PathBuf>,
    pub valid_target: Option<PathBuf>,
}

fn set<T>(slot: &mut T, value: &Option<T>)
where
    T: Clone,
{
    if let Some(v) = value {
        *slot = v.clone();
    }
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut AppConfig) {
        set(&mut config.training.workspace, &self.workspace);
        set(&mut config.training.seed, &self.seed);
        set(&mut config.corpus.batch_size, &self.batch_size);
        set(&mut config.decoder.samples, &self.samples);
        set(&mut config.reward.kind, &self.reward_type);
        set(&mut config.policy.kind, &self.policy);
        set(&mut config.policy.learning_rate, &self.learning_rate);
        set(&mut config.training.min_source_len, &self.min_source_len);
        set(&mut config.training.upper, &self.upper);
        set(&mut config.training.remote, &self.remote);
        set(&mut config.decoder.finetune, &self.finetune);
        set(&mut config.corpus.train_source, &self.train_source);
        set(&mut config.corpus.train_target, &self.train_target);
        set(&mut config.corpus.valid_source, &self.valid_source);
        set(&mut config.corpus.valid_target, &self.valid_target);
        if self.max_iterations.is_some() {
            config.training.max_iterations = self.max_iterations;
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Merge the three configuration layers: `base` (defaults or TOML), the
    /// configuration stored for a resumed run, then `overrides`.
    pub fn layered(
        base: AppConfig,
        stored: Option<AppConfig>,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut config = stored.unwrap_or(base);
        overrides.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.training;
        for (name, value) in [
            ("training.save_freq", t.save_freq),
            ("training.sample_freq", t.sample_freq),
            ("training.valid_freq", t.valid_freq),
            ("training.display_freq", t.display_freq),
            ("training.log_interval", t.log_interval),
            ("corpus.batch_size", self.corpus.batch_size),
            ("corpus.valid_batch_size", self.corpus.valid_batch_size),
            ("decoder.samples", self.decoder.samples),
            ("decoder.initial_read", self.decoder.initial_read),
            ("decoder.finetune_freq", self.decoder.finetune_freq),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be > 0")));
            }
        }
        if t.max_iterations == Some(0) {
            return Err(ConfigError::Validation(
                "training.max_iterations must be > 0".into(),
            ));
        }
        if self.decoder.max_target_ratio <= 0.0 {
            return Err(ConfigError::Validation(
                "decoder.max_target_ratio must be > 0".into(),
            ));
        }
        if self.policy.learning_rate <= 0.0 {
            return Err(ConfigError::Validation(
                "policy.learning_rate must be > 0".into(),
            ));
        }
        if self.policy.init_std < 0.0 {
            return Err(ConfigError::Validation(
                "policy.init_std must be >= 0".into(),
            ));
        }
        if self.policy.wait_k == 0 {
            return Err(ConfigError::Validation("policy.wait_k must be >= 1".into()));
        }
        if self.checkpoint.keep_last_n == 0 {
            return Err(ConfigError::Validation(
                "checkpoint.keep_last_n must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&AppConfig::default())
    }

    pub fn workspace(&self) -> Workspace {
        Workspace::new(&self.training.workspace)
    }
}

/// The directory tree a run reads and writes.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Workspace { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Checkpoints, one subdirectory per run.
    pub fn policy_dir(&self) -> PathBuf {
        self.root.join(".policy")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join(".config")
    }

    /// Validation outputs (`test.txt`, `ref.txt`).
    pub fn translate_dir(&self) -> PathBuf {
        self.root.join(".translate")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join(".log")
    }

    pub fn run_config_path(&self, run_id: &str) -> PathBuf {
        self.config_dir().join(format!("{run_id}.conf"))
    }

    /// Create every workspace directory.
    pub fn prepare(&self) -> io::Result<()> {
        for dir in [
            self.policy_dir(),
            self.config_dir(),
            self.translate_dir(),
            self.log_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
