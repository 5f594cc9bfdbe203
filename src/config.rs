use std::{num::NonZeroUsize, path::Path};

use burn::LearningRate;
use serde::{Deserialize, Serialize};

use crate::languages::Languages;

/// AdamW optimizer settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    /// Initial learning rate
    pub learning_rate: LearningRate,

    /// Weight decay
    pub weight_decay: f32,

    /// Adam epsilon
    pub epsilon: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 5e-5,
            weight_decay: 1e-2,
            epsilon: 1e-8,
        }
    }
}

/// Noam warmup schedule, stepped once per optimization step.
///
/// With a schedule, `optimizer.learning_rate` is the Noam scale factor rather than the peak
/// rate. The rate climbs to `learning_rate / sqrt(hidden_size * warmup_steps)` at step
/// `warmup_steps` and decays after that, so a hidden size of 768 with 4000 warmup steps peaks at
/// about `learning_rate / 1753`. Scale `learning_rate` up accordingly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Number of warmup steps
    pub warmup_steps: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { warmup_steps: 4000 }
    }
}

/// Dataloader worker count
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Workers {
    /// Use all available parallelism
    #[default]
    Auto,

    /// A fixed worker count, zero meaning batches are loaded on the calling thread
    Count(usize),
}

impl Workers {
    /// The sentinel value selecting auto-detection
    pub const AUTO: i64 = -1;

    /// Resolve to a concrete worker count
    pub fn resolve(self) -> usize {
        match self {
            Workers::Auto => std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            Workers::Count(count) => count,
        }
    }
}

impl TryFrom<i64> for Workers {
    type Error = ConfigError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            Workers::AUTO => Ok(Workers::Auto),
            count if count >= 0 => Ok(Workers::Count(count as usize)),
            other => Err(ConfigError::NegativeWorkers(other)),
        }
    }
}

impl From<Workers> for i64 {
    fn from(workers: Workers) -> Self {
        match workers {
            Workers::Auto => Workers::AUTO,
            Workers::Count(count) => count as i64,
        }
    }
}

/// The run configuration, read from YAML and validated before any component is built
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The ordered language codes to classify
    pub languages: Languages,

    /// Training batch size
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    /// Validation and test batch size
    #[serde(default = "defaults::val_batch_size")]
    pub val_batch_size: usize,

    /// The Hugging Face tokenizer to use
    #[serde(default = "defaults::pretrained_name")]
    pub tokenizer_name: String,

    /// Dataloader workers, `-1` to use all available parallelism
    #[serde(default)]
    pub num_workers: Workers,

    /// The pretrained embedder, resolved under `models_dir`
    #[serde(default = "defaults::pretrained_name")]
    pub embedder_name: String,

    /// Train only the classification head
    #[serde(default = "defaults::freeze_embedder")]
    pub freeze_embedder: bool,

    /// Optimizer settings
    pub optimizer: OptimizerConfig,

    /// Optional learning rate schedule, constant when absent. When present, the optimizer's
    /// learning rate is used as the Noam scale factor.
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,

    /// Number of epochs
    #[serde(default = "defaults::num_epochs")]
    pub num_epochs: usize,

    /// Maximum number of input ids per sample, including the wrapper ids
    #[serde(default = "defaults::max_seq_len")]
    pub max_seq_len: usize,

    /// Probability that a training sample is extended with records from other languages
    #[serde(default = "defaults::mix_probability")]
    pub mix_probability: f64,

    /// Maximum number of records joined into one mixed training sample
    #[serde(default = "defaults::max_segments")]
    pub max_segments: usize,

    /// Seed for the backend, the training dataloader shuffle and record mixing
    #[serde(default = "defaults::seed")]
    pub seed: u64,

    /// The location of the per-language corpora
    #[serde(default = "defaults::data_dir")]
    pub data_dir: String,

    /// The location of pretrained embedders
    #[serde(default = "defaults::models_dir")]
    pub models_dir: String,

    /// Directory to save the trained model into
    #[serde(default = "defaults::artifact_dir")]
    pub artifact_dir: String,
}

mod defaults {
    pub fn batch_size() -> usize {
        128
    }

    pub fn val_batch_size() -> usize {
        256
    }

    pub fn pretrained_name() -> String {
        "bert-base-multilingual-cased".to_string()
    }

    pub fn freeze_embedder() -> bool {
        true
    }

    pub fn num_epochs() -> usize {
        1
    }

    pub fn max_seq_len() -> usize {
        512
    }

    pub fn mix_probability() -> f64 {
        0.5
    }

    pub fn max_segments() -> usize {
        3
    }

    pub fn seed() -> u64 {
        42
    }

    pub fn data_dir() -> String {
        "data".to_string()
    }

    pub fn models_dir() -> String {
        "data/models".to_string()
    }

    pub fn artifact_dir() -> String {
        "data/language-identification".to_string()
    }
}

impl Config {
    /// Parse and validate a YAML configuration
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;

        config.validate()?;

        Ok(config)
    }

    /// Read, parse and validate a YAML configuration file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml = tokio::fs::read_to_string(path).await?;

        Self::from_yaml(&yaml)
    }

    /// Check the constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch_size"));
        }

        if self.val_batch_size == 0 {
            return Err(ConfigError::Zero("val_batch_size"));
        }

        if self.max_segments == 0 {
            return Err(ConfigError::Zero("max_segments"));
        }

        // Room for the two wrapper ids and at least one labelled piece
        if self.max_seq_len < 3 {
            return Err(ConfigError::MaxSeqLen(self.max_seq_len));
        }

        if !(0.0..=1.0).contains(&self.mix_probability) {
            return Err(ConfigError::Probability(self.mix_probability));
        }

        Ok(())
    }

    /// The number of configured languages
    pub fn n_languages(&self) -> usize {
        self.languages.len()
    }
}

/// Config Error
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("unable to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration is not valid YAML, is missing a required key, or has an unknown key
    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A negative worker count other than the auto-detect sentinel
    #[error("num_workers must be -1 (auto) or zero or more, got {0}")]
    NegativeWorkers(i64),

    /// A size that must be positive is zero
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// The sequence length cannot hold the wrapper ids and a labelled piece
    #[error("max_seq_len must be at least 3, got {0}")]
    MaxSeqLen(usize),

    /// A probability outside of [0, 1]
    #[error("mix_probability must be within [0, 1], got {0}")]
    Probability(f64),
}
