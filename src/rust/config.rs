use std::path::PathBuf;

use crate::inference::{CachePolicy, DEFAULT_THRESHOLD};
use crate::labels::ToxicityLabel;
use crate::model_manager::ModelInfo;
use crate::runtime::RuntimeConfig;

/// Longest token sequence fed to the model; longer input is truncated.
pub const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 512;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid threshold {0}: must be within [0, 1]")]
    InvalidThreshold(f32),
    #[error("Max sequence length must be at least 1")]
    InvalidSequenceLength,
    #[error("At least one output label is required")]
    EmptyLabels,
    #[error("Label filter entry '{0}' is not one of the model's labels")]
    UnknownFilterLabel(String),
}

/// Where model files are read from.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelSource {
    /// Files already on disk.
    Files {
        model_path: PathBuf,
        tokenizer_path: PathBuf,
    },
    /// Files fetched into the model cache on first use.
    Remote(ModelInfo),
    /// Files previously downloaded into the model cache under this name.
    Cached(String),
}

/// Everything needed to load and run the classifier.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Model-load threshold deciding when a label is flagged as matched
    pub threshold: f32,
    pub cache_policy: CachePolicy,
    /// Names of the model's outputs, in logit order
    pub labels: Vec<String>,
    /// Restricts which labels a classification returns
    pub label_filter: Option<Vec<String>>,
    pub max_sequence_length: usize,
    /// Whether the model emits raw logits that still need a sigmoid
    pub outputs_logits: bool,
    pub source: ModelSource,
    pub runtime: RuntimeConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            cache_policy: CachePolicy::default(),
            labels: ToxicityLabel::default_model_order(),
            label_filter: None,
            max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH,
            outputs_logits: true,
            source: ModelSource::Cached("toxicity".to_string()),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl ClassifierConfig {
    pub fn with_source(mut self, source: ModelSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_labels(mut self, labels: Vec<impl Into<String>>) -> Self {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_label_filter(mut self, labels: Vec<impl Into<String>>) -> Self {
        self.label_filter = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_max_sequence_length(mut self, max_sequence_length: usize) -> Self {
        self.max_sequence_length = max_sequence_length;
        self
    }

    pub fn with_runtime_config(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }
        if self.max_sequence_length == 0 {
            return Err(ConfigError::InvalidSequenceLength);
        }
        if self.labels.is_empty() {
            return Err(ConfigError::EmptyLabels);
        }
        if let Some(filter) = &self.label_filter {
            if let Some(unknown) = filter
                .iter()
                .find(|wanted| !self.labels.iter().any(|label| label.eq_ignore_ascii_case(wanted)))
            {
                return Err(ConfigError::UnknownFilterLabel(unknown.clone()));
            }
        }
        Ok(())
    }
}
