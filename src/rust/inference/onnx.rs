use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info};
use ndarray::Array2;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{validate_threshold, InferenceError, LabelPrediction, ModelLoader, PredictionResult, ToxicityModel};
use crate::config::{ClassifierConfig, ModelSource};
use crate::model_manager::ModelManager;
use crate::runtime::create_session_builder;

/// Loads a multi-label toxicity model exported to ONNX.
///
/// The model must take `input_ids` (plus optionally `attention_mask` and
/// `token_type_ids`) shaped `[1, sequence_length]` and produce one score per
/// label, shaped `[1, num_labels]`.
pub struct OnnxLoader {
    config: ClassifierConfig,
    manager: Option<ModelManager>,
}

impl OnnxLoader {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            manager: None,
        }
    }

    /// Uses `manager` to resolve cached and remote model sources.
    pub fn with_manager(mut self, manager: ModelManager) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    async fn resolve_paths(&self) -> Result<(PathBuf, PathBuf), InferenceError> {
        let manager = || -> Result<ModelManager, InferenceError> {
            match &self.manager {
                Some(manager) => Ok(manager.clone()),
                None => ModelManager::new_default()
                    .map_err(|e| InferenceError::Load(format!("Failed to create model manager: {}", e))),
            }
        };

        match &self.config.source {
            ModelSource::Files {
                model_path,
                tokenizer_path,
            } => Ok((model_path.clone(), tokenizer_path.clone())),
            ModelSource::Cached(name) => Ok(manager()?.downloaded_paths(name)?),
            ModelSource::Remote(info) => Ok(manager()?.ensure_model_downloaded(info).await?),
        }
    }
}

#[async_trait]
impl ModelLoader for OnnxLoader {
    async fn load(&self, threshold: f32) -> Result<Arc<dyn ToxicityModel>, InferenceError> {
        validate_threshold(threshold)?;
        let (model_path, tokenizer_path) = self.resolve_paths().await?;

        let config = self.config.clone();
        let model = tokio::task::spawn_blocking(move || {
            OnnxToxicityModel::from_files(&model_path, &tokenizer_path, threshold, &config)
        })
        .await??;

        Ok(Arc::new(model))
    }
}

/// A loaded ONNX toxicity model. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OnnxToxicityModel {
    tokenizer: Arc<Tokenizer>,
    session: Arc<Session>,
    labels: Arc<Vec<String>>,
    label_filter: Option<Arc<HashSet<String>>>,
    threshold: f32,
    max_sequence_length: usize,
    outputs_logits: bool,
    feeds_attention_mask: bool,
    feeds_token_type_ids: bool,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<OnnxToxicityModel>();
    }
};

impl OnnxToxicityModel {
    /// Builds a session and tokenizer from files on disk. Blocking.
    pub fn from_files(
        model_path: &Path,
        tokenizer_path: &Path,
        threshold: f32,
        config: &ClassifierConfig,
    ) -> Result<Self, InferenceError> {
        validate_threshold(threshold)?;
        if !model_path.exists() {
            return Err(InferenceError::Load(format!("Model file not found: {:?}", model_path)));
        }
        if !tokenizer_path.exists() {
            return Err(InferenceError::Load(format!("Tokenizer file not found: {:?}", tokenizer_path)));
        }

        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            error!("Failed to load tokenizer: {}", e);
            InferenceError::Tokenizer(format!("Failed to load tokenizer: {}", e))
        })?;
        debug!("Tokenizer loaded from {:?}", tokenizer_path);

        let session = create_session_builder(&config.runtime)?.commit_from_file(model_path)?;
        Self::validate_model(&session)?;
        info!("Model loaded from {:?} (threshold {})", model_path, threshold);

        let has_input = |name: &str| session.inputs.iter().any(|input| input.name == name);
        let feeds_attention_mask = has_input("attention_mask");
        let feeds_token_type_ids = has_input("token_type_ids");

        let label_filter = config.label_filter.as_ref().map(|labels| {
            Arc::new(labels.iter().map(|label| label.to_lowercase()).collect::<HashSet<_>>())
        });

        Ok(Self {
            tokenizer: Arc::new(tokenizer),
            session: Arc::new(session),
            labels: Arc::new(config.labels.clone()),
            label_filter,
            threshold,
            max_sequence_length: config.max_sequence_length,
            outputs_logits: config.outputs_logits,
            feeds_attention_mask,
            feeds_token_type_ids,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn validate_model(session: &Session) -> Result<(), InferenceError> {
        if !session.inputs.iter().any(|input| input.name == "input_ids") {
            return Err(InferenceError::Model("Model has no 'input_ids' input".to_string()));
        }
        if session.outputs.is_empty() {
            return Err(InferenceError::Model(
                "Model must have at least 1 output for label scores".to_string(),
            ));
        }
        Ok(())
    }

    fn is_returned(&self, label: &str) -> bool {
        match &self.label_filter {
            Some(filter) => filter.contains(&label.to_lowercase()),
            None => true,
        }
    }

    /// Runs every text through the model. Blocking.
    pub fn classify_blocking(&self, texts: &[String]) -> Result<Vec<LabelPrediction>, InferenceError> {
        let mut predictions: Vec<LabelPrediction> = self
            .labels
            .iter()
            .map(|label| LabelPrediction {
                label: label.clone(),
                results: Vec::with_capacity(texts.len()),
            })
            .collect();

        for text in texts {
            let scores = self.score(text)?;
            for (prediction, positive) in predictions.iter_mut().zip(scores) {
                prediction
                    .results
                    .push(PredictionResult::new([1.0 - positive, positive], self.threshold));
            }
        }

        predictions.retain(|prediction| self.is_returned(&prediction.label));
        Ok(predictions)
    }

    /// Positive-class probability per label for one text.
    fn score(&self, text: &str) -> Result<Vec<f32>, InferenceError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        let len = encoding.get_ids().len().min(self.max_sequence_length);
        if encoding.get_ids().len() > len {
            debug!("Truncating input from {} to {} tokens", encoding.get_ids().len(), len);
        }
        let column = |values: &[u32]| -> Result<Tensor<i64>, InferenceError> {
            let array = Array2::from_shape_vec(
                (1, len),
                values[..len].iter().map(|&v| i64::from(v)).collect(),
            )
            .map_err(|e| InferenceError::Model(format!("Failed to create input array: {}", e)))?;
            Tensor::from_array(array)
                .map_err(|e| InferenceError::Model(format!("Failed to create input tensor: {}", e)))
        };

        let mut inputs = HashMap::new();
        inputs.insert("input_ids", column(encoding.get_ids())?);
        if self.feeds_attention_mask {
            inputs.insert("attention_mask", column(encoding.get_attention_mask())?);
        }
        if self.feeds_token_type_ids {
            inputs.insert("token_type_ids", column(encoding.get_type_ids())?);
        }

        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| InferenceError::Model(format!("Failed to run model: {}", e)))?;
        let output = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Model(format!("Failed to extract output tensor: {}", e)))?;

        let raw: Vec<f32> = output.iter().copied().collect();
        if raw.len() != self.labels.len() {
            return Err(InferenceError::Model(format!(
                "Model produced {} scores but {} labels are configured",
                raw.len(),
                self.labels.len()
            )));
        }

        Ok(raw
            .into_iter()
            .map(|value| if self.outputs_logits { sigmoid(value) } else { value.clamp(0.0, 1.0) })
            .collect())
    }
}

#[async_trait]
impl ToxicityModel for OnnxToxicityModel {
    async fn classify(&self, texts: &[String]) -> Result<Vec<LabelPrediction>, InferenceError> {
        let model = self.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || model.classify_blocking(&texts)).await?
    }

    fn labels(&self) -> Vec<String> {
        self.labels
            .iter()
            .filter(|label| self.is_returned(label))
            .cloned()
            .collect()
    }
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;

    #[test]
    fn test_sigmoid() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.9999);
        assert!(sigmoid(-10.0) < 0.0001);
    }

    #[tokio::test]
    async fn test_missing_files_fail_to_load() {
        let config = ClassifierConfig::default().with_source(ModelSource::Files {
            model_path: PathBuf::from("/nonexistent/model.onnx"),
            tokenizer_path: PathBuf::from("/nonexistent/tokenizer.json"),
        });
        let loader = OnnxLoader::new(config);
        let result = loader.load(0.7).await;
        assert!(matches!(result, Err(InferenceError::Load(_))));
    }

    #[tokio::test]
    async fn test_invalid_threshold_rejected_before_loading() {
        let loader = OnnxLoader::new(ClassifierConfig::default());
        let result = loader.load(1.5).await;
        assert!(matches!(result, Err(InferenceError::InvalidThreshold(_))));
    }

    #[tokio::test]
    async fn test_uncached_model_reports_not_downloaded() {
        let dir = std::env::temp_dir().join(format!("toxiscope-onnx-{}", std::process::id()));
        let manager = ModelManager::new(&dir).unwrap();
        let config = ClassifierConfig::default().with_source(ModelSource::Cached("absent".into()));
        let loader = OnnxLoader::new(config).with_manager(manager);
        let result = loader.load(0.7).await;
        assert!(matches!(result, Err(InferenceError::Download(_))));
    }
}
