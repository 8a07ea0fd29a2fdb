//! The inference seam: how a model is acquired and what it returns.
//!
//! [`ModelLoader::load`] acquires a model for a given threshold and
//! [`ToxicityModel::classify`] scores a batch of texts, one
//! [`LabelPrediction`] per supported label. Both may suspend. The ONNX
//! implementation lives in [`onnx`], the reuse policy in [`cache`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::formatter::RawPrediction;

pub mod cache;
mod error;
pub mod onnx;

pub use cache::{CachePolicy, CachingLoader};
pub use error::InferenceError;
pub use onnx::{OnnxLoader, OnnxToxicityModel};

/// Threshold the classifier is loaded with unless configured otherwise.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Scores for one text under one label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// `[negative, positive]`
    pub probabilities: [f32; 2],
    /// `Some(true)` if the positive probability exceeds the load threshold,
    /// `Some(false)` if the negative one does, `None` if neither.
    pub matched: Option<bool>,
}

impl PredictionResult {
    pub fn new(probabilities: [f32; 2], threshold: f32) -> Self {
        let matched = if probabilities[1] > threshold {
            Some(true)
        } else if probabilities[0] > threshold {
            Some(false)
        } else {
            None
        };
        Self {
            probabilities,
            matched,
        }
    }
}

/// A label and its results, one per input text in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelPrediction {
    pub label: String,
    pub results: Vec<PredictionResult>,
}

impl LabelPrediction {
    /// The prediction for the text at `index`, if the model returned one.
    pub fn for_text(&self, index: usize) -> Option<RawPrediction> {
        self.results
            .get(index)
            .map(|result| RawPrediction::new(self.label.clone(), result.probabilities))
    }
}

/// Flattens per-label output to the predictions for the first text.
///
/// Labels without a first row are skipped.
pub fn first_text_predictions(predictions: &[LabelPrediction]) -> Vec<RawPrediction> {
    predictions
        .iter()
        .filter_map(|prediction| prediction.for_text(0))
        .collect()
}

pub fn validate_threshold(threshold: f32) -> Result<(), InferenceError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(InferenceError::InvalidThreshold(threshold))
    }
}

/// A loaded toxicity model.
#[async_trait]
pub trait ToxicityModel: Send + Sync {
    /// Scores `texts`, returning one entry per supported label.
    async fn classify(&self, texts: &[String]) -> Result<Vec<LabelPrediction>, InferenceError>;

    /// Labels in the order [`classify`](Self::classify) reports them.
    fn labels(&self) -> Vec<String>;
}

/// Acquires models. Each call may be a full load.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, threshold: f32) -> Result<Arc<dyn ToxicityModel>, InferenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matched_follows_threshold() {
        assert_eq!(PredictionResult::new([0.1, 0.9], 0.7).matched, Some(true));
        assert_eq!(PredictionResult::new([0.9, 0.1], 0.7).matched, Some(false));
        assert_eq!(PredictionResult::new([0.4, 0.6], 0.7).matched, None);
        assert_eq!(PredictionResult::new([0.3, 0.7], 0.7).matched, None);
    }

    #[test]
    fn test_first_text_predictions() {
        let predictions = vec![
            LabelPrediction {
                label: "insult".into(),
                results: vec![
                    PredictionResult::new([0.99, 0.01], 0.7),
                    PredictionResult::new([0.2, 0.8], 0.7),
                ],
            },
            LabelPrediction {
                label: "threat".into(),
                results: vec![],
            },
        ];
        let raw = first_text_predictions(&predictions);
        assert_eq!(raw, vec![RawPrediction::new("insult", [0.99, 0.01])]);
        assert_eq!(predictions[0].for_text(1), Some(RawPrediction::new("insult", [0.2, 0.8])));
    }

    #[test]
    fn test_threshold_validation() {
        assert!(validate_threshold(0.0).is_ok());
        assert!(validate_threshold(DEFAULT_THRESHOLD).is_ok());
        assert!(validate_threshold(1.0).is_ok());
        assert!(validate_threshold(1.5).is_err());
        assert!(validate_threshold(-0.1).is_err());
        assert!(validate_threshold(f32::NAN).is_err());
    }
}
