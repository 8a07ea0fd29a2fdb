//! In-memory stand-ins for the ONNX model.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use toxiscope::{InferenceError, LabelPrediction, ModelLoader, PredictionResult, ToxicityModel};

/// Returns fixed positive probabilities per label for every text.
pub struct FixedModel {
    pub scores: Vec<(String, f32)>,
    pub threshold: f32,
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ToxicityModel for FixedModel {
    async fn classify(&self, texts: &[String]) -> Result<Vec<LabelPrediction>, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .scores
            .iter()
            .map(|(label, positive)| LabelPrediction {
                label: label.clone(),
                results: texts
                    .iter()
                    .map(|_| PredictionResult::new([1.0 - positive, *positive], self.threshold))
                    .collect(),
            })
            .collect())
    }

    fn labels(&self) -> Vec<String> {
        self.scores.iter().map(|(label, _)| label.clone()).collect()
    }
}

pub struct FixedLoader {
    pub scores: Vec<(String, f32)>,
    pub loads: Arc<AtomicUsize>,
    pub classifications: Arc<AtomicUsize>,
}

impl FixedLoader {
    pub fn new(scores: &[(&str, f32)]) -> Self {
        Self {
            scores: scores.iter().map(|(l, p)| (l.to_string(), *p)).collect(),
            loads: Arc::new(AtomicUsize::new(0)),
            classifications: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for FixedLoader {
    async fn load(&self, threshold: f32) -> Result<Arc<dyn ToxicityModel>, InferenceError> {
        toxiscope::inference::validate_threshold(threshold)?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FixedModel {
            scores: self.scores.clone(),
            threshold,
            calls: Arc::clone(&self.classifications),
        }))
    }
}

/// Fails every load, like an unreachable weights server.
pub struct BrokenLoader;

#[async_trait]
impl ModelLoader for BrokenLoader {
    async fn load(&self, _threshold: f32) -> Result<Arc<dyn ToxicityModel>, InferenceError> {
        Err(InferenceError::Load("failed to fetch weights".into()))
    }
}
