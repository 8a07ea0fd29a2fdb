use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{InferenceError, ModelLoader, ToxicityModel};

/// Whether repeated loads hand back the same model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Load a fresh model for every request.
    #[default]
    Reload,
    /// Load once per threshold and reuse the handle afterwards.
    Reuse,
}

type CachedModel = (u32, Arc<dyn ToxicityModel>);

/// Wraps a loader and applies a [`CachePolicy`] to it.
pub struct CachingLoader<L> {
    inner: L,
    policy: CachePolicy,
    cached: Mutex<Option<CachedModel>>,
    loads: AtomicUsize,
}

impl<L: ModelLoader> CachingLoader<L> {
    pub fn new(inner: L, policy: CachePolicy) -> Self {
        Self {
            inner,
            policy,
            cached: Mutex::new(None),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// How many times the wrapped loader actually ran.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    async fn load_fresh(&self, threshold: f32) -> Result<Arc<dyn ToxicityModel>, InferenceError> {
        let model = self.inner.load(threshold).await?;
        let count = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Model load #{} (threshold {})", count, threshold);
        Ok(model)
    }
}

#[async_trait]
impl<L: ModelLoader> ModelLoader for CachingLoader<L> {
    async fn load(&self, threshold: f32) -> Result<Arc<dyn ToxicityModel>, InferenceError> {
        match self.policy {
            CachePolicy::Reload => self.load_fresh(threshold).await,
            CachePolicy::Reuse => {
                let mut cached = self.cached.lock().await;
                if let Some((bits, model)) = cached.as_ref() {
                    if *bits == threshold.to_bits() {
                        return Ok(Arc::clone(model));
                    }
                    info!("Threshold changed, reloading model");
                }
                let model = self.load_fresh(threshold).await?;
                *cached = Some((threshold.to_bits(), Arc::clone(&model)));
                Ok(model)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{LabelPrediction, PredictionResult};

    struct StaticModel;

    #[async_trait]
    impl ToxicityModel for StaticModel {
        async fn classify(&self, texts: &[String]) -> Result<Vec<LabelPrediction>, InferenceError> {
            Ok(vec![LabelPrediction {
                label: "toxicity".into(),
                results: texts.iter().map(|_| PredictionResult::new([1.0, 0.0], 0.7)).collect(),
            }])
        }

        fn labels(&self) -> Vec<String> {
            vec!["toxicity".into()]
        }
    }

    struct StaticLoader;

    #[async_trait]
    impl ModelLoader for StaticLoader {
        async fn load(&self, _threshold: f32) -> Result<Arc<dyn ToxicityModel>, InferenceError> {
            Ok(Arc::new(StaticModel))
        }
    }

    struct FailingLoader;

    #[async_trait]
    impl ModelLoader for FailingLoader {
        async fn load(&self, _threshold: f32) -> Result<Arc<dyn ToxicityModel>, InferenceError> {
            Err(InferenceError::Load("weights unavailable".into()))
        }
    }

    #[tokio::test]
    async fn test_reload_loads_every_time() -> Result<(), InferenceError> {
        let loader = CachingLoader::new(StaticLoader, CachePolicy::Reload);
        let first = loader.load(0.7).await?;
        let second = loader.load(0.7).await?;
        assert_eq!(loader.load_count(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.labels(), vec!["toxicity".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_reuse_loads_once() -> Result<(), InferenceError> {
        let loader = CachingLoader::new(StaticLoader, CachePolicy::Reuse);
        let first = loader.load(0.7).await?;
        let second = loader.load(0.7).await?;
        assert_eq!(loader.load_count(), 1);
        assert!(Arc::ptr_eq(&first, &second));

        loader.load(0.9).await?;
        assert_eq!(loader.load_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let loader = CachingLoader::new(FailingLoader, CachePolicy::Reuse);
        assert!(loader.load(0.7).await.is_err());
        assert!(loader.load(0.7).await.is_err());
        assert_eq!(loader.load_count(), 0);
        assert!(loader.cached.lock().await.is_none());
    }
}
