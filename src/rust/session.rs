//! State owned by one interactive session: the pending input text, the
//! loading flag and the log of completed classifications.

use std::time::Instant;

use log::{info, warn};

use crate::formatter::{build_display_record, DisplayRecord};
use crate::inference::{first_text_predictions, InferenceError, LabelPrediction, ModelLoader};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("A classification is already in progress")]
    Busy,
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Completed classifications in the order they finished.
///
/// Records can only be appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultLog {
    records: Vec<DisplayRecord>,
}

impl ResultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: DisplayRecord) -> &DisplayRecord {
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DisplayRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&DisplayRecord> {
        self.records.last()
    }

    pub fn as_slice(&self) -> &[DisplayRecord] {
        &self.records
    }
}

impl<'a> IntoIterator for &'a ResultLog {
    type Item = &'a DisplayRecord;
    type IntoIter = std::slice::Iter<'a, DisplayRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// A request that has started but not finished.
///
/// Obtained from [`Session::begin`] and handed back to [`Session::finish`].
#[derive(Debug)]
#[must_use = "a pending request keeps the session busy until it is finished"]
pub struct PendingRequest {
    text: String,
    started: Instant,
}

impl PendingRequest {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn started(&self) -> Instant {
        self.started
    }
}

#[derive(Debug, Default)]
pub struct Session {
    text: String,
    log: ResultLog,
    loading: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Whether the classify trigger is enabled.
    pub fn can_classify(&self) -> bool {
        !self.loading
    }

    pub fn log(&self) -> &ResultLog {
        &self.log
    }

    /// Marks the session busy and snapshots the current text and start time.
    pub fn begin(&mut self) -> Result<PendingRequest, SessionError> {
        if self.loading {
            warn!("Classify requested while a request is in flight");
            return Err(SessionError::Busy);
        }
        self.loading = true;
        Ok(PendingRequest {
            text: self.text.clone(),
            started: Instant::now(),
        })
    }

    /// Completes a request. Loading is reset whatever the outcome.
    ///
    /// On success one record is appended and the text is cleared. On
    /// failure the log and text are left alone.
    pub fn finish(
        &mut self,
        pending: PendingRequest,
        outcome: Result<Vec<LabelPrediction>, InferenceError>,
    ) -> Result<&DisplayRecord, SessionError> {
        self.loading = false;
        let predictions = outcome?;

        let record = build_display_record(
            &first_text_predictions(&predictions),
            pending.text,
            pending.started,
        );
        info!("Classified in {}", record.time());
        self.text.clear();
        Ok(self.log.push(record))
    }

    /// Classifies the current text: acquire a model, run it on the text,
    /// append the formatted result.
    pub async fn classify<L>(&mut self, loader: &L, threshold: f32) -> Result<&DisplayRecord, SessionError>
    where
        L: ModelLoader + ?Sized,
    {
        let pending = self.begin()?;
        let outcome = run_inference(loader, threshold, pending.text()).await;
        self.finish(pending, outcome)
    }
}

async fn run_inference<L>(
    loader: &L,
    threshold: f32,
    text: &str,
) -> Result<Vec<LabelPrediction>, InferenceError>
where
    L: ModelLoader + ?Sized,
{
    let model = loader.load(threshold).await?;
    model.classify(&[text.to_string()]).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::PredictionResult;

    fn predictions(positive: f32) -> Vec<LabelPrediction> {
        vec![LabelPrediction {
            label: "toxicity".into(),
            results: vec![PredictionResult::new([1.0 - positive, positive], 0.7)],
        }]
    }

    #[test]
    fn test_begin_blocks_reentry() {
        let mut session = Session::new();
        session.set_text("first");
        let pending = session.begin().unwrap();
        assert!(session.is_loading());
        assert!(!session.can_classify());
        assert!(matches!(session.begin(), Err(SessionError::Busy)));

        session.finish(pending, Ok(predictions(0.9))).unwrap();
        assert!(!session.is_loading());
        assert!(session.can_classify());
        assert_eq!(session.log().len(), 1);
    }

    #[test]
    fn test_finish_appends_and_clears_text() {
        let mut session = Session::new();
        session.set_text("you are great");
        let pending = session.begin().unwrap();
        let record = session.finish(pending, Ok(predictions(0.02))).unwrap().clone();

        assert_eq!(record.text(), "you are great");
        assert_eq!(record.label("toxicity"), Some("2.00% ❌"));
        assert_eq!(session.text(), "");
        assert_eq!(session.log().last(), Some(&record));
    }

    #[test]
    fn test_failure_resets_loading_and_keeps_state() {
        let mut session = Session::new();
        session.set_text("keep me");
        let pending = session.begin().unwrap();
        let failed = matches!(
            session.finish(pending, Err(InferenceError::Model("boom".into()))),
            Err(SessionError::Inference(_))
        );

        assert!(failed);
        assert!(!session.is_loading());
        assert_eq!(session.text(), "keep me");
        assert!(session.log().is_empty());
    }

    #[test]
    fn test_record_uses_text_at_begin() {
        let mut session = Session::new();
        session.set_text("original");
        let pending = session.begin().unwrap();
        session.set_text("typed while waiting");
        let record = session.finish(pending, Ok(predictions(0.5))).unwrap();
        assert_eq!(record.text(), "original");
    }
}
