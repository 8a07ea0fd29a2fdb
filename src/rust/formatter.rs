//! Turns raw per-label model output into the rows shown in the results table.
//!
//! Everything here is pure: the only environment read is the clock in
//! [`build_display_record`], and [`display_record_with_elapsed`] takes the
//! elapsed time as an argument instead.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Appended to a percentage at or above [`PASS_PERCENTAGE`].
pub const PASS_GLYPH: &str = "✔️";
/// Appended to a percentage below [`PASS_PERCENTAGE`].
pub const FAIL_GLYPH: &str = "❌";
/// Display-only cutoff, compared against the unrounded percentage.
///
/// Unrelated to the threshold the model is loaded with.
pub const PASS_PERCENTAGE: f64 = 50.0;

/// The outcome of one label for one text.
///
/// `probabilities[0]` is the negative-class probability and
/// `probabilities[1]` the positive-class probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    pub label: String,
    pub probabilities: [f32; 2],
}

impl RawPrediction {
    pub fn new(label: impl Into<String>, probabilities: [f32; 2]) -> Self {
        Self {
            label: label.into(),
            probabilities,
        }
    }

    /// Builds a prediction from the positive-class probability alone.
    pub fn from_positive(label: impl Into<String>, positive: f32) -> Self {
        Self::new(label, [1.0 - positive, positive])
    }

    pub fn positive(&self) -> f32 {
        self.probabilities[1]
    }
}

/// One row of the results table: a classified text, its per-label scores
/// and how long the request took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayRecord {
    #[serde(flatten)]
    labels: BTreeMap<String, String>,
    text: String,
    time: String,
}

impl DisplayRecord {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn time(&self) -> &str {
        &self.time
    }

    /// Formatted scores keyed by lowercase label.
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn label(&self, label: &str) -> Option<&str> {
        self.labels.get(label).map(String::as_str)
    }

    /// Looks a cell up by column name, case-insensitively.
    ///
    /// `text` and `time` shadow labels with the same name.
    pub fn get(&self, column: &str) -> Option<&str> {
        let key = column.to_lowercase();
        match key.as_str() {
            "text" => Some(&self.text),
            "time" => Some(&self.time),
            _ => self.label(&key),
        }
    }
}

/// Formats one label as `"<percentage>% <glyph>"`.
///
/// The percentage always carries two decimals. The glyph is chosen from the
/// unrounded percentage, so `0.499999` renders as `"50.00% ❌"`.
pub fn format_label(prediction: &RawPrediction) -> String {
    let value = f64::from(prediction.positive()) * 100.0;
    let glyph = if value >= PASS_PERCENTAGE {
        PASS_GLYPH
    } else {
        FAIL_GLYPH
    };
    format!("{:.2}% {}", value, glyph)
}

/// Formats every prediction, keyed by lowercase label.
///
/// The result covers exactly the labels present in `predictions`; no fixed
/// label set is assumed here. A repeated label keeps its last value.
pub fn format_predictions(predictions: &[RawPrediction]) -> BTreeMap<String, String> {
    predictions
        .iter()
        .map(|prediction| (prediction.label.to_lowercase(), format_label(prediction)))
        .collect()
}

/// Renders a duration as whole milliseconds, e.g. `"123ms"`.
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{}ms", elapsed.as_millis())
}

/// Builds a record for a request that started at `start`.
///
/// `start` should be captured immediately before the inference call.
pub fn build_display_record(
    predictions: &[RawPrediction],
    text: impl Into<String>,
    start: Instant,
) -> DisplayRecord {
    display_record_with_elapsed(predictions, text, start.elapsed())
}

/// Builds a record with an already measured elapsed time.
pub fn display_record_with_elapsed(
    predictions: &[RawPrediction],
    text: impl Into<String>,
    elapsed: Duration,
) -> DisplayRecord {
    let mut labels = format_predictions(predictions);
    labels.remove("text");
    labels.remove("time");

    DisplayRecord {
        labels,
        text: text.into(),
        time: format_elapsed(elapsed),
    }
}
