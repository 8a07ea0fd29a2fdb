//! Scores free text for toxicity, one probability per label, and keeps a
//! running table of the results.
//!
//! # Basic Usage
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use toxiscope::{ClassifierConfig, ModelSource, OnnxLoader, Session, DEFAULT_THRESHOLD};
//!
//! let config = ClassifierConfig::default().with_source(ModelSource::Files {
//!     model_path: "models/toxicity/model.onnx".into(),
//!     tokenizer_path: "models/toxicity/tokenizer.json".into(),
//! });
//! let loader = OnnxLoader::new(config);
//!
//! let mut session = Session::new();
//! session.set_text("have a nice day");
//! let record = session.classify(&loader, DEFAULT_THRESHOLD).await?;
//! println!("toxicity: {:?} in {}", record.label("toxicity"), record.time());
//! # Ok(())
//! # }
//! ```
//!
//! # Formatting
//!
//! The formatter is pure and usable on its own:
//!
//! ```
//! use std::time::Duration;
//! use toxiscope::{display_record_with_elapsed, RawPrediction};
//!
//! let predictions = vec![
//!     RawPrediction::new("toxicity", [0.1, 0.9]),
//!     RawPrediction::new("insult", [0.99, 0.01]),
//! ];
//! let record = display_record_with_elapsed(&predictions, "hello", Duration::from_millis(123));
//! assert_eq!(record.label("toxicity"), Some("90.00% ✔️"));
//! assert_eq!(record.label("insult"), Some("1.00% ❌"));
//! assert_eq!(record.time(), "123ms");
//! ```

pub mod config;
pub mod formatter;
pub mod inference;
pub mod labels;
pub mod model_manager;
mod runtime;
pub mod session;
pub mod table;

pub use config::{ClassifierConfig, ConfigError, ModelSource};
pub use formatter::{
    build_display_record, display_record_with_elapsed, format_label, format_predictions,
    DisplayRecord, RawPrediction,
};
pub use inference::{
    CachePolicy, CachingLoader, InferenceError, LabelPrediction, ModelLoader, OnnxLoader,
    OnnxToxicityModel, PredictionResult, ToxicityModel, DEFAULT_THRESHOLD,
};
pub use labels::{ToxicityLabel, HEADER};
pub use model_manager::{ModelError, ModelInfo, ModelManager};
pub use runtime::{create_session_builder, RuntimeConfig};
pub use session::{PendingRequest, ResultLog, Session, SessionError};
pub use table::{render_json_lines, render_table};

pub fn init_logger() {
    env_logger::init();
}
