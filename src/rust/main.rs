use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};

use toxiscope::config::DEFAULT_MAX_SEQUENCE_LENGTH;
use toxiscope::{
    render_table, CachePolicy, CachingLoader, ClassifierConfig, ModelInfo, ModelLoader,
    ModelManager, ModelSource, OnnxLoader, RuntimeConfig, Session, DEFAULT_THRESHOLD,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Texts to classify, one request each. Reads lines from stdin when omitted
    text: Vec<String>,

    /// Probability above which the model flags a label as matched
    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f32,

    /// Keep the loaded model between requests instead of loading it each time
    #[arg(long)]
    reuse_model: bool,

    /// Print each result as a JSON line instead of the table
    #[arg(long)]
    json: bool,

    /// ONNX model file to load directly
    #[arg(long, requires = "tokenizer")]
    model: Option<PathBuf>,

    /// Tokenizer file to load directly
    #[arg(long, requires = "model")]
    tokenizer: Option<PathBuf>,

    /// Name of the model in the cache directory
    #[arg(long, default_value = "toxicity")]
    name: String,

    /// URL to download the ONNX model from
    #[arg(long, requires = "tokenizer_url")]
    model_url: Option<String>,

    /// URL to download the tokenizer from
    #[arg(long, requires = "model_url")]
    tokenizer_url: Option<String>,

    /// Expected SHA-256 of the model file
    #[arg(long)]
    model_sha256: Option<String>,

    /// Expected SHA-256 of the tokenizer file
    #[arg(long)]
    tokenizer_sha256: Option<String>,

    /// Remove cached model files before starting
    #[arg(short, long)]
    fresh: bool,

    /// Longest token sequence fed to the model
    #[arg(long, default_value_t = DEFAULT_MAX_SEQUENCE_LENGTH)]
    max_sequence_length: usize,

    /// Model output labels in logit order, comma separated
    #[arg(long, value_delimiter = ',')]
    labels: Vec<String>,

    /// Only return these labels, comma separated
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,

    /// The model already outputs probabilities rather than logits
    #[arg(long)]
    probabilities: bool,

    /// Intra-op threads for ONNX Runtime (0 lets it decide)
    #[arg(long, default_value_t = 0)]
    intra_threads: usize,
}

impl Args {
    fn source(&self) -> ModelSource {
        if let (Some(model_path), Some(tokenizer_path)) = (&self.model, &self.tokenizer) {
            return ModelSource::Files {
                model_path: model_path.clone(),
                tokenizer_path: tokenizer_path.clone(),
            };
        }
        if let (Some(model_url), Some(tokenizer_url)) = (&self.model_url, &self.tokenizer_url) {
            return ModelSource::Remote(
                ModelInfo::new(&self.name, model_url, tokenizer_url)
                    .with_hashes(self.model_sha256.clone(), self.tokenizer_sha256.clone()),
            );
        }
        ModelSource::Cached(self.name.clone())
    }

    fn config(&self) -> ClassifierConfig {
        let mut config = ClassifierConfig::default()
            .with_source(self.source())
            .with_threshold(self.threshold)
            .with_max_sequence_length(self.max_sequence_length)
            .with_runtime_config(RuntimeConfig::default().with_threads(0, self.intra_threads))
            .with_cache_policy(if self.reuse_model {
                CachePolicy::Reuse
            } else {
                CachePolicy::Reload
            });
        if !self.labels.is_empty() {
            config = config.with_labels(self.labels.clone());
        }
        if !self.only.is_empty() {
            config = config.with_label_filter(self.only.clone());
        }
        config.outputs_logits = !self.probabilities;
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    toxiscope::init_logger();
    let args = Args::parse();

    let config = args.config();
    config.validate().context("Invalid configuration")?;

    let manager = ModelManager::new_default().context("Failed to create model cache")?;
    if args.fresh {
        info!("Fresh download requested - removing cached files for '{}'", args.name);
        manager.remove_download(&args.name)?;
    }

    let threshold = config.threshold;
    let policy = config.cache_policy;
    let loader = CachingLoader::new(OnnxLoader::new(config).with_manager(manager), policy);
    let mut session = Session::new();

    if !args.text.is_empty() {
        for text in &args.text {
            session.set_text(text.as_str());
            classify_and_show(&mut session, &loader, threshold, args.json).await?;
        }
        return Ok(());
    }

    println!("Enter text below and press Enter to classify it. Threshold is set to {}", threshold);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        session.set_text(line);
        if let Err(e) = classify_and_show(&mut session, &loader, threshold, args.json).await {
            error!("{:#}", e);
            eprintln!("Classification failed: {}", e);
        }
    }

    info!("Classified {} texts (model loaded {} times)", session.log().len(), loader.load_count());
    Ok(())
}

async fn classify_and_show<L>(session: &mut Session, loader: &L, threshold: f32, json: bool) -> Result<()>
where
    L: ModelLoader + ?Sized,
{
    eprintln!("Thinking...");
    let record = session.classify(loader, threshold).await?;
    if json {
        println!("{}", serde_json::to_string(record)?);
    } else {
        println!("{}", render_table(session.log()));
    }
    Ok(())
}
