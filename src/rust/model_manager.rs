use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

/// Environment variable overriding the cache root.
pub const CACHE_ENV: &str = "TOXISCOPE_CACHE";

const MODEL_FILE: &str = "model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model not downloaded: {0}")]
    NotDownloaded(String),
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Model verification failed")]
    VerificationFailed,
    #[error("Hash mismatch: expected {expected}, got {actual} for {file_type} file")]
    HashMismatch {
        file_type: String,
        expected: String,
        actual: String,
    },
}

/// Where a model's files come from and what they should hash to.
///
/// Hashes are lowercase hex SHA-256. Without a hash a present file is
/// accepted as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub model_url: String,
    pub tokenizer_url: String,
    pub model_hash: Option<String>,
    pub tokenizer_hash: Option<String>,
}

impl ModelInfo {
    pub fn new(
        name: impl Into<String>,
        model_url: impl Into<String>,
        tokenizer_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            model_url: model_url.into(),
            tokenizer_url: tokenizer_url.into(),
            model_hash: None,
            tokenizer_hash: None,
        }
    }

    pub fn with_hashes(mut self, model_hash: Option<String>, tokenizer_hash: Option<String>) -> Self {
        self.model_hash = model_hash.map(|h| h.to_lowercase());
        self.tokenizer_hash = tokenizer_hash.map(|h| h.to_lowercase());
        self
    }
}

/// Keeps downloaded model files under `<models_dir>/<name>/`.
#[derive(Clone)]
pub struct ModelManager {
    models_dir: PathBuf,
    download_lock: Arc<Mutex<()>>,
}

impl ModelManager {
    /// Creates a new ModelManager with the default models directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_models_dir())
    }

    /// Returns the default models directory path
    pub fn get_default_models_dir() -> PathBuf {
        if let Ok(path) = env::var(CACHE_ENV) {
            return PathBuf::from(path).join("models");
        }
        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("toxiscope").join("models");
        }
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("toxiscope").join("models");
        }
        env::temp_dir().join("toxiscope").join("models")
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn get_model_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(name).join(MODEL_FILE)
    }

    pub fn get_tokenizer_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(name).join(TOKENIZER_FILE)
    }

    pub fn is_model_downloaded(&self, name: &str) -> bool {
        let model_path = self.get_model_path(name);
        let tokenizer_path = self.get_tokenizer_path(name);
        log::debug!("Model path: {:?} (exists: {})", model_path, model_path.exists());
        log::debug!("Tokenizer path: {:?} (exists: {})", tokenizer_path, tokenizer_path.exists());
        model_path.exists() && tokenizer_path.exists()
    }

    /// Downloads whichever of the two files is missing or fails verification.
    pub async fn download_model(&self, info: &ModelInfo) -> Result<(), ModelError> {
        let _lock = self.download_lock.lock().await;

        let model_dir = self.models_dir.join(&info.name);
        log::info!("Preparing model directory at {:?}", model_dir);
        fs::create_dir_all(&model_dir)?;

        let model_path = self.get_model_path(&info.name);
        let model_result = self
            .ensure_file(&info.model_url, &model_path, info.model_hash.as_deref(), "model")
            .await;
        let tokenizer_path = self.get_tokenizer_path(&info.name);
        let tokenizer_result = self
            .ensure_file(
                &info.tokenizer_url,
                &tokenizer_path,
                info.tokenizer_hash.as_deref(),
                "tokenizer",
            )
            .await;

        match (model_result, tokenizer_result) {
            (Ok(()), Ok(())) => {
                log::info!("Model '{}' ready to use", info.name);
                Ok(())
            }
            (Err(e), _) | (_, Err(e)) => {
                log::error!("Failed to set up model '{}': {}", info.name, e);
                let _ = self.remove_download(&info.name);
                Err(e)
            }
        }
    }

    async fn ensure_file(
        &self,
        url: &str,
        path: &Path,
        expected_hash: Option<&str>,
        file_type: &str,
    ) -> Result<(), ModelError> {
        if path.exists() {
            if self.verify_file(path, expected_hash)? {
                log::info!("Existing {} file verified", file_type);
                return Ok(());
            }
            log::warn!("{} file verification failed, redownloading", file_type);
        }
        self.download_and_verify_file(url, path, expected_hash, file_type).await
    }

    fn verify_file(&self, path: &Path, expected_hash: Option<&str>) -> Result<bool, ModelError> {
        let Some(expected_hash) = expected_hash else {
            log::warn!("No hash configured for {:?}, skipping verification", path);
            return Ok(path.exists());
        };
        let bytes = fs::read(path)?;
        let hash = sha256_hex(&bytes);
        log::debug!("Hash of {:?}: {} (expected {})", path, hash, expected_hash);
        Ok(hash == expected_hash)
    }

    pub fn verify_model(&self, info: &ModelInfo) -> Result<bool, ModelError> {
        let model_path = self.get_model_path(&info.name);
        let tokenizer_path = self.get_tokenizer_path(&info.name);

        if !model_path.exists() || !tokenizer_path.exists() {
            log::info!("Model '{}' is incomplete on disk", info.name);
            return Ok(false);
        }

        let model_ok = self.verify_file(&model_path, info.model_hash.as_deref())?;
        let tokenizer_ok = self.verify_file(&tokenizer_path, info.tokenizer_hash.as_deref())?;
        log::info!(
            "Verification of '{}': model {}, tokenizer {}",
            info.name,
            model_ok,
            tokenizer_ok
        );

        Ok(model_ok && tokenizer_ok)
    }

    async fn download_and_verify_file(
        &self,
        url: &str,
        path: &Path,
        expected_hash: Option<&str>,
        file_type: &str,
    ) -> Result<(), ModelError> {
        log::info!("Downloading {} file from {} to {:?}", file_type, url, path);
        let response = reqwest::get(url).await?.error_for_status()?;
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        if let Some(expected) = expected_hash {
            let hash = sha256_hex(&bytes);
            if hash != expected {
                log::error!("{} hash mismatch: expected {}, got {}", file_type, expected, hash);
                return Err(ModelError::HashMismatch {
                    file_type: file_type.to_string(),
                    expected: expected.to_string(),
                    actual: hash,
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &bytes)?;

        if !self.verify_file(path, expected_hash)? {
            return Err(ModelError::VerificationFailed);
        }

        log::info!("{} file downloaded and verified", file_type);
        Ok(())
    }

    pub fn remove_download(&self, name: &str) -> Result<(), ModelError> {
        for path in [self.get_model_path(name), self.get_tokenizer_path(name)] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Makes sure both files are present and verified, downloading as needed,
    /// and returns their paths.
    pub async fn ensure_model_downloaded(
        &self,
        info: &ModelInfo,
    ) -> Result<(PathBuf, PathBuf), ModelError> {
        if !self.is_model_downloaded(&info.name) {
            log::info!("Model '{}' not found, downloading...", info.name);
            self.download_model(info).await?;
        } else if !self.verify_model(info)? {
            log::info!("Model '{}' failed verification, re-downloading...", info.name);
            self.remove_download(&info.name)?;
            self.download_model(info).await?;
        }
        Ok((self.get_model_path(&info.name), self.get_tokenizer_path(&info.name)))
    }

    /// Paths of an already downloaded model.
    pub fn downloaded_paths(&self, name: &str) -> Result<(PathBuf, PathBuf), ModelError> {
        if !self.is_model_downloaded(name) {
            return Err(ModelError::NotDownloaded(name.to_string()));
        }
        Ok((self.get_model_path(name), self.get_tokenizer_path(name)))
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_manager(tag: &str) -> ModelManager {
        let dir = env::temp_dir()
            .join("toxiscope-tests")
            .join(format!("{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        ModelManager::new(&dir).unwrap()
    }

    fn write_model_files(manager: &ModelManager, name: &str) {
        let model_path = manager.get_model_path(name);
        fs::create_dir_all(model_path.parent().unwrap()).unwrap();
        fs::write(&model_path, b"onnx bytes").unwrap();
        fs::write(manager.get_tokenizer_path(name), b"{}").unwrap();
    }

    #[test]
    fn test_default_models_dir() {
        env::set_var(CACHE_ENV, "/tmp/test-cache");
        let path = ModelManager::get_default_models_dir();
        assert!(path.to_str().unwrap().contains("/tmp/test-cache/models"));
        env::remove_var(CACHE_ENV);

        let path = ModelManager::get_default_models_dir();
        assert!(path.to_str().unwrap().contains("toxiscope/models"));
    }

    #[test]
    fn test_model_paths() {
        let manager = scratch_manager("paths");
        assert!(manager.get_model_path("detox").ends_with("detox/model.onnx"));
        assert!(manager.get_tokenizer_path("detox").ends_with("detox/tokenizer.json"));
        assert!(matches!(
            manager.downloaded_paths("detox"),
            Err(ModelError::NotDownloaded(_))
        ));
    }

    #[test]
    fn test_verify_with_and_without_hashes() -> Result<(), ModelError> {
        let manager = scratch_manager("verify");
        let info = ModelInfo::new("detox", "http://unused/model", "http://unused/tokenizer");

        assert!(!manager.verify_model(&info)?);
        write_model_files(&manager, "detox");
        assert!(manager.verify_model(&info)?);

        let hashed = info.clone().with_hashes(
            Some(sha256_hex(b"onnx bytes").to_uppercase()),
            Some(sha256_hex(b"{}")),
        );
        assert!(manager.verify_model(&hashed)?);

        fs::write(manager.get_model_path("detox"), "corrupted data")?;
        assert!(!manager.verify_model(&hashed)?);
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_uses_verified_files_without_network() -> Result<(), ModelError> {
        let manager = scratch_manager("ensure");
        write_model_files(&manager, "detox");
        let info = ModelInfo::new("detox", "http://127.0.0.1:9/model", "http://127.0.0.1:9/tok")
            .with_hashes(Some(sha256_hex(b"onnx bytes")), None);

        let (model, tokenizer) = manager.ensure_model_downloaded(&info).await?;
        assert_eq!(model, manager.get_model_path("detox"));
        assert_eq!(tokenizer, manager.get_tokenizer_path("detox"));
        Ok(())
    }

    #[test]
    fn test_remove_download() -> Result<(), ModelError> {
        let manager = scratch_manager("remove");
        write_model_files(&manager, "detox");
        assert!(manager.is_model_downloaded("detox"));
        manager.remove_download("detox")?;
        assert!(!manager.is_model_downloaded("detox"));
        manager.remove_download("detox")?;
        Ok(())
    }
}
