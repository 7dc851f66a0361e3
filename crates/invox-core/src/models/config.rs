//! Configuration structures for the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::crypto::LEGACY_ITERATIONS;

/// Main configuration for invox.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoxConfig {
    /// Storage locations.
    pub storage: StorageConfig,

    /// Key derivation settings.
    pub crypto: CryptoConfig,

    /// Image normalization before OCR.
    pub preprocessing: PreprocessConfig,

    /// OCR engine configuration.
    pub ocr: OcrConfig,

    /// PDF rasterization configuration.
    pub pdf: PdfConfig,

    /// Generative model configuration.
    pub llm: LlmConfig,
}

/// Where encrypted uploads, the database and scratch files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding encrypted uploads.
    pub data_dir: PathBuf,

    /// SQLite database file.
    pub database_path: PathBuf,

    /// Root for per-run scratch directories (system temp dir when unset).
    pub scratch_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("invoices_data"),
            database_path: PathBuf::from("invox.db"),
            scratch_dir: None,
        }
    }
}

/// Key derivation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// PBKDF2-HMAC-SHA256 iteration count.
    pub iterations: u32,

    /// Salt length for newly registered owners.
    pub salt_len: usize,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            iterations: LEGACY_ITERATIONS,
            salt_len: 16,
        }
    }
}

/// Image normalization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Longest side after downscaling.
    pub max_image_size: u32,

    /// Neighbourhood size for adaptive thresholding (odd).
    pub threshold_block_size: u32,

    /// Constant subtracted from the local mean.
    pub threshold_offset: i32,

    /// Apply a 3x3 median filter before thresholding.
    pub denoise: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_image_size: 2048,
            threshold_block_size: 15,
            threshold_offset: 5,
            denoise: true,
        }
    }
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Directory containing model files.
    pub model_dir: PathBuf,

    /// Text detection model file name.
    pub detection_model: String,

    /// Text recognition model file name.
    pub recognition_model: String,

    /// Character dictionary file name.
    pub dictionary: String,

    /// Keep `[UNK]` markers for unrecognized glyphs.
    pub keep_unk: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            detection_model: "det.onnx".to_string(),
            recognition_model: "latin_rec.onnx".to_string(),
            dictionary: "latin_dict.txt".to_string(),
            keep_unk: false,
        }
    }
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Maximum pages to OCR (0 = unlimited).
    pub max_pages: usize,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self { max_pages: 10 }
    }
}

/// Generative model endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an Ollama-compatible server.
    pub endpoint: String,

    /// Model name.
    pub model: String,

    /// Maximum tokens to generate.
    pub max_new_tokens: u32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Environment variable holding a bearer token, if the endpoint needs one.
    pub api_key_env: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "smollm2:360m".to_string(),
            max_new_tokens: 512,
            timeout_secs: 120,
            api_key_env: None,
        }
    }
}

impl InvoxConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }

    /// Apply `INVOX_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("INVOX_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("INVOX_DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(v);
        }
        if let Some(v) = get("INVOX_SCRATCH_DIR") {
            self.storage.scratch_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("INVOX_LLM_ENDPOINT") {
            self.llm.endpoint = v;
        }
        if let Some(v) = get("INVOX_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("INVOX_OCR_MODEL_DIR") {
            self.ocr.model_dir = PathBuf::from(v);
        }
    }

    /// Get full path to an OCR model file.
    pub fn model_path(&self, model_name: &str) -> PathBuf {
        self.ocr.model_dir.join(model_name)
    }
}
