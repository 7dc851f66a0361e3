//! Subcommands and the shared state they are built from.

pub mod config;
pub mod documents;
pub mod extract;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use tracing::debug;

use invox_core::llm::{FieldExtractor, HttpGenerator};
use invox_core::models::{FileId, InvoxConfig, Owner};
use invox_core::ocr::{PureOcrEngine, TextRecognizer};
use invox_core::pipeline::{DocumentService, ExtractionOrchestrator};
use invox_core::store::{LocalFileStore, SqliteRepository};
use invox_core::Pbkdf2KeyDeriver;

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("invox")
        .join("config.json")
}

/// Load the configuration: explicit path, else the default file if present,
/// else built-in defaults. `INVOX_*` environment variables apply last.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<InvoxConfig> {
    let mut config = match config_path {
        Some(path) => InvoxConfig::from_file(Path::new(path))
            .with_context(|| format!("failed to read config file {}", path))?,
        None => {
            let default_path = default_config_path();
            if default_path.exists() {
                debug!("Using config file {}", default_path.display());
                InvoxConfig::from_file(&default_path)?
            } else {
                InvoxConfig::default()
            }
        }
    };
    config.apply_env();
    Ok(config)
}

/// Storage handles opened from configuration.
pub struct Context {
    pub config: InvoxConfig,
    repository: Arc<SqliteRepository>,
    files: Arc<LocalFileStore>,
    keys: Arc<Pbkdf2KeyDeriver>,
}

impl Context {
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let config = load_config(config_path)?;
        let repository = SqliteRepository::open(&config.storage.database_path).with_context(|| {
            format!(
                "failed to open database {}",
                config.storage.database_path.display()
            )
        })?;

        Ok(Self {
            repository: Arc::new(repository),
            files: Arc::new(LocalFileStore::new(&config.storage.data_dir)),
            keys: Arc::new(Pbkdf2KeyDeriver::new().with_iterations(config.crypto.iterations)),
            config,
        })
    }

    pub fn documents(&self) -> DocumentService {
        DocumentService::new(self.repository.clone(), self.files.clone(), self.keys.clone())
            .with_salt_len(self.config.crypto.salt_len)
    }

    /// Build the extraction pipeline. Loads the OCR models and the HTTP
    /// client, so call it off the async runtime.
    pub fn orchestrator(&self) -> anyhow::Result<ExtractionOrchestrator> {
        let engine = PureOcrEngine::from_config(&self.config.ocr)
            .context("failed to load OCR models")?;
        let generator = HttpGenerator::from_config(&self.config.llm)?;

        Ok(ExtractionOrchestrator::new(
            self.repository.clone(),
            self.files.clone(),
            self.keys.clone(),
            TextRecognizer::new(Box::new(engine)),
            FieldExtractor::new(Box::new(generator)),
        )
        .configured(&self.config))
    }

    /// Look up a registered owner or fail with a hint.
    pub fn owner(&self, username: &str) -> anyhow::Result<Owner> {
        self.documents().owner(username)?.ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown user '{}'. Run 'invox register {}' first.",
                username,
                username
            )
        })
    }
}

pub fn parse_file_id(raw: &str) -> anyhow::Result<FileId> {
    raw.parse()
        .map_err(|e| anyhow::anyhow!("Invalid file id '{}': {}", raw, e))
}
