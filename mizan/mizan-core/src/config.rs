//! Configuration for the Mizan pipelines.
//!
//! Configuration is read from a TOML file whose sections map onto the structs
//! below. Every section is optional; missing values take their defaults.
//!
//! ```toml
//! [general]
//! log_level = "info"
//! data_dir = ".mizan"
//!
//! [chunking]
//! target_size = 1000
//! overlap = 200
//!
//! [retrieval]
//! top_k = 60
//! rerank_top_n = 25
//! relevance_threshold = 0.6
//!
//! [generation]
//! default_backend = "local"
//! ```
//!
//! Environment variables override file values:
//!
//! - `MIZAN_LOG_LEVEL`, `MIZAN_DATA_DIR`
//! - `MIZAN_OLLAMA_URL`, `MIZAN_RERANK_URL`, `MIZAN_TRANSLATOR_URL`
//! - `MIZAN_DEFAULT_BACKEND`
//! - `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`

use crate::error::{MizanError, Result};
use crate::language::Language;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ENV_LOG_LEVEL: &str = "MIZAN_LOG_LEVEL";
const ENV_DATA_DIR: &str = "MIZAN_DATA_DIR";
const ENV_OLLAMA_URL: &str = "MIZAN_OLLAMA_URL";
const ENV_RERANK_URL: &str = "MIZAN_RERANK_URL";
const ENV_TRANSLATOR_URL: &str = "MIZAN_TRANSLATOR_URL";
const ENV_DEFAULT_BACKEND: &str = "MIZAN_DEFAULT_BACKEND";
const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MizanConfig {
    pub general: GeneralConfig,
    pub chunking: ChunkingConfig,
    pub extraction: ExtractionConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub target_size: usize,
    /// Overlap between consecutive chunks in characters
    pub overlap: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub digital_threshold: f32,
    pub ocr_threshold: f32,
    pub ocr_enabled: bool,
    /// Tesseract language spec
    pub ocr_languages: String,
    pub ocr_dpi: u32,
    pub ocr_psm: u32,
    pub premium_endpoint: Option<String>,
    pub premium_api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub rerank_top_n: usize,
    pub relevance_threshold: f32,
    /// Language the index is searched in
    pub index_language: Language,
    /// Embed chunks from their translation into `index_language`
    pub translate_chunks: bool,
    pub query_cache_size: u64,
    /// Snapshot file name, relative to `general.data_dir`
    pub snapshot_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// "local" or "hosted"
    pub default_backend: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Vocabulary that marks a question as in-domain
    pub domain_terms: Vec<String>,
    /// A top rerank score at or above this admits a question without domain terms
    pub strong_relevance_floor: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// "ollama", "openai" or "hashing"
    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_endpoint: Option<String>,
    pub embedding_dimension: usize,
    pub openai_api_key: Option<String>,
    pub rerank_url: Option<String>,
    pub ollama_url: String,
    pub ollama_model: String,
    pub anthropic_model: String,
    pub anthropic_api_key: Option<String>,
    pub translator_url: Option<String>,
    pub translator_api_key: Option<String>,
    pub http_timeout_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            data_dir: PathBuf::from(".mizan"),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_size: 1000,
            overlap: 200,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            digital_threshold: 0.7,
            ocr_threshold: 0.6,
            ocr_enabled: true,
            ocr_languages: "ara+eng".to_string(),
            ocr_dpi: 200,
            ocr_psm: 6,
            premium_endpoint: None,
            premium_api_key: None,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 60,
            rerank_top_n: 25,
            relevance_threshold: 0.6,
            index_language: Language::English,
            translate_chunks: false,
            query_cache_size: 1000,
            snapshot_file: "index.bin".to_string(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_backend: "local".to_string(),
            temperature: 0.2,
            max_tokens: 2000,
            domain_terms: default_domain_terms(),
            strong_relevance_floor: 0.8,
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            embedding_provider: "ollama".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            embedding_endpoint: None,
            embedding_dimension: 768,
            openai_api_key: None,
            rerank_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2".to_string(),
            anthropic_model: "claude-3-5-haiku-20241022".to_string(),
            anthropic_api_key: None,
            translator_url: None,
            translator_api_key: None,
            http_timeout_secs: 60,
        }
    }
}

/// Islamic-finance vocabulary in English, Malay and Arabic.
pub fn default_domain_terms() -> Vec<String> {
    [
        "shariah", "sharia", "syariah", "islamic", "islam", "riba", "murabaha", "murabahah",
        "musharakah", "musharaka", "mudarabah", "mudaraba", "ijarah", "ijara", "sukuk",
        "takaful", "zakat", "waqf", "wakaf", "halal", "haram", "gharar", "maysir", "fatwa",
        "fiqh", "tawarruq", "wadiah", "qard", "wakalah", "istisna", "salam", "bai", "hibah",
        "aaoifi", "ifsb", "bnm", "bank", "banking", "finance", "financing", "financial",
        "investment", "loan", "interest", "profit", "deposit", "contract", "sale", "debt",
        "perbankan", "kewangan", "pelaburan", "pinjaman", "faedah", "hukum", "patuh",
        "pembiayaan", "akad", "ربا", "شريعة", "الشريعة", "مرابحة", "مشاركة", "مضاربة",
        "إجارة", "اجارة", "صكوك", "تكافل", "زكاة", "وقف", "فتوى", "بيع", "حلال", "حرام",
        "غرر", "بنك", "مصرف", "تمويل", "قرض",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl MizanConfig {
    /// Load configuration from a TOML file, apply environment overrides and
    /// validate the result.
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MizanError::config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml_str(&content)?;
        config.merge_env_vars()?;
        config.validate()?;

        info!("Configuration loaded successfully from {}", path.display());
        Ok(config)
    }

    /// Load from `path` when given, otherwise start from defaults.
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path).await,
            None => {
                let mut config = Self::default();
                config.merge_env_vars()?;
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Parse a TOML document without applying overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| MizanError::config(format!("Failed to parse config file: {}", e)))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| MizanError::config(format!("Failed to serialize config: {}", e)))
    }

    /// Save to a TOML file, writing through a temporary file.
    pub async fn save_to_path(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());
        self.validate()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    MizanError::config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = self.to_toml_string()?;
        let temp_path = path.with_extension("toml.tmp");
        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|e| MizanError::config(format!("Failed to write config file: {}", e)))?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| MizanError::config(format!("Failed to rename config file: {}", e)))?;

        info!("Configuration saved successfully to {}", path.display());
        Ok(())
    }

    /// Path of the vector index snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        self.general.data_dir.join(&self.retrieval.snapshot_file)
    }

    /// Apply overrides from the process environment.
    pub fn merge_env_vars(&mut self) -> Result<()> {
        debug!("Merging environment variable overrides");
        self.merge_from(|key| std::env::var(key).ok());
        Ok(())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn merge_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(log_level) = lookup(ENV_LOG_LEVEL) {
            debug!("Overriding log_level from environment: {}", log_level);
            self.general.log_level = log_level;
        }
        if let Some(data_dir) = lookup(ENV_DATA_DIR) {
            debug!("Overriding data_dir from environment: {}", data_dir);
            self.general.data_dir = PathBuf::from(data_dir);
        }
        if let Some(url) = lookup(ENV_OLLAMA_URL) {
            debug!("Overriding ollama_url from environment: {}", url);
            self.providers.ollama_url = url;
        }
        if let Some(url) = lookup(ENV_RERANK_URL) {
            debug!("Overriding rerank_url from environment: {}", url);
            self.providers.rerank_url = Some(url);
        }
        if let Some(url) = lookup(ENV_TRANSLATOR_URL) {
            debug!("Overriding translator_url from environment: {}", url);
            self.providers.translator_url = Some(url);
        }
        if let Some(backend) = lookup(ENV_DEFAULT_BACKEND) {
            debug!("Overriding default_backend from environment: {}", backend);
            self.generation.default_backend = backend;
        }
        if let Some(key) = lookup(ENV_ANTHROPIC_API_KEY) {
            debug!("Overriding anthropic_api_key from environment");
            self.providers.anthropic_api_key = Some(key);
        }
        if let Some(key) = lookup(ENV_OPENAI_API_KEY) {
            debug!("Overriding openai_api_key from environment");
            self.providers.openai_api_key = Some(key);
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(MizanError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.general.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.chunking.target_size == 0 {
            return Err(MizanError::config("chunking.target_size must be greater than 0"));
        }
        if self.chunking.overlap >= self.chunking.target_size {
            return Err(MizanError::config(format!(
                "chunking.overlap ({}) must be smaller than chunking.target_size ({})",
                self.chunking.overlap, self.chunking.target_size
            )));
        }

        for (name, value) in [
            ("extraction.digital_threshold", self.extraction.digital_threshold),
            ("extraction.ocr_threshold", self.extraction.ocr_threshold),
            ("retrieval.relevance_threshold", self.retrieval.relevance_threshold),
            ("generation.strong_relevance_floor", self.generation.strong_relevance_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MizanError::config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.retrieval.top_k == 0 || self.retrieval.rerank_top_n == 0 {
            return Err(MizanError::config(
                "retrieval.top_k and retrieval.rerank_top_n must be greater than 0",
            ));
        }
        if self.retrieval.rerank_top_n > self.retrieval.top_k {
            return Err(MizanError::config(
                "retrieval.rerank_top_n cannot be greater than retrieval.top_k",
            ));
        }

        let valid_backends = ["local", "hosted"];
        if !valid_backends.contains(&self.generation.default_backend.as_str()) {
            return Err(MizanError::config(format!(
                "Invalid default backend '{}'. Must be one of: {}",
                self.generation.default_backend,
                valid_backends.join(", ")
            )));
        }
        let has_anthropic_key = self
            .providers
            .anthropic_api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());
        if self.generation.default_backend == "hosted" && !has_anthropic_key {
            return Err(MizanError::config(
                "generation.default_backend is 'hosted' but no Anthropic API key is set \
                 (providers.anthropic_api_key or ANTHROPIC_API_KEY)",
            ));
        }

        let valid_providers = ["ollama", "openai", "hashing"];
        if !valid_providers.contains(&self.providers.embedding_provider.as_str()) {
            return Err(MizanError::config(format!(
                "Invalid embedding provider '{}'. Must be one of: {}",
                self.providers.embedding_provider,
                valid_providers.join(", ")
            )));
        }
        if self.providers.embedding_dimension == 0 {
            return Err(MizanError::config(
                "providers.embedding_dimension must be greater than 0",
            ));
        }

        Ok(())
    }
}
