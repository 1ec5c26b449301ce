use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::{ExportMode, SourceFormat};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Where the vector store lives and whether a build replaces it.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_uri")]
    pub uri: String,
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: default_store_uri(),
            overwrite: true,
        }
    }
}

impl StoreConfig {
    /// Filesystem path of the SQLite file, accepting an optional `sqlite://` prefix.
    pub fn path(&self) -> PathBuf {
        let raw = self
            .uri
            .strip_prefix("sqlite://")
            .or_else(|| self.uri.strip_prefix("sqlite:"))
            .unwrap_or(&self.uri);
        PathBuf::from(raw)
    }
}

fn default_store_uri() -> String {
    "./data/docrag.sqlite".to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoaderConfig {
    #[serde(default)]
    pub export_mode: ExportMode,
    #[serde(default = "default_extensions")]
    pub extensions: BTreeMap<String, SourceFormat>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            export_mode: ExportMode::default(),
            extensions: default_extensions(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            max_file_bytes: default_max_file_bytes(),
            timeout_secs: default_fetch_timeout(),
        }
    }
}

impl LoaderConfig {
    /// Looks up the converter for a file extension (case-insensitive).
    pub fn format_for_extension(&self, ext: &str) -> Option<SourceFormat> {
        self.extensions.get(&ext.to_ascii_lowercase()).copied()
    }
}

fn default_extensions() -> BTreeMap<String, SourceFormat> {
    [
        ("md", SourceFormat::Markdown),
        ("markdown", SourceFormat::Markdown),
        ("txt", SourceFormat::Text),
        ("pdf", SourceFormat::Pdf),
        ("docx", SourceFormat::Docx),
        ("pptx", SourceFormat::Pptx),
        ("xlsx", SourceFormat::Xlsx),
    ]
    .into_iter()
    .map(|(ext, fmt)| (ext.to_string(), fmt))
    .collect()
}

fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_fetch_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    256
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Only read by the `hash` provider; every other provider is probed.
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            url: None,
            api_key_env: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: 0,
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: None,
            api_key_env: None,
            max_new_tokens: default_max_new_tokens(),
            temperature: None,
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generation_provider() -> String {
    "huggingface".to_string()
}
fn default_generation_model() -> String {
    "mistralai/Mixtral-8x7B-Instruct-v0.1".to_string()
}
fn default_max_new_tokens() -> u32 {
    512
}
fn default_generation_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub prompt_template: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            prompt_template: None,
        }
    }
}

fn default_top_k() -> usize {
    3
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.store.uri.trim().is_empty() {
        bail!("store.uri must not be empty");
    }

    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    if let Some(ref tpl) = config.retrieval.prompt_template {
        if !tpl.contains("{context}") || !tpl.contains("{question}") {
            bail!("retrieval.prompt_template must contain {{context}} and {{question}}");
        }
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "hash" => {
            if config.embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0 for the hash provider");
            }
        }
        "openai" | "ollama" | "huggingface" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, ollama, huggingface, or local.",
            other
        ),
    }

    match config.generation.provider.as_str() {
        "huggingface" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be huggingface, openai, or ollama.",
            other
        ),
    }

    if config.generation.model.trim().is_empty() {
        bail!("generation.model must not be empty");
    }

    Ok(())
}
