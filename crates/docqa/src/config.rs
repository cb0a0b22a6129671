//! TOML configuration parsing and validation.
//!
//! Every section and key is optional; missing values fall back to the
//! defaults below. Secrets such as `OPENAI_API_KEY` are read from the
//! environment by the backends, never from this file.
//!
//! ```toml
//! [bot]
//! name = "Acme Assistant"
//! organization = "Acme"
//!
//! [corpus]
//! dir = "./data"
//!
//! [embedding]
//! provider = "ollama"
//! model = "all-minilm"
//! dims = 384
//!
//! [synthesis]
//! provider = "ollama"
//! model = "gemma3:1b"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docqa_core::chunk::ChunkingParams;
use docqa_core::prompt::{PromptInstructions, DEFAULT_REFUSAL};

use crate::service::retry_schedule;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,
    #[serde(default = "default_organization")]
    pub organization: String,
    #[serde(default = "default_refusal")]
    pub refusal: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            organization: default_organization(),
            refusal: default_refusal(),
        }
    }
}

impl BotConfig {
    pub fn instructions(&self) -> PromptInstructions {
        PromptInstructions::new(&self.name, &self.organization).with_refusal(&self.refusal)
    }
}

fn default_bot_name() -> String {
    "DocQA Bot".to_string()
}
fn default_organization() -> String {
    "the company".to_string()
}
fn default_refusal() -> String {
    DEFAULT_REFUSAL.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_corpus_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: default_corpus_dir(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl CorpusConfig {
    /// Whether `name` ends in an allow-listed extension (case-insensitive).
    pub fn is_allowed(&self, name: &str) -> bool {
        match name.rsplit_once('.') {
            Some((_, ext)) => {
                let ext = ext.to_lowercase();
                self.allowed_extensions.iter().any(|a| *a == ext)
            }
            None => false,
        }
    }

    /// Human-readable list such as `.txt` or `.txt, .md`.
    pub fn describe_allowed(&self) -> String {
        self.allowed_extensions
            .iter()
            .map(|e| format!(".{}", e))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_allowed_extensions() -> Vec<String> {
    vec!["txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./index/docqa.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> Result<ChunkingParams> {
        ChunkingParams::new(self.chunk_size, self.chunk_overlap)
            .with_context(|| "invalid [chunking] section")
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_top_k() -> usize {
    docqa_core::retrieve::DEFAULT_TOP_K
}
fn default_max_context_chars() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (e.g. `http://localhost:11434` for Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 4,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_synthesis_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_synthesis_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            url: None,
            temperature: 0.0,
            max_retries: 5,
            timeout_secs: 120,
        }
    }
}

impl SynthesisConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_max_retries() -> u32 {
    4
}
fn default_synthesis_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_synthesis_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// `["*"]` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}
fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse, normalize, and validate a TOML config document.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    config.corpus.allowed_extensions = config
        .corpus
        .allowed_extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    config.chunking.params()?;

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.max_context_chars == 0 {
        anyhow::bail!("retrieval.max_context_chars must be > 0");
    }

    if config.corpus.allowed_extensions.is_empty() {
        anyhow::bail!("corpus.allowed_extensions must not be empty");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    // Validate synthesis
    match config.synthesis.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown synthesis provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.synthesis.is_enabled() && config.synthesis.model.is_none() {
        anyhow::bail!(
            "synthesis.model must be specified when provider is '{}'",
            config.synthesis.provider
        );
    }

    check_retry_budget(
        "embedding",
        config.embedding.max_retries,
        config.embedding.timeout_secs,
    )?;
    check_retry_budget(
        "synthesis",
        config.synthesis.max_retries,
        config.synthesis.timeout_secs,
    )?;

    Ok(())
}

/// The backoff schedule must leave room for requests inside `timeout_secs`.
fn check_retry_budget(section: &str, max_retries: u32, timeout_secs: u64) -> Result<()> {
    if timeout_secs == 0 {
        anyhow::bail!("{}.timeout_secs must be > 0", section);
    }
    let backoff = retry_schedule(max_retries).as_secs();
    if backoff >= timeout_secs {
        anyhow::bail!(
            "{section}.max_retries = {max_retries} sleeps {backoff}s between attempts, \
             which does not fit in {section}.timeout_secs = {timeout_secs}"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 20);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.corpus.allowed_extensions, vec!["txt"]);
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert_eq!(config.server.cors_origins, vec!["http://localhost:5173"]);
        assert!(!config.embedding.is_enabled());
        assert!(!config.synthesis.is_enabled());
        assert_eq!(config.embedding.max_retries, 4);
        assert_eq!(config.synthesis.max_retries, 5);
    }

    #[test]
    fn test_extensions_normalized() {
        let config = parse_config(
            r#"
            [corpus]
            allowed_extensions = [".TXT", "md"]
            "#,
        )
        .unwrap();
        assert_eq!(config.corpus.allowed_extensions, vec!["txt", "md"]);
        assert!(config.corpus.is_allowed("Notes.Md"));
        assert!(config.corpus.is_allowed("a.b.txt"));
        assert!(!config.corpus.is_allowed("report.pdf"));
        assert!(!config.corpus.is_allowed("txt"));
        assert_eq!(config.corpus.describe_allowed(), ".txt, .md");
    }

    #[test]
    fn test_overlap_must_be_below_size() {
        let err = parse_config(
            r#"
            [chunking]
            chunk_size = 100
            chunk_overlap = 100
            "#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("chunk_overlap"));
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let err = parse_config(
            r#"
            [embedding]
            provider = "ollama"
            model = "all-minilm"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));

        let ok = parse_config(
            r#"
            [embedding]
            provider = "ollama"
            model = "all-minilm"
            dims = 384
            "#,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse_config("[embedding]\nprovider = \"magic\"").is_err());
        assert!(parse_config("[synthesis]\nprovider = \"local\"").is_err());
    }

    #[test]
    fn test_synthesis_requires_model() {
        let err = parse_config("[synthesis]\nprovider = \"ollama\"").unwrap_err();
        assert!(err.to_string().contains("synthesis.model"));
    }

    #[test]
    fn test_retry_schedule_must_fit_timeout() {
        // 1 + 2 + 4 + 8 + 16 = 31s of backoff against a 30s budget.
        let err = parse_config("[embedding]\nmax_retries = 5\ntimeout_secs = 30").unwrap_err();
        assert!(err.to_string().contains("embedding.max_retries"));

        let err = parse_config("[synthesis]\nmax_retries = 3\ntimeout_secs = 7").unwrap_err();
        assert!(err.to_string().contains("synthesis.timeout_secs = 7"));

        assert!(parse_config("[synthesis]\nmax_retries = 3\ntimeout_secs = 8").is_ok());
        assert!(parse_config("[embedding]\ntimeout_secs = 0").is_err());
    }

    #[test]
    fn test_top_k_must_be_positive() {
        assert!(parse_config("[retrieval]\ntop_k = 0").is_err());
    }
}
