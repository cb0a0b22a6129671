//! The question-answering engine.
//!
//! [`Engine`] owns the vector index and both pipelines. It is constructed
//! explicitly, once, and shared as `Arc<Engine>`:
//!
//! 1. **Start**: open the index store and build the configured services.
//! 2. **Build or load**: reload a persisted index, or ingest the corpus
//!    directory and persist the result.
//! 3. **Serve**: answer questions and ingest uploads concurrently.
//! 4. **Shutdown**: persist the index.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::Mutex;
use tracing::{info, warn};

use docqa_core::embedding::Embedder;
use docqa_core::index::{IndexStore, VectorIndex};
use docqa_core::models::{Answer, Document};
use docqa_core::synthesis::Synthesizer;
use docqa_core::{RagError, Result};

use crate::config::Config;
use crate::corpus::{decode_text, sanitize_filename};
use crate::embedding::create_embedder;
use crate::ingest::{IngestStats, IngestionPipeline};
use crate::query::QueryPipeline;
use crate::sqlite_store::SqliteStore;
use crate::synthesis::create_synthesizer;

/// How [`Engine::build_or_load`] obtained the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    Loaded { entries: usize },
    Built(IngestStats),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub entries: usize,
    pub sources: usize,
    pub dimension: Option<usize>,
    pub embedding_model: String,
    pub synthesis_model: String,
}

/// A validated upload, ready to be saved and indexed.
#[derive(Debug)]
pub struct Upload {
    path: PathBuf,
    bytes: Vec<u8>,
    document: Document,
}

impl Upload {
    pub fn source(&self) -> &str {
        &self.document.source
    }
}

pub struct Engine {
    config: Config,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    synthesizer: Arc<dyn Synthesizer>,
    ingestion: IngestionPipeline,
    query: QueryPipeline,
    /// Held from the corpus write until the index swap of an upload.
    uploads: Mutex<()>,
}

impl Engine {
    /// [`open`](Self::open) then [`build_or_load`](Self::build_or_load).
    pub async fn start(config: &Config) -> anyhow::Result<Self> {
        let engine = Self::open(config).await?;
        engine.build_or_load().await?;
        Ok(engine)
    }

    /// Open the SQLite index and create the configured services.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        if !config.embedding.is_enabled() {
            bail!("embedding provider is disabled; set [embedding].provider in the config");
        }
        std::fs::create_dir_all(&config.corpus.dir).with_context(|| {
            format!(
                "Failed to create corpus directory: {}",
                config.corpus.dir.display()
            )
        })?;

        let store = Arc::new(SqliteStore::open(&config.index.path).await?);
        let embedder = create_embedder(&config.embedding)?;
        let synthesizer = create_synthesizer(&config.synthesis)?;

        Self::with_services(config, store, embedder, synthesizer)
    }

    /// Assemble an engine from explicit parts. Nothing is loaded until
    /// [`build_or_load`](Self::build_or_load).
    pub fn with_services(
        config: &Config,
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn Embedder>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> anyhow::Result<Self> {
        let index = Arc::new(VectorIndex::new(store));
        let ingestion = IngestionPipeline::new(config, index.clone(), embedder.clone())?;
        let query = QueryPipeline::new(config, index.clone(), embedder.clone(), synthesizer.clone());
        Ok(Self {
            config: config.clone(),
            index,
            embedder,
            synthesizer,
            ingestion,
            query,
            uploads: Mutex::new(()),
        })
    }

    /// Load the persisted index, or build it from the corpus directory when
    /// none exists.
    pub async fn build_or_load(&self) -> anyhow::Result<Startup> {
        if self.index.exists().await? {
            let entries = self.index.load().await?;
            self.check_dimension()?;
            info!(entries, "loaded persisted index");
            return Ok(Startup::Loaded { entries });
        }

        let stats = self.build().await?;
        Ok(Startup::Built(stats))
    }

    /// Drop every entry and re-ingest the corpus directory.
    pub async fn rebuild(&self) -> anyhow::Result<IngestStats> {
        self.build().await
    }

    async fn build(&self) -> anyhow::Result<IngestStats> {
        self.index.clear().await?;
        let stats = self.ingestion.ingest_corpus(&self.config.corpus.dir).await?;
        self.index.persist().await?;
        info!(
            documents = stats.documents,
            chunks = stats.chunks,
            "index built"
        );
        Ok(stats)
    }

    fn check_dimension(&self) -> anyhow::Result<()> {
        if let Some(dimension) = self.index.dimension() {
            if dimension != self.embedder.dims() {
                bail!(
                    "index was built with {}-dimensional embeddings but '{}' produces {}; \
                     run `docqa index rebuild`",
                    dimension,
                    self.embedder.model_name(),
                    self.embedder.dims()
                );
            }
        }
        Ok(())
    }

    pub async fn answer(&self, question: &str) -> Result<Answer> {
        self.query.answer(question).await
    }

    /// Index one document, replacing an earlier version of the same source.
    pub async fn ingest_document(&self, document: Document) -> Result<usize> {
        self.ingestion.ingest_document(document).await
    }

    /// Validate an uploaded file without touching disk or the index.
    pub fn validate_upload(&self, filename: &str, bytes: Vec<u8>) -> Result<Upload> {
        let corpus = &self.config.corpus;
        if !corpus.is_allowed(filename) {
            return Err(RagError::Validation(format!(
                "Only {} files are allowed",
                corpus.describe_allowed()
            )));
        }
        let name = sanitize_filename(filename)
            .filter(|n| corpus.is_allowed(n))
            .ok_or_else(|| RagError::Validation("Invalid filename".to_string()))?;
        let document = decode_text(&name, bytes.clone())?;

        Ok(Upload {
            path: corpus.dir.join(&name),
            bytes,
            document,
        })
    }

    /// Save an upload into the corpus directory, then index it.
    ///
    /// Uploads commit one at a time, so the file left on disk for a source
    /// is always the version its index entries came from. A failure after
    /// the save leaves the file on disk and the index unchanged.
    pub async fn commit_upload(&self, upload: Upload) -> Result<usize> {
        let _guard = self.uploads.lock().await;
        tokio::fs::write(&upload.path, &upload.bytes).await?;
        info!(path = %upload.path.display(), "upload saved");
        self.ingest_document(upload.document).await
    }

    /// Copy a local file into the corpus and index it, as an upload would.
    pub async fn ingest_file(&self, path: &Path) -> anyhow::Result<usize> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow::anyhow!("Not a file: {}", path.display()))?;
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let upload = self.validate_upload(filename, bytes)?;
        Ok(self.commit_upload(upload).await?)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            entries: self.index.len(),
            sources: self.index.source_count(),
            dimension: self.index.dimension(),
            embedding_model: self.embedder.model_name().to_string(),
            synthesis_model: self.synthesizer.model_name().to_string(),
        }
    }

    pub fn bot_name(&self) -> &str {
        self.query.bot_name()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Persist the index. Skipped when storage is already unavailable.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.index.is_available() {
            warn!("index storage unavailable; skipping persist on shutdown");
            return Ok(());
        }
        self.index.persist().await?;
        info!(entries = self.index.len(), "index persisted");
        Ok(())
    }
}
