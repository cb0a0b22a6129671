//! Ingestion pipeline: document → chunks → embeddings → vector index.
//!
//! Two entry points:
//! - [`IngestionPipeline::ingest_corpus`] chunks every eligible file in the
//!   corpus directory, embeds all chunks in batches, and commits them in a
//!   single index write.
//! - [`IngestionPipeline::ingest_document`] handles one uploaded document,
//!   replacing any entries previously indexed under the same source.
//!
//! Nothing from a failed ingestion is committed.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use docqa_core::chunk::{chunk_document, ChunkingParams};
use docqa_core::embedding::Embedder;
use docqa_core::index::VectorIndex;
use docqa_core::models::{Chunk, Document, IndexEntry};
use docqa_core::{RagError, Result};

use crate::config::Config;
use crate::corpus;
use crate::service::with_timeout;

/// Counts from one corpus ingestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub documents: usize,
    pub chunks: usize,
}

pub struct IngestionPipeline {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    params: ChunkingParams,
    allowed_extensions: Vec<String>,
    batch_size: usize,
    embed_timeout: Duration,
}

impl IngestionPipeline {
    pub fn new(
        config: &Config,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            index,
            embedder,
            params: config.chunking.params()?,
            allowed_extensions: config.corpus.allowed_extensions.clone(),
            batch_size: config.embedding.batch_size.max(1),
            embed_timeout: Duration::from_secs(config.embedding.timeout_secs),
        })
    }

    /// Load, chunk, embed, and insert every eligible document under `dir`.
    pub async fn ingest_corpus(&self, dir: &Path) -> anyhow::Result<IngestStats> {
        let docs = corpus::load_corpus(dir, &self.allowed_extensions)?;
        Ok(self.ingest_documents(docs).await?)
    }

    /// Chunk, embed, and bulk-insert `docs` in one index write.
    pub async fn ingest_documents(&self, docs: Vec<Document>) -> Result<IngestStats> {
        let started = Instant::now();

        let chunks: Vec<Chunk> = docs
            .iter()
            .flat_map(|doc| chunk_document(doc, &self.params))
            .collect();
        let entries = self.embed_chunks(chunks).await?;
        let stats = IngestStats {
            documents: docs.len(),
            chunks: entries.len(),
        };

        self.index
            .insert(entries)
            .await
            .map_err(|e| RagError::ingestion("corpus", e))?;

        info!(
            documents = stats.documents,
            chunks = stats.chunks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "corpus ingested"
        );
        Ok(stats)
    }

    /// Index a single document, replacing any earlier version of the same
    /// source. Returns the number of chunks inserted.
    pub async fn ingest_document(&self, doc: Document) -> Result<usize> {
        let started = Instant::now();
        let source = doc.source.clone();

        self.validate(&doc)
            .map_err(|e| RagError::ingestion(&source, e))?;

        let chunks = chunk_document(&doc, &self.params);
        let entries = self.embed_chunks(chunks).await?;
        let count = self
            .index
            .replace_source(&source, entries)
            .await
            .map_err(|e| RagError::ingestion(&source, e))?;

        info!(
            source = %source,
            chunks = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document ingested"
        );
        Ok(count)
    }

    fn validate(&self, doc: &Document) -> Result<()> {
        let allowed = doc
            .source
            .rsplit_once('.')
            .map(|(_, ext)| {
                let ext = ext.to_lowercase();
                self.allowed_extensions.iter().any(|a| *a == ext)
            })
            .unwrap_or(false);
        if !allowed {
            return Err(RagError::Validation(format!(
                "{} does not have an allowed extension",
                doc.source
            )));
        }
        if doc.text.contains('\0') {
            return Err(RagError::Validation(format!(
                "{} is not a text file (contains NUL bytes)",
                doc.source
            )));
        }
        Ok(())
    }

    /// Embed chunks in batches, pairing each with its vector.
    ///
    /// A failure is attributed to the source of the first chunk in the
    /// failing batch.
    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<IndexEntry>> {
        let mut entries = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = with_timeout(
                "embedding",
                self.embed_timeout,
                self.embedder.embed(&texts),
            )
            .await
            .and_then(|vectors| {
                if vectors.len() == texts.len() {
                    Ok(vectors)
                } else {
                    Err(RagError::Service {
                        service: "embedding".into(),
                        message: format!(
                            "expected {} embeddings, got {}",
                            texts.len(),
                            vectors.len()
                        ),
                    })
                }
            })
            .map_err(|e| RagError::ingestion(&batch[0].source, e))?;

            debug!(batch = batch.len(), "embedded batch");
            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, vector)| IndexEntry::new(chunk, vector)),
            );
        }

        Ok(entries)
    }
}
