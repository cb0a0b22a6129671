//! Deterministic stand-ins for the embedding and synthesis services.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use docqa::config::Config;
use docqa::Engine;
use docqa_core::embedding::Embedder;
use docqa_core::index::IndexStore;
use docqa_core::models::IndexEntry;
use docqa_core::prompt::DEFAULT_REFUSAL;
use docqa_core::synthesis::Synthesizer;
use docqa_core::{RagError, Result};

const VOCABULARY: &[&str] = &[
    "refund", "window", "days", "purchase", "shipping", "business", "password", "reset", "remote",
];

/// Bag-of-words embedder over a fixed vocabulary, plus one constant bias
/// dimension so no vector is all zeros.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl KeywordEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; VOCABULARY.len() + 1];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        if let Some(i) = VOCABULARY.iter().position(|k| *k == word) {
            v[i] += 1.0;
        }
    }
    v[VOCABULARY.len()] = 0.1;
    v
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        VOCABULARY.len() + 1
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::Service {
                service: "embedding".into(),
                message: "HTTP 500".into(),
            });
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// [`KeywordEmbedder`] that sleeps before answering.
pub struct SlowEmbedder(pub Duration);

#[async_trait]
impl Embedder for SlowEmbedder {
    fn model_name(&self) -> &str {
        "slow-test"
    }

    fn dims(&self) -> usize {
        VOCABULARY.len() + 1
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        tokio::time::sleep(self.0).await;
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// [`KeywordEmbedder`] that sleeps only for batches mentioning `marker`.
pub struct DelayedEmbedder {
    pub marker: &'static str,
    pub delay: Duration,
}

#[async_trait]
impl Embedder for DelayedEmbedder {
    fn model_name(&self) -> &str {
        "delayed-test"
    }

    fn dims(&self) -> usize {
        VOCABULARY.len() + 1
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains(self.marker)) {
            tokio::time::sleep(self.delay).await;
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Embedder that always returns vectors of a fixed dimension.
pub struct FixedDimsEmbedder(pub usize);

#[async_trait]
impl Embedder for FixedDimsEmbedder {
    fn model_name(&self) -> &str {
        "fixed-test"
    }

    fn dims(&self) -> usize {
        self.0
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0; self.0]).collect())
    }
}

/// Synthesizer that records every prompt and answers with a fixed reply.
pub struct RecordingSynthesizer {
    pub reply: String,
    pub delay: Option<Duration>,
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingSynthesizer {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            delay: Some(delay),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Synthesizer for RecordingSynthesizer {
    fn model_name(&self) -> &str {
        "recording-test"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.reply.clone())
    }
}

/// Answers with the first context sentence sharing a keyword with the
/// question, or the refusal when none does.
pub struct ExtractiveSynthesizer;

#[async_trait]
impl Synthesizer for ExtractiveSynthesizer {
    fn model_name(&self) -> &str {
        "extractive-test"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let context = prompt
            .split("Context:\n")
            .nth(1)
            .and_then(|rest| rest.split("\n\nQuestion: ").next())
            .unwrap_or("");
        let question = prompt.rsplit("Question: ").next().unwrap_or("");

        let wanted = keyword_vector(question);
        for sentence in context.split(". ") {
            let have = keyword_vector(sentence);
            if (0..VOCABULARY.len()).any(|i| wanted[i] > 0.0 && have[i] > 0.0) {
                return Ok(sentence.trim().to_string());
            }
        }
        Ok(DEFAULT_REFUSAL.to_string())
    }
}

/// Store wrapper whose writes start failing with `IndexUnavailable` once
/// `broken` is set.
pub struct FlakyStore<S> {
    pub inner: S,
    pub broken: AtomicBool,
}

impl<S> FlakyStore<S> {
    pub fn new(inner: S) -> Arc<Self> {
        Arc::new(Self {
            inner,
            broken: AtomicBool::new(false),
        })
    }

    pub fn break_now(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            Err(RagError::IndexUnavailable("disk gone".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<S: IndexStore> IndexStore for FlakyStore<S> {
    async fn exists(&self) -> Result<bool> {
        self.check()?;
        self.inner.exists().await
    }

    async fn load(&self) -> Result<Vec<IndexEntry>> {
        self.check()?;
        self.inner.load().await
    }

    async fn append(&self, entries: &[IndexEntry]) -> Result<()> {
        self.check()?;
        self.inner.append(entries).await
    }

    async fn replace_source(&self, source: &str, entries: &[IndexEntry]) -> Result<()> {
        self.check()?;
        self.inner.replace_source(source, entries).await
    }

    async fn clear(&self) -> Result<()> {
        self.check()?;
        self.inner.clear().await
    }

    async fn flush(&self) -> Result<()> {
        self.check()?;
        self.inner.flush().await
    }
}

pub const REFUNDS: &str = "Our refund window is 30 days from the date of purchase. \
Refunds go back to the original payment method.";
pub const SHIPPING: &str = "Standard shipping takes 5 business days. \
Express shipping takes 2 business days.";

/// Config pointing at `root/data`, with a small chunk size so documents
/// split into several chunks.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.bot.name = "Acme Bot".into();
    config.bot.organization = "Acme".into();
    config.corpus.dir = root.join("data");
    config.index.path = root.join("index").join("docqa.sqlite");
    config.chunking.chunk_size = 80;
    config.chunking.chunk_overlap = 10;
    config.retrieval.top_k = 1;
    config.embedding.timeout_secs = 5;
    config.synthesis.timeout_secs = 5;
    config
}

/// Write the two sample documents into the corpus directory.
pub fn write_corpus(config: &Config) {
    std::fs::create_dir_all(&config.corpus.dir).unwrap();
    std::fs::write(config.corpus.dir.join("refunds.txt"), REFUNDS).unwrap();
    std::fs::write(config.corpus.dir.join("shipping.txt"), SHIPPING).unwrap();
}

pub fn engine(
    config: &Config,
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn Embedder>,
    synthesizer: Arc<dyn Synthesizer>,
) -> Engine {
    Engine::with_services(config, store, embedder, synthesizer).unwrap()
}
