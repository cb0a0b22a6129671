//! Query pipeline: question → embedding → retrieval → prompt → answer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use docqa_core::embedding::Embedder;
use docqa_core::index::VectorIndex;
use docqa_core::models::Answer;
use docqa_core::prompt::{build_prompt, PromptInstructions};
use docqa_core::retrieve::Retriever;
use docqa_core::synthesis::Synthesizer;
use docqa_core::{RagError, Result};

use crate::config::Config;
use crate::service::with_timeout;

pub struct QueryPipeline {
    retriever: Retriever,
    embedder: Arc<dyn Embedder>,
    synthesizer: Arc<dyn Synthesizer>,
    instructions: PromptInstructions,
    max_context_chars: usize,
    embed_timeout: Duration,
    synthesis_timeout: Duration,
}

impl QueryPipeline {
    pub fn new(
        config: &Config,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            retriever: Retriever::new(index, config.retrieval.top_k),
            embedder,
            synthesizer,
            instructions: config.bot.instructions(),
            max_context_chars: config.retrieval.max_context_chars,
            embed_timeout: Duration::from_secs(config.embedding.timeout_secs),
            synthesis_timeout: Duration::from_secs(config.synthesis.timeout_secs),
        }
    }

    pub fn bot_name(&self) -> &str {
        &self.instructions.bot_name
    }

    /// Answer `question` from the indexed corpus.
    ///
    /// Rejects an empty or whitespace-only question before any service call.
    /// The synthesizer's output is returned verbatim.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let trimmed = question.trim();
        if trimmed.is_empty() {
            return Err(RagError::EmptyQuery);
        }
        let started = Instant::now();

        let query_vector = with_timeout(
            "embedding",
            self.embed_timeout,
            self.embedder.embed(&[trimmed.to_string()]),
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| RagError::Service {
            service: "embedding".into(),
            message: "no embedding returned for question".into(),
        })?;

        let retrieved = self.retriever.retrieve(&query_vector)?;
        let prompt = build_prompt(
            &self.instructions,
            &retrieved.texts(),
            trimmed,
            self.max_context_chars,
        );

        let answer = with_timeout(
            "synthesis",
            self.synthesis_timeout,
            self.synthesizer.complete(&prompt),
        )
        .await?;

        info!(
            hits = retrieved.len(),
            prompt_chars = prompt.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "question answered"
        );

        Ok(Answer {
            bot: self.instructions.bot_name.clone(),
            query: question.to_string(),
            answer,
        })
    }
}
