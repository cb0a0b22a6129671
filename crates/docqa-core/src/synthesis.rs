//! Answer synthesis trait.
//!
//! A [`Synthesizer`] turns a fully assembled prompt into answer text.
//! Concrete backends (Ollama, OpenAI chat completions) live in the `docqa`
//! app crate.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Returns the model identifier (e.g. `"llama3.2"`).
    fn model_name(&self) -> &str;
    /// Complete `prompt` and return the generated text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}
