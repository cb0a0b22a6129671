//! Prompt assembly for answer synthesis.
//!
//! [`build_prompt`] is pure: the same instructions, context, and question
//! always produce the same prompt text.
//!
//! # Layout
//!
//! ```text
//! {instructions}
//!
//! Context:
//! {chunk 1}
//!
//! {chunk 2}
//!
//! Question: {question}
//! Answer:
//! ```

/// Refusal used when no override is configured.
pub const DEFAULT_REFUSAL: &str = "I don't know based on the available documents.";

/// Behavioural instructions placed at the top of every prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptInstructions {
    pub bot_name: String,
    pub organization: String,
    pub refusal: String,
}

impl PromptInstructions {
    pub fn new(bot_name: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            organization: organization.into(),
            refusal: DEFAULT_REFUSAL.to_string(),
        }
    }

    pub fn with_refusal(mut self, refusal: impl Into<String>) -> Self {
        self.refusal = refusal.into();
        self
    }

    /// Render the instruction block.
    pub fn render(&self) -> String {
        let org = &self.organization;
        format!(
            "You are {name}, an AI assistant for {org}.\n\
             You provide answers ONLY based on the given context from company documents.\n\
             Guide or assist the user using {org} resources and processes.\n\
             Do not provide personal opinions or information.\n\
             If the context does not contain the answer, respond exactly with:\n\
             \"{refusal}\"\n\
             Don't add Based On documents to your response.\n\
             Answer as you have knowledge of {org}.",
            name = self.bot_name,
            org = org,
            refusal = self.refusal,
        )
    }
}

/// Assemble the synthesis prompt.
///
/// `context` is in rank order. Chunks are appended while the joined context
/// stays within `max_context_chars`; the first chunk is always kept,
/// truncated at a character boundary when it alone is over budget.
pub fn build_prompt(
    instructions: &PromptInstructions,
    context: &[&str],
    question: &str,
    max_context_chars: usize,
) -> String {
    let context = join_context(context, max_context_chars);
    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}\nAnswer:",
        instructions.render(),
        context,
        question.trim()
    )
}

fn join_context(chunks: &[&str], max_chars: usize) -> String {
    const SEP: &str = "\n\n";

    let mut out = String::new();
    let mut used = 0;
    for (i, text) in chunks.iter().enumerate() {
        let len = text.chars().count();
        if i == 0 {
            if len > max_chars {
                return text.chars().take(max_chars).collect();
            }
            out.push_str(text);
            used = len;
            continue;
        }
        if used + SEP.len() + len > max_chars {
            break;
        }
        out.push_str(SEP);
        out.push_str(text);
        used += SEP.len() + len;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instructions() -> PromptInstructions {
        PromptInstructions::new("Acme Bot", "Acme")
    }

    #[test]
    fn test_layout() {
        let prompt = build_prompt(
            &instructions(),
            &["Refunds are issued within 30 days."],
            "What is the refund window?",
            8000,
        );
        assert!(prompt.starts_with("You are Acme Bot, an AI assistant for Acme."));
        assert!(prompt.contains("\"I don't know based on the available documents.\""));
        assert!(prompt.ends_with(
            "Context:\nRefunds are issued within 30 days.\n\nQuestion: What is the refund window?\nAnswer:"
        ));
    }

    #[test]
    fn test_context_keeps_rank_order() {
        let prompt = build_prompt(&instructions(), &["first", "second", "third"], "q", 8000);
        assert!(prompt.contains("Context:\nfirst\n\nsecond\n\nthird\n\nQuestion: q"));
    }

    #[test]
    fn test_context_budget_drops_lower_ranked() {
        let prompt = build_prompt(&instructions(), &["aaaa", "bbbb", "cccc"], "q", 10);
        assert!(prompt.contains("Context:\naaaa\n\nbbbb\n\nQuestion"));
        assert!(!prompt.contains("cccc"));
    }

    #[test]
    fn test_top_chunk_truncated_on_char_boundary() {
        let prompt = build_prompt(&instructions(), &["ééééé", "next"], "q", 3);
        assert!(prompt.contains("Context:\nééé\n\nQuestion"));
    }

    #[test]
    fn test_empty_context() {
        let prompt = build_prompt(&instructions(), &[], "  hello  ", 100);
        assert!(prompt.ends_with("Context:\n\n\nQuestion: hello\nAnswer:"));
    }

    #[test]
    fn test_custom_refusal() {
        let prompt = build_prompt(
            &instructions().with_refusal("No idea."),
            &["x"],
            "q",
            100,
        );
        assert!(prompt.contains("\"No idea.\""));
        assert!(!prompt.contains(DEFAULT_REFUSAL));
    }

    #[test]
    fn test_deterministic() {
        let a = build_prompt(&instructions(), &["a", "b"], "q", 100);
        let b = build_prompt(&instructions(), &["a", "b"], "q", 100);
        assert_eq!(a, b);
    }
}
