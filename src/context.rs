//! # Context assembler
//!
//! Joins retrieved chunks into the single string handed to the chat model.
//!
//! Chunks keep the order they were retrieved in and are never deduplicated.
//! An optional token budget (counted with `tiktoken_rs::cl100k_base`) drops
//! whole trailing chunks; the best match is always kept.
//!
//! ```rust
//! use edt_assistant::context::{assemble, DELIMITER};
//!
//! assert_eq!(assemble(&[]), "");
//! assert_eq!(DELIMITER, "\n\n---\n\n");
//! ```

use tiktoken_rs::cl100k_base;
use tracing::{debug, warn};

use crate::chunk::Chunk;

/// Separator placed between two chunks.
pub const DELIMITER: &str = "\n\n---\n\n";

/// Join chunk texts with [`DELIMITER`], without any budget.
pub fn assemble(chunks: &[Chunk]) -> String {
    ContextAssembler::default().assemble(chunks)
}

#[derive(Debug, Clone)]
pub struct ContextAssembler {
    delimiter: String,
    token_budget: Option<usize>,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self {
            delimiter: DELIMITER.to_string(),
            token_budget: None,
        }
    }
}

impl ContextAssembler {
    /// Bound the assembled context to roughly `budget` cl100k tokens.
    pub fn with_token_budget(budget: usize) -> Self {
        Self {
            token_budget: Some(budget),
            ..Self::default()
        }
    }

    /// `with_token_budget` when a budget is configured, unbounded otherwise.
    pub fn from_budget(budget: Option<usize>) -> Self {
        match budget {
            Some(budget) => Self::with_token_budget(budget),
            None => Self::default(),
        }
    }

    pub fn assemble(&self, chunks: &[Chunk]) -> String {
        let kept = match self.token_budget {
            Some(budget) => self.within_budget(chunks, budget),
            None => chunks.len(),
        };

        if kept < chunks.len() {
            debug!("Context budget reached, dropped {} of {} chunks", chunks.len() - kept, chunks.len());
        }

        chunks[..kept]
            .iter()
            .map(|chunk| chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(&self.delimiter)
    }

    /// Number of leading chunks that fit in `budget` (never less than one).
    fn within_budget(&self, chunks: &[Chunk], budget: usize) -> usize {
        if chunks.is_empty() {
            return 0;
        }

        let bpe = match cl100k_base() {
            Ok(bpe) => bpe,
            Err(e) => {
                warn!("Tokenizer unavailable, context left unbounded: {e}");
                return chunks.len();
            }
        };

        let delimiter_tokens = bpe.encode_with_special_tokens(&self.delimiter).len();
        let mut used = bpe.encode_with_special_tokens(&chunks[0].text).len();
        let mut kept = 1;

        for chunk in &chunks[1..] {
            let cost = delimiter_tokens + bpe.encode_with_special_tokens(&chunk.text).len();
            if used + cost > budget {
                break;
            }
            used += cost;
            kept += 1;
        }
        kept
    }
}
