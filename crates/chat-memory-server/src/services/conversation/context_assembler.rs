use std::fmt::Write as _;
use tracing::debug;

use crate::database::models::{ChatMessage, MemoryHit, MessageHit};
use crate::models::chat::{ContextUsage, PromptTurn};
use crate::utils::text::truncate_with_ellipsis;

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a helpful, friendly assistant with a long-term memory of earlier conversations with this user.

Guidelines:
- Use the remembered facts and related past conversation below when they are relevant
- Do not invent details the user never shared
- Be concise and conversational"#;

pub const HISTORY_WINDOW: usize = 8;
pub const SIMILAR_PREVIEW_CHARS: usize = 200;

const MEMORY_HEADER: &str = "Relevant long-term memory:";
const SIMILAR_HEADER: &str = "Related past conversation:";

/// The prompt for one completion call plus what went into it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub turns: Vec<PromptTurn>,
    pub usage: ContextUsage,
}

/// Builds the ordered prompt turns:
/// system text (+ memory, + similar messages), recent history, current turn.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    default_system_prompt: String,
    history_window: usize,
    similar_preview_chars: usize,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT.to_string(), HISTORY_WINDOW, SIMILAR_PREVIEW_CHARS)
    }
}

impl ContextAssembler {
    pub fn new(default_system_prompt: String, history_window: usize, similar_preview_chars: usize) -> Self {
        Self {
            default_system_prompt,
            history_window,
            similar_preview_chars,
        }
    }

    pub fn assemble(
        &self,
        system_prompt: Option<&str>,
        memory_hits: &[MemoryHit],
        similar_hits: &[MessageHit],
        history: &[ChatMessage],
        current_user_text: &str,
    ) -> AssembledContext {
        let base = system_prompt
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(self.default_system_prompt.as_str());

        let mut system = base.to_string();

        if !memory_hits.is_empty() {
            system.push_str("\n\n");
            system.push_str(MEMORY_HEADER);
            for (i, hit) in memory_hits.iter().enumerate() {
                let _ = write!(system, "\n{}. {}", i + 1, single_line(hit.display_text()));
            }
        }

        if !similar_hits.is_empty() {
            system.push_str("\n\n");
            system.push_str(SIMILAR_HEADER);
            for hit in similar_hits {
                // Cut on the stored content, then flatten what was kept
                let preview = single_line(&truncate_with_ellipsis(&hit.content, self.similar_preview_chars));
                let _ = write!(system, "\n- {}: {}", hit.role, preview);
            }
        }

        // History arrives oldest first; keep only the newest window
        let skip = history.len().saturating_sub(self.history_window);
        let window = &history[skip..];

        let mut turns = Vec::with_capacity(window.len() + 2);
        turns.push(PromptTurn::system(system));
        turns.extend(window.iter().map(|m| PromptTurn::new(m.role, m.content.clone())));
        turns.push(PromptTurn::user(current_user_text));

        let usage = ContextUsage {
            similar_messages: similar_hits.len(),
            semantic_memory: memory_hits.len(),
            recent_messages: window.len(),
        };

        debug!(
            "Assembled {} turns (memory={}, similar={}, history={})",
            turns.len(),
            usage.semantic_memory,
            usage.similar_messages,
            usage.recent_messages
        );

        AssembledContext { turns, usage }
    }
}

/// Collapses newlines and runs of whitespace so one hit renders as one line.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
