use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

use super::providers::{ChatStore, EmbeddingProvider};
use crate::database::models::{NewMemoryEntry, SemanticMemoryEntry};
use crate::utils::limiters::Limiters;
use crate::utils::text::{tokenize_lowercase, truncate_with_ellipsis, word_count};

pub const BASE_IMPORTANCE: f32 = 0.5;
pub const LONG_EXCHANGE_WORDS: usize = 100;
pub const LONG_EXCHANGE_BONUS: f32 = 0.2;
pub const VERY_LONG_EXCHANGE_WORDS: usize = 200;
pub const VERY_LONG_EXCHANGE_BONUS: f32 = 0.1;
pub const KEYWORD_BONUS: f32 = 0.05;
pub const PERSIST_THRESHOLD: f32 = 0.6;
pub const SUMMARY_EXCERPT_CHARS: usize = 100;

pub const IMPORTANCE_KEYWORDS: [&str; 12] = [
    "remember", "important", "project", "deadline", "meeting", "task", "goal", "plan",
    "decision", "idea", "problem", "solution",
];

/// Topic tags and the tokens that trigger them, in output order.
pub const TOPIC_TAXONOMY: &[(&str, &[&str])] = &[
    (
        "work",
        &[
            "work", "job", "office", "meeting", "project", "deadline", "client", "boss",
            "colleague", "career", "team", "launch",
        ],
    ),
    (
        "personal",
        &[
            "family", "friend", "friends", "home", "birthday", "wife", "husband", "partner",
            "kids", "vacation", "hobby", "wedding",
        ],
    ),
    (
        "tech",
        &[
            "code", "coding", "programming", "software", "computer", "bug", "api", "database",
            "server", "rust", "python", "javascript",
        ],
    ),
    (
        "learning",
        &[
            "learn", "learning", "study", "course", "book", "class", "tutorial", "exam",
            "lesson", "teach", "practice", "research",
        ],
    ),
    (
        "health",
        &[
            "health", "doctor", "exercise", "diet", "sleep", "workout", "medicine", "sick",
            "fitness", "running", "gym", "stress",
        ],
    ),
    (
        "finance",
        &[
            "money", "budget", "invest", "investment", "bank", "salary", "tax", "taxes",
            "savings", "loan", "expense", "price",
        ],
    ),
];

// Scores are accumulated in hundredths so the 0.6 boundary is exact.
const SCALE: u32 = 100;
const BASE_UNITS: u32 = 50;
const LONG_UNITS: u32 = 20;
const VERY_LONG_UNITS: u32 = 10;
const KEYWORD_UNITS: u32 = 5;

/// Importance scoring, summarization and tagging for a finished exchange,
/// plus persistence of the exchanges worth remembering.
#[derive(Clone)]
pub struct MemoryConsolidationEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn ChatStore>,
    limiters: Limiters,
    persist_threshold: f32,
}

impl MemoryConsolidationEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn ChatStore>,
        limiters: Limiters,
        persist_threshold: f32,
    ) -> Self {
        Self {
            embedder,
            store,
            limiters,
            persist_threshold,
        }
    }

    /// Importance in `[0, 1]`. Deterministic and non-decreasing in word count.
    pub fn score(user_text: &str, assistant_text: &str) -> f32 {
        let words = word_count(user_text) + word_count(assistant_text);

        let mut units = BASE_UNITS;
        if words > LONG_EXCHANGE_WORDS {
            units += LONG_UNITS;
        }
        if words > VERY_LONG_EXCHANGE_WORDS {
            units += VERY_LONG_UNITS;
        }

        let combined = format!("{} {}", user_text, assistant_text).to_lowercase();
        let matched = IMPORTANCE_KEYWORDS
            .iter()
            .filter(|kw| combined.contains(*kw))
            .count() as u32;
        units += matched * KEYWORD_UNITS;

        units.min(SCALE) as f32 / SCALE as f32
    }

    /// Strictly above the threshold; an exchange scoring exactly 0.6 is discarded.
    pub fn should_persist(&self, importance: f32) -> bool {
        importance > self.persist_threshold
    }

    pub fn summarize(user_text: &str, assistant_text: &str) -> String {
        format!(
            "User asked about: {}. Assistant responded: {}",
            truncate_with_ellipsis(user_text.trim(), SUMMARY_EXCERPT_CHARS),
            truncate_with_ellipsis(assistant_text.trim(), SUMMARY_EXCERPT_CHARS)
        )
    }

    pub fn tag(user_text: &str, assistant_text: &str) -> Vec<String> {
        let tokens: HashSet<String> = tokenize_lowercase(user_text)
            .chain(tokenize_lowercase(assistant_text))
            .collect();

        TOPIC_TAXONOMY
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|kw| tokens.contains(*kw)))
            .map(|(tag, _)| tag.to_string())
            .collect()
    }

    /// Scores the exchange and, when it clears the threshold, embeds and
    /// stores it as a memory entry. `Ok(None)` means it was not worth keeping.
    pub async fn consolidate(
        &self,
        user_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<Option<SemanticMemoryEntry>> {
        let importance = Self::score(user_text, assistant_text);
        if !self.should_persist(importance) {
            debug!("Exchange importance {:.2} below threshold, not stored", importance);
            return Ok(None);
        }

        let content = format!("User: {}\nAssistant: {}", user_text, assistant_text);
        let embedding = {
            let _permit = self.limiters.embedding_permit().await?;
            self.embedder
                .embed(&content)
                .await
                .context("Failed to embed memory content")?
        };

        let entry = self
            .store
            .insert_memory(NewMemoryEntry {
                user_id: user_id.to_string(),
                summary: Some(Self::summarize(user_text, assistant_text)),
                tags: Self::tag(user_text, assistant_text),
                content,
                embedding,
                importance,
            })
            .await
            .context("Failed to store memory entry")?;

        info!(
            "Stored memory {} for user {} (importance {:.2}, tags {:?})",
            entry.id, user_id, entry.importance, entry.tags
        );
        Ok(Some(entry))
    }
}
