//! Chat memory pipeline
//!
//! - Similarity search over past messages and consolidated memories
//! - Session lifecycle and auto-titling
//! - Prompt assembly
//! - Importance scoring and memory consolidation
//! - The orchestrator tying one user turn together

pub mod consolidation;
pub mod context_assembler;
pub mod orchestrator;
pub mod providers;
pub mod session_manager;
pub mod similarity_search;

pub use consolidation::MemoryConsolidationEngine;
pub use context_assembler::{AssembledContext, ContextAssembler};
pub use orchestrator::{ConversationOrchestrator, PipelineConfig};
pub use providers::{ChatStore, Completion, CompletionProvider, EmbeddingProvider, GenerationParams};
pub use session_manager::SessionManager;
pub use similarity_search::{SearchParams, SimilaritySearchService};
