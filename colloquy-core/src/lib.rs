//! # colloquy-core
//!
//! Live conversation-understanding engine SDK.
//!
//! ## Architecture
//!
//! ```text
//! Speech-to-text source → TranscriptSender → Ingest loop
//!                                                │ final sentences
//!                          ┌─────────────────────┼──────────────────────┐
//!                          ▼                     ▼                      │
//!                 topic-update task      claim-selection task           │
//!                 (LLM + similarity)     (LLM → fact queue)             │
//!                          │                     │                      ▼
//!                   image task            fact worker          ConversationState
//!                 (image search)   (LLM + search, rate-limited)  (single owner)
//!                          │                     │
//!                          └────────► broadcast::Sender<Notification>
//! ```
//!
//! The ingest loop only mutates state and dispatches tasks; every external
//! call (LLM, text search, image search) lives in its own task so a slow
//! provider cannot stall the stream.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod facts;
pub mod ipc;
pub mod json;
pub mod prompts;
pub mod providers;
pub mod state;
pub mod topics;

// Convenience re-exports for downstream crates
pub use config::{LlmCallSettings, LlmConfig, PipelineConfig, SafeSearch, SearchConfig};
pub use engine::{ColloquyEngine, TranscriptSender};
pub use error::{ColloquyError, Result};
pub use ipc::events::{Notification, NotificationPayload, TranscriptUpdate, Verdict};
pub use providers::{
    openai::OpenAiCompatLlm, searxng::SearxngSearch, CompletionRequest, ImageResult,
    LanguageModel, SearchProvider, SearchQuery, SearchResult,
};
pub use state::{ExportSnapshot, FactResult, StateStats, TranscriptSegment};
pub use topics::similarity::{CachedSimilarity, LexicalSimilarity, Similarity};
