//! AI chat: backend boundary, fixed copy, and the tiered orchestrator.
//!
//! - [`backend`]: the [`ChatBackend`] trait and its HTTP client
//! - [`messages`]: localized greeting, limit and unavailable texts
//! - [`orchestrator`]: quota-gated primary → fallback → static exchange

pub mod backend;
pub mod messages;
pub mod orchestrator;

pub use backend::{ChatBackend, ChatRequest, HttpChatBackend, Role, SessionKey, Turn};
pub use orchestrator::{
    ChatHooks, ChatLimits, ChatOrchestrator, Conversation, ExchangeOutcome, NoopHooks, Tier,
    TranscriptEntry,
};
