//! Quota-gated, tiered access to the conversational AI backend.
//!
//! One user message runs through an explicit state machine:
//!
//! ```text
//! Idle -> QuotaCheck -> Denied ----------------------------------> Idle
//!                    -> TierPrimary -> TierFallback -> TierStatic -> Idle
//! ```
//!
//! - `QuotaCheck` consults the quota tracker. A metered caller is charged
//!   once here, before any tier runs, so a message costs exactly one unit
//!   whichever tier ends up answering.
//! - `TierPrimary` streams a reply, updating the last transcript entry in
//!   place as chunks arrive. An error, an empty reply, or a stream past the
//!   chunk/length ceiling escalates.
//! - `TierFallback` makes one single-shot request with the same context.
//!   An error or empty reply escalates.
//! - `TierStatic` is the designed terminal state: a fixed localized message
//!   plus an offer of an alternate access path. It is not an error.
//!
//! Each tier runs at most once per message. There is no backoff; the tiers
//! are the retry structure.

use std::sync::Arc;

use futures_util::StreamExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chat::backend::{ChatBackend, ChatRequest, Role, SessionKey, Turn};
use crate::chat::messages;
use crate::config::CoreConfig;
use crate::error::BackendError;
use crate::quota::{Allowance, QuotaTracker};

/// One line of the visible conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
    /// Answered by the fallback tier.
    pub is_fallback: bool,
    /// The UI should offer another way in (e.g. installing the native app).
    pub offers_alternate_access: bool,
}

impl TranscriptEntry {
    fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            text: text.to_string(),
            is_fallback: false,
            offers_alternate_access: false,
        }
    }

    fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            is_fallback: false,
            offers_alternate_access: false,
        }
    }
}

/// A conversation: its session identity, backend history and transcript.
///
/// Lives for one app run; nothing here is persisted.
#[derive(Debug, Clone)]
pub struct Conversation {
    session: SessionKey,
    history: Vec<Turn>,
    transcript: Vec<TranscriptEntry>,
}

impl Conversation {
    pub fn new(session: SessionKey) -> Self {
        let mut conversation = Self {
            session,
            history: Vec::new(),
            transcript: Vec::new(),
        };
        conversation.restart();
        conversation
    }

    pub fn session(&self) -> &SessionKey {
        &self.session
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// Switch to `session`. A different key discards the backend history and
    /// the transcript and starts over; returns whether that happened.
    pub fn set_session(&mut self, session: SessionKey) -> bool {
        if session == self.session {
            return false;
        }
        info!(
            language = session.language.code(),
            persona = session.persona.as_str(),
            "Chat session key changed; starting a new session"
        );
        self.session = session;
        self.restart();
        true
    }

    fn restart(&mut self) {
        self.history.clear();
        self.transcript.clear();
        let has_context = !self.session.context_summary.is_empty();
        self.transcript.push(TranscriptEntry::model(messages::welcome(
            self.session.language,
            has_context,
        )));
    }

    fn request(&self, message: &str) -> ChatRequest {
        ChatRequest {
            session: self.session.clone(),
            history: self.history.clone(),
            message: message.to_string(),
        }
    }

    fn record_exchange(&mut self, message: &str, reply: &str) {
        self.history.push(Turn {
            role: Role::User,
            text: message.to_string(),
        });
        self.history.push(Turn {
            role: Role::Model,
            text: reply.to_string(),
        });
    }
}

/// Host callbacks for UI side effects. All default to no-ops.
pub trait ChatHooks: Send + Sync {
    /// The streamed reply so far.
    fn on_partial(&self, _text: &str) {}

    /// The quota is spent; offer a rewarded ad for more messages.
    fn offer_bonus_ad(&self) {}

    /// Every tier failed; offer another way to reach the AI.
    fn offer_alternate_access(&self) {}
}

/// Hooks that ignore everything.
#[derive(Debug, Default)]
pub struct NoopHooks;

impl ChatHooks for NoopHooks {}

/// States of one message exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    QuotaCheck,
    Denied,
    TierPrimary,
    TierFallback,
    TierStatic,
}

/// The tier that produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Primary,
    Fallback,
}

/// How an exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The message was blank; nothing happened.
    Ignored,
    /// The quota is spent; no tier was contacted.
    Denied { message: String },
    Answered { tier: Tier, text: String },
    /// Every tier failed; the static message was shown.
    Unavailable { message: String },
}

/// Why a tier did not produce an answer.
#[derive(Debug, Error)]
pub enum TierFailure {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("reply was empty")]
    Empty,

    #[error("stream exceeded {limit} {unit}")]
    Overflow { unit: &'static str, limit: usize },
}

/// Ceilings applied to one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatLimits {
    pub max_stream_chunks: usize,
    pub max_response_chars: usize,
    pub max_message_chars: usize,
}

impl Default for ChatLimits {
    fn default() -> Self {
        Self::from(&CoreConfig::default())
    }
}

impl From<&CoreConfig> for ChatLimits {
    fn from(config: &CoreConfig) -> Self {
        Self {
            max_stream_chunks: config.max_stream_chunks,
            max_response_chars: config.max_response_chars,
            max_message_chars: config.max_message_chars,
        }
    }
}

/// Runs user messages through the quota check and the tier chain.
#[derive(Clone)]
pub struct ChatOrchestrator {
    backend: Arc<dyn ChatBackend>,
    quota: QuotaTracker,
    hooks: Arc<dyn ChatHooks>,
    limits: ChatLimits,
}

impl ChatOrchestrator {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        quota: QuotaTracker,
        hooks: Arc<dyn ChatHooks>,
        limits: ChatLimits,
    ) -> Self {
        Self {
            backend,
            quota,
            hooks,
            limits,
        }
    }

    /// Handle one user message.
    pub async fn send(
        &self,
        conversation: &mut Conversation,
        message: &str,
        is_unlimited: bool,
    ) -> ExchangeOutcome {
        let message: String = message
            .trim()
            .chars()
            .take(self.limits.max_message_chars)
            .collect();
        if message.is_empty() {
            return ExchangeOutcome::Ignored;
        }

        let request = conversation.request(&message);
        let language = conversation.session.language;
        let mut outcome = ExchangeOutcome::Ignored;
        let mut state = ExchangeState::QuotaCheck;

        while state != ExchangeState::Idle {
            debug!(state = ?state, "Chat exchange");
            state = match state {
                ExchangeState::Idle => ExchangeState::Idle,

                ExchangeState::QuotaCheck => {
                    if self.quota.can_act(is_unlimited).await {
                        if !is_unlimited {
                            self.quota.increment().await;
                        }
                        conversation.transcript.push(TranscriptEntry::user(&message));
                        ExchangeState::TierPrimary
                    } else {
                        ExchangeState::Denied
                    }
                }

                ExchangeState::Denied => {
                    let limit = match self.quota.limit(is_unlimited).await {
                        Allowance::Limited(n) => n,
                        Allowance::Unlimited => self.quota.base_limit(),
                    };
                    let text = messages::limit_reached(language, limit);
                    conversation.transcript.push(TranscriptEntry::model(text.clone()));
                    if !is_unlimited {
                        self.hooks.offer_bonus_ad();
                    }
                    info!(limit, "Chat message denied by quota");
                    outcome = ExchangeOutcome::Denied { message: text };
                    ExchangeState::Idle
                }

                ExchangeState::TierPrimary => {
                    match self.run_primary(conversation, &request).await {
                        Ok(text) => {
                            conversation.record_exchange(&message, &text);
                            outcome = ExchangeOutcome::Answered {
                                tier: Tier::Primary,
                                text,
                            };
                            ExchangeState::Idle
                        }
                        Err(failure) => {
                            info!(error = %failure, "Primary tier failed; falling back");
                            ExchangeState::TierFallback
                        }
                    }
                }

                ExchangeState::TierFallback => match self.run_fallback(&request).await {
                    Ok(text) => {
                        conversation.transcript.push(TranscriptEntry {
                            is_fallback: true,
                            ..TranscriptEntry::model(text.clone())
                        });
                        conversation.record_exchange(&message, &text);
                        outcome = ExchangeOutcome::Answered {
                            tier: Tier::Fallback,
                            text,
                        };
                        ExchangeState::Idle
                    }
                    Err(failure) => {
                        warn!(error = %failure, "Fallback tier failed; showing static message");
                        ExchangeState::TierStatic
                    }
                },

                ExchangeState::TierStatic => {
                    let text = messages::service_unavailable(language).to_string();
                    conversation.transcript.push(TranscriptEntry {
                        offers_alternate_access: true,
                        ..TranscriptEntry::model(text.clone())
                    });
                    self.hooks.offer_alternate_access();
                    outcome = ExchangeOutcome::Unavailable { message: text };
                    ExchangeState::Idle
                }
            };
        }

        outcome
    }

    /// Stream a reply into a new transcript entry. On failure the entry is
    /// removed again.
    pub async fn run_primary(
        &self,
        conversation: &mut Conversation,
        request: &ChatRequest,
    ) -> Result<String, TierFailure> {
        conversation.transcript.push(TranscriptEntry::model(""));
        let entry = conversation.transcript.len() - 1;

        let result = self.read_stream(conversation, entry, request).await;
        if result.is_err() {
            conversation.transcript.truncate(entry);
        }
        result
    }

    async fn read_stream(
        &self,
        conversation: &mut Conversation,
        entry: usize,
        request: &ChatRequest,
    ) -> Result<String, TierFailure> {
        let mut stream = self.backend.stream_reply(request).await?;
        let mut reply = String::new();
        let mut chars = 0;
        let mut chunks = 0;

        // Returning drops the stream, which stops reading it.
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            chunks += 1;
            if chunks > self.limits.max_stream_chunks {
                return Err(TierFailure::Overflow {
                    unit: "chunks",
                    limit: self.limits.max_stream_chunks,
                });
            }
            if chunk.is_empty() {
                continue;
            }

            chars += chunk.chars().count();
            if chars > self.limits.max_response_chars {
                return Err(TierFailure::Overflow {
                    unit: "characters",
                    limit: self.limits.max_response_chars,
                });
            }
            reply.push_str(&chunk);
            conversation.transcript[entry].text.clone_from(&reply);
            self.hooks.on_partial(&reply);
        }

        if reply.trim().is_empty() {
            return Err(TierFailure::Empty);
        }
        debug!(chunks, chars, "Primary tier answered");
        Ok(reply)
    }

    /// One non-streaming request with the same context.
    pub async fn run_fallback(&self, request: &ChatRequest) -> Result<String, TierFailure> {
        let text = self.backend.reply(request).await?;
        if text.trim().is_empty() {
            return Err(TierFailure::Empty);
        }
        Ok(text)
    }
}
