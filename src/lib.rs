//! Orrery - local-first persistence and gated AI access for an astrology app.
//!
//! # Overview
//!
//! Everything here runs on the user's device. Computed reports are cached
//! under a content fingerprint so the same inputs never recompute, daily
//! usage is metered against a quota that resets at local midnight, rewarded
//! ads buy time-boxed feature unlocks, and chat messages go through a tiered
//! chain (streaming, single-shot, static) that always ends in a defined state.
//!
//! # Storage Model
//!
//! All state sits in one small, capacity-limited key-value store:
//!
//! - Writes can fail with a quota error; reads never fail, they come back empty
//! - A crash between two writes leaves at worst a stale index entry, which
//!   readers tolerate and [`reports::ReportCache::heal`] removes
//! - Nothing is shared across devices
//!
//! # Modules
//!
//! - [`model`]: Report types, form inputs, counters and grants
//! - [`fingerprint`]: Deterministic report identity from type and inputs
//! - [`storage`]: Durable key-value store and its backends
//! - [`reports`]: Report cache with a bounded, newest-first index
//! - [`quota`]: Daily usage quota with earned bonus
//! - [`allowance`]: Per-feature daily free uses
//! - [`grants`]: Time-boxed feature unlocks
//! - [`response_cache`]: Same-day memo of AI responses
//! - [`rewards`]: Crediting a watched rewarded ad
//! - [`chat`]: Tiered AI chat orchestration
//! - [`clock`], [`config`], [`error`], [`telemetry`]: Ambient plumbing

pub mod allowance;
pub mod chat;
pub mod clock;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod grants;
pub mod model;
pub mod quota;
pub mod reports;
pub mod response_cache;
pub mod rewards;
pub mod storage;
pub mod telemetry;
