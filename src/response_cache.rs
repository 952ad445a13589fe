//! Day-scoped cache of AI responses.
//!
//! The same request on the same calendar day returns the stored answer
//! instead of calling the backend again. The whole cache is one bucket tagged
//! with its day; a bucket from an earlier day is discarded on first touch.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::fingerprint::{canonicalize, hash_base36};
use crate::model::FormInput;
use crate::storage::DurableStore;

/// Key holding the response bucket.
pub const RESPONSE_CACHE_KEY: &str = "orrery.ai-responses";

const MAX_ENTRIES: usize = 50;
const KEEP_ON_TRIM: usize = 40;
const HASH_THRESHOLD: usize = 200;
const MAX_PLAIN_KEY_CHARS: usize = 80;

/// What an AI request was made with.
#[derive(Debug, Clone, Copy)]
pub enum RequestInput<'a> {
    Text(&'a str),
    Form(&'a FormInput),
}

/// Stable key for a request: long inputs are hashed, short ones sanitized.
pub fn cache_key(feature: &str, input: RequestInput<'_>) -> String {
    let canonical = match input {
        RequestInput::Text(text) => text.to_string(),
        RequestInput::Form(form) => canonicalize(form),
    };
    // Measured in UTF-16 units, like the hash.
    let suffix = if canonical.encode_utf16().count() > HASH_THRESHOLD {
        hash_base36(&canonical)
    } else {
        canonical
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .take(MAX_PLAIN_KEY_CHARS)
            .collect()
    };
    format!("{feature}_{suffix}")
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedResponse {
    key: String,
    value: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct Bucket {
    date: NaiveDate,
    entries: Vec<CachedResponse>,
}

/// Same-day memo of AI responses.
#[derive(Clone)]
pub struct ResponseCache {
    store: DurableStore,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(store: DurableStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn bucket(&self) -> Bucket {
        let today = self.clock.today();
        self.store
            .get_json::<Bucket>(RESPONSE_CACHE_KEY)
            .await
            .filter(|b| b.date == today)
            .unwrap_or(Bucket {
                date: today,
                entries: Vec::new(),
            })
    }

    /// Today's cached response for this request, if any.
    pub async fn lookup<T: DeserializeOwned>(
        &self,
        feature: &str,
        input: RequestInput<'_>,
    ) -> Option<T> {
        let key = cache_key(feature, input);
        let bucket = self.bucket().await;
        let entry = bucket.entries.into_iter().find(|e| e.key == key)?;
        match serde_json::from_value(entry.value) {
            Ok(value) => {
                debug!(key = %key, "AI response cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cached AI response has unexpected shape");
                None
            }
        }
    }

    /// Remember a response for the rest of the day.
    pub async fn store<T: Serialize>(&self, feature: &str, input: RequestInput<'_>, value: &T) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(feature, error = %e, "AI response not serializable; not cached");
                return;
            }
        };
        let key = cache_key(feature, input);

        let mut bucket = self.bucket().await;
        bucket.entries.retain(|e| e.key != key);
        bucket.entries.push(CachedResponse { key, value });
        if bucket.entries.len() > MAX_ENTRIES {
            let excess = bucket.entries.len() - KEEP_ON_TRIM;
            bucket.entries.drain(..excess);
        }

        if let Err(e) = self.store.set_json(RESPONSE_CACHE_KEY, &bucket).await {
            warn!(feature, error = %e, "Failed to persist AI response cache");
        }
    }
}
