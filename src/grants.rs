//! Time-boxed feature grants (e.g. "tarot unlocked for 5 minutes after an ad").
//!
//! Expiry is lazy: every read filters the stored grant set down to live
//! grants and writes the survivors back when something was dropped. No timer
//! runs, since the host process may be suspended between reads.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::model::{FeatureGrant, Language};
use crate::storage::DurableStore;

/// Key holding the grant set.
pub const GRANTS_KEY: &str = "orrery.feature-grants";

/// Store of short-lived feature unlocks.
#[derive(Clone)]
pub struct GrantStore {
    store: DurableStore,
    clock: Arc<dyn Clock>,
    duration: chrono::Duration,
}

impl GrantStore {
    pub fn new(store: DurableStore, clock: Arc<dyn Clock>, duration: chrono::Duration) -> Self {
        Self {
            store,
            clock,
            duration,
        }
    }

    /// All live grants. Expired grants are swept from the store.
    pub async fn active_grants(&self) -> Vec<FeatureGrant> {
        let Some(grants) = self.store.get_json::<Vec<FeatureGrant>>(GRANTS_KEY).await else {
            return Vec::new();
        };

        let now = self.clock.now();
        let total = grants.len();
        let live: Vec<FeatureGrant> = grants.into_iter().filter(|g| g.is_live(now)).collect();

        if live.len() != total {
            debug!(expired = total - live.len(), "Sweeping expired grants");
            if let Err(e) = self.store.set_json(GRANTS_KEY, &live).await {
                warn!(error = %e, "Failed to persist swept grants");
            }
        }
        live
    }

    pub async fn is_unlocked(&self, feature: &str) -> bool {
        self.active_grants().await.iter().any(|g| g.feature == feature)
    }

    /// Unlock `feature` for the configured duration, replacing any live grant.
    pub async fn unlock(&self, feature: &str) {
        let mut grants = self.active_grants().await;
        grants.retain(|g| g.feature != feature);
        grants.push(FeatureGrant::new(feature, self.clock.now(), self.duration));

        match self.store.set_json(GRANTS_KEY, &grants).await {
            Ok(()) => debug!(feature, "Feature unlocked"),
            Err(e) => warn!(feature, error = %e, "Failed to persist feature grant"),
        }
    }

    /// Milliseconds left on the grant for `feature`, 0 when locked.
    pub async fn remaining_ms(&self, feature: &str) -> u64 {
        let now = self.clock.now();
        self.active_grants()
            .await
            .iter()
            .find(|g| g.feature == feature)
            .map_or(0, |g| g.remaining(now).num_milliseconds().max(0) as u64)
    }

    /// Human-readable time left, empty when locked.
    pub async fn format_remaining(&self, feature: &str, language: Language) -> String {
        let remaining = self.remaining_ms(feature).await;
        if remaining == 0 {
            return String::new();
        }

        let hours = remaining / 3_600_000;
        let minutes = (remaining % 3_600_000) / 60_000;

        match (language, hours > 0) {
            (Language::Hi, true) => format!("{hours} घंटे {minutes} मिनट शेष"),
            (Language::Hi, false) => format!("{minutes} मिनट शेष"),
            (Language::En, true) => format!("{hours}h {minutes}m left"),
            (Language::En, false) => format!("{minutes}m left"),
        }
    }

    /// Remove every grant.
    pub async fn clear(&self) {
        self.store.remove(GRANTS_KEY).await;
    }
}
