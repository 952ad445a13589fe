//! Per-feature daily free-use allowances for AI-powered features.
//!
//! Each feature gets `daily_free` uses per calendar day. Some features can
//! earn extra uses by watching an ad, up to `max_ad_bonus` per day. All
//! features share one stored record that resets on the first read of a new
//! day, like the chat quota.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::quota::Allowance;
use crate::storage::DurableStore;

/// Key holding the per-feature usage record.
pub const FEATURE_USAGE_KEY: &str = "orrery.feature-usage";

/// Daily limits of one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeaturePolicy {
    pub daily_free: u32,
    pub max_ad_bonus: u32,
}

impl Default for FeaturePolicy {
    fn default() -> Self {
        Self {
            daily_free: 1,
            max_ad_bonus: 0,
        }
    }
}

/// Policy lookup with a default for unlisted features.
#[derive(Debug, Clone)]
pub struct AllowancePolicy {
    default: FeaturePolicy,
    overrides: BTreeMap<String, FeaturePolicy>,
}

impl Default for AllowancePolicy {
    /// One free use per feature per day; charts can earn one more via an ad.
    fn default() -> Self {
        Self::new(FeaturePolicy::default()).with_feature(
            "chart",
            FeaturePolicy {
                daily_free: 1,
                max_ad_bonus: 1,
            },
        )
    }
}

impl AllowancePolicy {
    pub fn new(default: FeaturePolicy) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_feature(mut self, feature: impl Into<String>, policy: FeaturePolicy) -> Self {
        self.overrides.insert(feature.into(), policy);
        self
    }

    pub fn for_feature(&self, feature: &str) -> FeaturePolicy {
        self.overrides.get(feature).copied().unwrap_or(self.default)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FeatureUsage {
    date: NaiveDate,
    #[serde(default)]
    used: BTreeMap<String, u32>,
    #[serde(default)]
    ad_bonus: BTreeMap<String, u32>,
}

impl FeatureUsage {
    fn fresh(date: NaiveDate) -> Self {
        Self {
            date,
            used: BTreeMap::new(),
            ad_bonus: BTreeMap::new(),
        }
    }

    fn used(&self, feature: &str) -> u32 {
        self.used.get(feature).copied().unwrap_or(0)
    }

    fn bonus(&self, feature: &str) -> u32 {
        self.ad_bonus.get(feature).copied().unwrap_or(0)
    }
}

/// Daily free-use tracker for AI features.
#[derive(Clone)]
pub struct FeatureAllowances {
    store: DurableStore,
    clock: Arc<dyn Clock>,
    policy: AllowancePolicy,
}

impl FeatureAllowances {
    pub fn new(store: DurableStore, clock: Arc<dyn Clock>, policy: AllowancePolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    async fn usage(&self) -> FeatureUsage {
        let today = self.clock.today();
        self.store
            .get_json::<FeatureUsage>(FEATURE_USAGE_KEY)
            .await
            .filter(|u| u.date == today)
            .unwrap_or_else(|| FeatureUsage::fresh(today))
    }

    fn limit(&self, usage: &FeatureUsage, feature: &str) -> u32 {
        self.policy
            .for_feature(feature)
            .daily_free
            .saturating_add(usage.bonus(feature))
    }

    pub async fn can_use(&self, feature: &str, is_unlimited: bool) -> bool {
        if is_unlimited {
            return true;
        }
        let usage = self.usage().await;
        usage.used(feature) < self.limit(&usage, feature)
    }

    pub async fn remaining(&self, feature: &str, is_unlimited: bool) -> Allowance {
        if is_unlimited {
            return Allowance::Unlimited;
        }
        let usage = self.usage().await;
        Allowance::Limited(
            self.limit(&usage, feature)
                .saturating_sub(usage.used(feature)),
        )
    }

    /// Record one use. Unlimited callers are not metered.
    pub async fn record_use(&self, feature: &str, is_unlimited: bool) {
        if is_unlimited {
            return;
        }
        let mut usage = self.usage().await;
        *usage.used.entry(feature.to_string()).or_insert(0) += 1;
        self.persist(&usage).await;
        debug!(feature, used = usage.used(feature), "Feature use recorded");
    }

    /// True when today's free uses are spent but an ad can still earn one more.
    pub async fn can_earn_with_ad(&self, feature: &str, is_unlimited: bool) -> bool {
        if is_unlimited {
            return false;
        }
        let policy = self.policy.for_feature(feature);
        let usage = self.usage().await;
        usage.used(feature) >= policy.daily_free && usage.bonus(feature) < policy.max_ad_bonus
    }

    /// Credit one ad-earned use, ignored past the day's cap.
    pub async fn record_ad_bonus(&self, feature: &str, is_unlimited: bool) {
        if is_unlimited {
            return;
        }
        let cap = self.policy.for_feature(feature).max_ad_bonus;
        let mut usage = self.usage().await;
        if usage.bonus(feature) >= cap {
            debug!(feature, cap, "Ad bonus cap reached; ignoring");
            return;
        }
        *usage.ad_bonus.entry(feature.to_string()).or_insert(0) += 1;
        self.persist(&usage).await;
    }

    async fn persist(&self, usage: &FeatureUsage) {
        if let Err(e) = self.store.set_json(FEATURE_USAGE_KEY, usage).await {
            warn!(error = %e, "Failed to persist feature usage");
        }
    }
}
