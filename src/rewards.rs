//! Fan-out of a completed rewarded ad.
//!
//! The ad SDK reports a single "ad watched" signal. What it buys depends on
//! why the ad was shown, which only the caller knows.

use tracing::info;

use crate::allowance::FeatureAllowances;
use crate::grants::GrantStore;
use crate::quota::QuotaTracker;

/// What a watched ad was offered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdReward {
    /// Extra chat messages today.
    ChatBonus(u32),
    /// A time-boxed unlock of a gated feature.
    Unlock(String),
    /// One extra daily use of an AI feature.
    FeatureBonus(String),
}

/// Targets an ad reward can credit.
#[derive(Clone)]
pub struct RewardTargets {
    pub quota: QuotaTracker,
    pub grants: GrantStore,
    pub allowances: FeatureAllowances,
}

impl RewardTargets {
    /// Credit each reward. Premium (unlimited) callers have nothing to earn
    /// for feature bonuses, so those are skipped for them.
    pub async fn apply(&self, rewards: &[AdReward], is_unlimited: bool) {
        for reward in rewards {
            match reward {
                AdReward::ChatBonus(n) => self.quota.grant_bonus(*n).await,
                AdReward::Unlock(feature) => self.grants.unlock(feature).await,
                AdReward::FeatureBonus(feature) => {
                    self.allowances.record_ad_bonus(feature, is_unlimited).await
                }
            }
            info!(reward = ?reward, "Ad reward applied");
        }
    }
}
