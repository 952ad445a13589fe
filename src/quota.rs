//! Daily usage quota for rate-limited actions (chat messages).
//!
//! The counter lives under a single key and belongs to one calendar day. The
//! first read on a different day sees a zeroed counter; nothing is written
//! until a mutating call (`increment`, `grant_bonus`) persists it.
//!
//! Unlimited callers bypass the counter entirely. The flag is the caller's
//! capability, not state owned here.
//!
//! Tracking is advisory: storage failures are logged and otherwise ignored.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::model::UsageCounter;
use crate::storage::DurableStore;

/// Key holding the chat usage counter.
pub const USAGE_KEY: &str = "orrery.chat-usage";

/// How much of a quota is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    /// The caller is not metered.
    Unlimited,
    /// This many actions remain today.
    Limited(u32),
}

impl Allowance {
    /// The legacy integer form: `-1` for unlimited.
    pub fn as_i64(&self) -> i64 {
        match self {
            Allowance::Unlimited => -1,
            Allowance::Limited(n) => i64::from(*n),
        }
    }
}

/// Daily, resettable usage counter with earned bonus allowance.
#[derive(Clone)]
pub struct QuotaTracker {
    store: DurableStore,
    clock: Arc<dyn Clock>,
    base_limit: u32,
}

impl QuotaTracker {
    pub fn new(store: DurableStore, clock: Arc<dyn Clock>, base_limit: u32) -> Self {
        Self {
            store,
            clock,
            base_limit,
        }
    }

    pub fn base_limit(&self) -> u32 {
        self.base_limit
    }

    /// Today's counter, zeroed if the stored one is from another day.
    pub async fn counter(&self) -> UsageCounter {
        let today = self.clock.today();
        match self.store.get_json::<UsageCounter>(USAGE_KEY).await {
            Some(counter) if counter.date == today => counter,
            Some(stale) => {
                debug!(stored = %stale.date, today = %today, "Usage counter rolled over");
                UsageCounter::fresh(today)
            }
            None => UsageCounter::fresh(today),
        }
    }

    /// Whether one more action is allowed today.
    pub async fn can_act(&self, is_unlimited: bool) -> bool {
        if is_unlimited {
            return true;
        }
        let counter = self.counter().await;
        counter.used < counter.effective_limit(self.base_limit)
    }

    /// Actions left today.
    pub async fn remaining(&self, is_unlimited: bool) -> Allowance {
        if is_unlimited {
            return Allowance::Unlimited;
        }
        let counter = self.counter().await;
        Allowance::Limited(
            counter
                .effective_limit(self.base_limit)
                .saturating_sub(counter.used),
        )
    }

    /// Today's effective limit (`base + bonus`).
    pub async fn limit(&self, is_unlimited: bool) -> Allowance {
        if is_unlimited {
            return Allowance::Unlimited;
        }
        Allowance::Limited(self.counter().await.effective_limit(self.base_limit))
    }

    /// Record one action.
    pub async fn increment(&self) {
        let mut counter = self.counter().await;
        counter.used = counter.used.saturating_add(1);
        self.persist(&counter).await;
        debug!(used = counter.used, bonus = counter.bonus, "Usage recorded");
    }

    /// Extend today's limit by `n` actions.
    pub async fn grant_bonus(&self, n: u32) {
        let mut counter = self.counter().await;
        counter.bonus = counter.bonus.saturating_add(n);
        self.persist(&counter).await;
        debug!(bonus = counter.bonus, granted = n, "Usage bonus granted");
    }

    /// Forget all usage.
    pub async fn reset(&self) {
        self.store.remove(USAGE_KEY).await;
    }

    async fn persist(&self, counter: &UsageCounter) {
        if let Err(e) = self.store.set_json(USAGE_KEY, counter).await {
            warn!(error = %e, "Failed to persist usage counter");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryBackend;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn setup(date: NaiveDate) -> (QuotaTracker, DurableStore, Arc<ManualClock>) {
        let store = DurableStore::new(Arc::new(MemoryBackend::new()));
        let clock = Arc::new(ManualClock::at_date(date));
        let tracker = QuotaTracker::new(store.clone(), clock.clone(), 10);
        (tracker, store, clock)
    }

    #[tokio::test]
    async fn test_fresh_counter_allows_base_limit() {
        let (tracker, _, _) = setup(day(1));

        assert!(tracker.can_act(false).await);
        assert_eq!(tracker.remaining(false).await, Allowance::Limited(10));
        assert_eq!(tracker.limit(false).await, Allowance::Limited(10));
    }

    #[tokio::test]
    async fn test_exhausting_base_limit_denies() {
        let (tracker, _, _) = setup(day(1));

        for _ in 0..10 {
            assert!(tracker.can_act(false).await);
            tracker.increment().await;
        }
        assert!(!tracker.can_act(false).await);
        assert_eq!(tracker.remaining(false).await, Allowance::Limited(0));
    }

    #[tokio::test]
    async fn test_new_day_resets_counter() {
        let (tracker, store, clock) = setup(day(2));
        let stale = UsageCounter {
            date: day(1),
            used: 3,
            bonus: 0,
        };
        store.set_json(USAGE_KEY, &stale).await.unwrap();

        assert_eq!(tracker.remaining(false).await, Allowance::Limited(10));

        // Reading did not write.
        let stored: UsageCounter = store.get_json(USAGE_KEY).await.unwrap();
        assert_eq!(stored, stale);

        tracker.increment().await;
        let stored: UsageCounter = store.get_json(USAGE_KEY).await.unwrap();
        assert_eq!(stored.date, day(2));
        assert_eq!(stored.used, 1);

        clock.advance(chrono::Duration::days(1));
        assert_eq!(tracker.remaining(false).await, Allowance::Limited(10));
    }

    #[tokio::test]
    async fn test_exhausted_yesterday_allows_full_limit_today() {
        let (tracker, store, _) = setup(day(2));
        store
            .set_json(
                USAGE_KEY,
                &UsageCounter {
                    date: day(1),
                    used: 10,
                    bonus: 2,
                },
            )
            .await
            .unwrap();

        let mut allowed = 0;
        while tracker.can_act(false).await {
            tracker.increment().await;
            allowed += 1;
        }
        assert_eq!(allowed, 10);
    }

    #[tokio::test]
    async fn test_bonus_stacks_on_base_limit() {
        let (tracker, _, _) = setup(day(1));

        for _ in 0..3 {
            tracker.grant_bonus(1).await;
        }
        for _ in 0..10 {
            tracker.increment().await;
        }

        for _ in 0..3 {
            assert!(tracker.can_act(false).await);
            tracker.increment().await;
        }
        assert!(!tracker.can_act(false).await);
        assert_eq!(tracker.limit(false).await, Allowance::Limited(13));
    }

    #[tokio::test]
    async fn test_unlimited_bypasses_counter() {
        let (tracker, _, _) = setup(day(1));
        for _ in 0..10 {
            tracker.increment().await;
        }

        assert!(tracker.can_act(true).await);
        assert_eq!(tracker.remaining(true).await, Allowance::Unlimited);
        assert_eq!(tracker.remaining(true).await.as_i64(), -1);
    }

    #[tokio::test]
    async fn test_corrupt_counter_reads_fresh() {
        let (tracker, store, _) = setup(day(1));
        store.set(USAGE_KEY, "[1,2,3]").await.unwrap();

        assert_eq!(tracker.remaining(false).await, Allowance::Limited(10));
        tracker.increment().await;
        assert_eq!(tracker.remaining(false).await, Allowance::Limited(9));
    }

    #[tokio::test]
    async fn test_full_store_is_ignored() {
        let store = DurableStore::new(Arc::new(MemoryBackend::with_capacity(4)));
        let tracker = QuotaTracker::new(store, Arc::new(ManualClock::at_date(day(1))), 10);

        tracker.increment().await;
        tracker.grant_bonus(1).await;
        assert_eq!(tracker.remaining(false).await, Allowance::Limited(10));
    }

    #[tokio::test]
    async fn test_reset_clears_usage() {
        let (tracker, _, _) = setup(day(1));
        tracker.increment().await;
        tracker.reset().await;
        assert_eq!(tracker.remaining(false).await, Allowance::Limited(10));
    }
}
