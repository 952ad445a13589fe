//! End-to-end chat exchanges against an unreachable HTTP backend.
//!
//! With nothing listening, both backend tiers fail and every allowed
//! message must end in the static state, charged exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use orrery::allowance::{AllowancePolicy, FeatureAllowances};
use orrery::chat::messages;
use orrery::chat::{
    ChatHooks, ChatLimits, ChatOrchestrator, Conversation, ExchangeOutcome, HttpChatBackend,
    SessionKey,
};
use orrery::clock::{Clock, ManualClock};
use orrery::grants::GrantStore;
use orrery::model::{Language, Persona};
use orrery::quota::QuotaTracker;
use orrery::rewards::{AdReward, RewardTargets};
use orrery::storage::DurableStore;

#[derive(Default)]
struct CountingHooks {
    bonus_offers: AtomicUsize,
    alternate_offers: AtomicUsize,
}

impl ChatHooks for CountingHooks {
    fn offer_bonus_ad(&self) {
        self.bonus_offers.fetch_add(1, Ordering::SeqCst);
    }

    fn offer_alternate_access(&self) {
        self.alternate_offers.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_unreachable_backend_then_quota_then_ad_bonus() {
    let store = DurableStore::in_memory();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_date(
        NaiveDate::from_ymd_opt(2024, 8, 15).unwrap(),
    ));
    let quota = QuotaTracker::new(store.clone(), clock.clone(), 2);
    let hooks = Arc::new(CountingHooks::default());
    let orchestrator = ChatOrchestrator::new(
        Arc::new(HttpChatBackend::new("http://127.0.0.1:9")),
        quota.clone(),
        hooks.clone(),
        ChatLimits::default(),
    );
    let rewards = RewardTargets {
        quota: quota.clone(),
        grants: GrantStore::new(store.clone(), clock.clone(), chrono::Duration::minutes(5)),
        allowances: FeatureAllowances::new(store, clock, AllowancePolicy::default()),
    };
    let mut conversation = Conversation::new(SessionKey::new(
        Language::Hi,
        Persona::Health,
        "Moon in Cancer",
    ));

    for expected_used in 1..=2 {
        let outcome = orchestrator.send(&mut conversation, "kaisa rahega?", false).await;
        assert_eq!(
            outcome,
            ExchangeOutcome::Unavailable {
                message: messages::service_unavailable(Language::Hi).into()
            }
        );
        assert_eq!(quota.counter().await.used, expected_used);
    }
    assert_eq!(hooks.alternate_offers.load(Ordering::SeqCst), 2);

    let outcome = orchestrator.send(&mut conversation, "aur?", false).await;
    assert!(matches!(outcome, ExchangeOutcome::Denied { .. }));
    assert_eq!(hooks.bonus_offers.load(Ordering::SeqCst), 1);

    rewards.apply(&[AdReward::ChatBonus(1)], false).await;

    let outcome = orchestrator.send(&mut conversation, "aur?", false).await;
    assert!(matches!(outcome, ExchangeOutcome::Unavailable { .. }));
    assert_eq!(quota.counter().await.used, 3);
    assert!(!quota.can_act(false).await);

    // Greeting plus user/static pairs and the denial; no backend turns.
    assert!(conversation.history().is_empty());
    assert_eq!(conversation.transcript().len(), 1 + 2 * 2 + 1 + 2);
}
