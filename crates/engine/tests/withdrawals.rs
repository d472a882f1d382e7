mod common;

use std::sync::Arc;

use chrono::Utc;

use common::{RecordingNotifier, TestEnv, at, cents, env_with};
use engine::{
    Decision, Direction, Engine, EngineError, EntryStatus, EphemeralCache, FinancialSettings,
    LedgerCmd, LedgerFilter, LedgerSource, MemoryCache, ReferralSettings, RequestStatus,
    StaticSettings, WithdrawalCmd,
};

fn financial(ttl_secs: u64) -> FinancialSettings {
    FinancialSettings {
        withdrawal_fee: cents(200),
        min_withdrawal: cents(1_000),
        withdrawal_ttl_secs: ttl_secs,
        ..FinancialSettings::default()
    }
}

async fn withdrawal_env() -> TestEnv {
    env_with(&[], financial(900)).await
}

/// Like [`env_with`] but keeps a handle on the cache.
async fn env_with_cache(financial: FinancialSettings) -> (TestEnv, Arc<MemoryCache>) {
    let db = common::connect().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let cache = Arc::new(MemoryCache::new());
    let settings = StaticSettings::new(ReferralSettings::default(), financial).unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .settings(Arc::new(settings))
        .notifier(notifier.clone())
        .cache(cache.clone())
        .build()
        .await
        .unwrap();
    let env = TestEnv {
        engine: Arc::new(engine),
        db,
        notifier,
    };
    (env, cache)
}

#[tokio::test]
async fn request_below_minimum_or_fee_is_rejected() {
    let env = withdrawal_env().await;
    let alice = env.funded("alice", 10_000).await;

    let err = env
        .engine
        .request_withdrawal(WithdrawalCmd::new(alice.id, cents(999), "bank", at(2026, 10, 1, 9)))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::BelowMinimum {
            minimum: cents(1_000),
            requested: cents(999),
        }
    );

    let err = env
        .engine
        .request_withdrawal(WithdrawalCmd::new(alice.id, cents(1_000), "  ", at(2026, 10, 1, 9)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));
    assert!(env.notifier.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn fee_must_stay_below_amount() {
    let env = env_with(
        &[],
        FinancialSettings {
            withdrawal_fee: cents(500),
            min_withdrawal: cents(100),
            ..FinancialSettings::default()
        },
    )
    .await;
    let alice = env.funded("alice", 10_000).await;

    let err = env
        .engine
        .request_withdrawal(WithdrawalCmd::new(alice.id, cents(500), "bank", at(2026, 10, 1, 9)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));
}

#[tokio::test]
async fn verified_and_approved_withdrawal_takes_the_money() {
    let env = withdrawal_env().await;
    let alice = env.funded("alice", 5_000).await;

    let before = Utc::now();
    let quote = env
        .engine
        .request_withdrawal(WithdrawalCmd::new(alice.id, cents(3_000), "bank", at(2026, 10, 1, 9)))
        .await
        .unwrap();
    let after = Utc::now();
    assert_eq!(quote.fee, cents(200));
    assert_eq!(quote.net_amount, cents(2_800));
    // counted from when the token was issued, not from `requested_at`
    let ttl = chrono::Duration::seconds(900);
    assert!(quote.expires_at >= before + ttl && quote.expires_at <= after + ttl);
    // nothing persisted before verification
    assert!(env.engine.pending_withdrawals().await.unwrap().is_empty());
    assert_eq!(env.engine.available_balance(alice.id).await.unwrap(), cents(5_000));

    let token = env.notifier.last_token();
    let request = env.engine.verify_withdrawal(&token).await.unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.net_amount, cents(2_800));
    assert_eq!(env.balance(&alice).await, 5_000);
    assert_eq!(env.engine.available_balance(alice.id).await.unwrap(), cents(2_000));
    assert_eq!(env.engine.pending_withdrawals().await.unwrap().len(), 1);

    let approved = env
        .engine
        .decide_withdrawal(request.id, Decision::Approve)
        .await
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert!(approved.decided_at.is_some());
    assert_eq!(env.balance(&alice).await, 2_000);
    assert_eq!(env.engine.available_balance(alice.id).await.unwrap(), cents(2_000));
    env.assert_consistent(&alice).await;

    let hold = env
        .engine
        .ledger_entries(
            alice.id,
            &LedgerFilter {
                source: Some(LedgerSource::Withdraw),
                ..LedgerFilter::default()
            },
            10,
        )
        .await
        .unwrap();
    assert_eq!(hold.len(), 1);
    assert_eq!(hold[0].status, EntryStatus::Success);
    assert_eq!(hold[0].reference_id, Some(request.id));

    let err = env
        .engine
        .decide_withdrawal(request.id, Decision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyProcessed(_)));
    let err = env
        .engine
        .decide_withdrawal(request.id, Decision::Reject)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyProcessed(_)));
    assert_eq!(env.balance(&alice).await, 2_000);
}

#[tokio::test]
async fn rejected_withdrawal_releases_the_hold() {
    let env = withdrawal_env().await;
    let alice = env.funded("alice", 5_000).await;
    env.engine
        .request_withdrawal(WithdrawalCmd::new(alice.id, cents(4_000), "bank", at(2026, 10, 1, 9)))
        .await
        .unwrap();
    let request = env
        .engine
        .verify_withdrawal(&env.notifier.last_token())
        .await
        .unwrap();
    assert_eq!(env.engine.available_balance(alice.id).await.unwrap(), cents(1_000));

    let rejected = env
        .engine
        .decide_withdrawal(request.id, Decision::Reject)
        .await
        .unwrap();
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(env.balance(&alice).await, 5_000);
    assert_eq!(env.engine.available_balance(alice.id).await.unwrap(), cents(5_000));
    env.assert_consistent(&alice).await;

    let hold = env
        .engine
        .ledger_entries_for_reference(request.id)
        .await
        .unwrap();
    assert_eq!(hold.len(), 1);
    assert_eq!(hold[0].status, EntryStatus::Failed);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let env = env_with(&[], financial(0)).await;
    let alice = env.funded("alice", 5_000).await;
    env.engine
        .request_withdrawal(WithdrawalCmd::new(alice.id, cents(2_000), "bank", at(2026, 10, 1, 9)))
        .await
        .unwrap();

    let err = env
        .engine
        .verify_withdrawal(&env.notifier.last_token())
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::ExpiredOrInvalidToken);
    assert_eq!(env.engine.available_balance(alice.id).await.unwrap(), cents(5_000));
}

#[tokio::test]
async fn unknown_token_is_rejected() {
    let env = withdrawal_env().await;
    let err = env.engine.verify_withdrawal("not-a-token").await.unwrap_err();
    assert_eq!(err, EngineError::ExpiredOrInvalidToken);
}

#[tokio::test]
async fn token_cannot_be_used_twice() {
    let (env, cache) = env_with_cache(financial(900)).await;
    let alice = env.funded("alice", 5_000).await;
    env.engine
        .request_withdrawal(WithdrawalCmd::new(alice.id, cents(1_500), "bank", at(2026, 10, 1, 9)))
        .await
        .unwrap();
    let token = env.notifier.last_token();
    let key = format!("withdrawal:{token}");
    let payload = cache.get(&key).unwrap().unwrap();

    env.engine.verify_withdrawal(&token).await.unwrap();
    assert!(cache.is_empty());
    let err = env.engine.verify_withdrawal(&token).await.unwrap_err();
    assert_eq!(err, EngineError::ExpiredOrInvalidToken);

    // even if the payload reappears, the token was consumed for good
    cache
        .set(&key, payload, std::time::Duration::from_secs(60))
        .unwrap();
    let err = env.engine.verify_withdrawal(&token).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyProcessed(_)));
    assert_eq!(env.engine.pending_withdrawals().await.unwrap().len(), 1);
    assert_eq!(env.engine.available_balance(alice.id).await.unwrap(), cents(3_500));
}

#[tokio::test]
async fn verification_rechecks_available_balance() {
    let env = withdrawal_env().await;
    let alice = env.funded("alice", 5_000).await;

    env.engine
        .request_withdrawal(WithdrawalCmd::new(alice.id, cents(3_000), "bank", at(2026, 10, 1, 9)))
        .await
        .unwrap();
    let first = env.notifier.last_token();
    env.engine
        .request_withdrawal(WithdrawalCmd::new(alice.id, cents(3_000), "bank", at(2026, 10, 1, 9)))
        .await
        .unwrap();
    let second = env.notifier.last_token();
    assert_ne!(first, second);

    env.engine.verify_withdrawal(&first).await.unwrap();
    let err = env.engine.verify_withdrawal(&second).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::InsufficientBalance {
            available: cents(2_000),
            requested: cents(3_000),
        }
    );
    assert_eq!(env.engine.pending_withdrawals().await.unwrap().len(), 1);

    // a held amount is not spendable by a new request either
    let err = env
        .engine
        .request_withdrawal(WithdrawalCmd::new(alice.id, cents(2_500), "bank", at(2026, 10, 1, 9)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientBalance { .. }));
}

#[tokio::test]
async fn below_minimum_leaves_no_cache_entry_and_net_subtracts_fee() {
    let (env, cache) = env_with_cache(FinancialSettings {
        withdrawal_fee: cents(4),
        min_withdrawal: cents(100),
        ..FinancialSettings::default()
    })
    .await;
    let alice = env.funded("alice", 500).await;

    let err = env
        .engine
        .request_withdrawal(WithdrawalCmd::new(alice.id, cents(50), "bank", at(2026, 10, 1, 9)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BelowMinimum { .. }));
    assert!(cache.is_empty());

    let quote = env
        .engine
        .request_withdrawal(WithdrawalCmd::new(alice.id, cents(150), "bank", at(2026, 10, 1, 9)))
        .await
        .unwrap();
    assert_eq!(quote.net_amount, cents(146));
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn approving_two_hundred_of_five_hundred_leaves_three_hundred() {
    let env = env_with(&[], FinancialSettings::default()).await;
    let alice = env.funded("alice", 500).await;
    env.engine
        .request_withdrawal(WithdrawalCmd::new(alice.id, cents(200), "bank", at(2026, 10, 1, 9)))
        .await
        .unwrap();
    let request = env
        .engine
        .verify_withdrawal(&env.notifier.last_token())
        .await
        .unwrap();

    env.engine
        .decide_withdrawal(request.id, Decision::Approve)
        .await
        .unwrap();
    assert_eq!(env.balance(&alice).await, 300);
    let debits = env
        .engine
        .ledger_entries(
            alice.id,
            &LedgerFilter {
                direction: Some(Direction::Debit),
                ..LedgerFilter::default()
            },
            10,
        )
        .await
        .unwrap();
    assert_eq!(debits.len(), 1);
    assert_eq!(debits[0].source, LedgerSource::Withdraw);
    assert_eq!(debits[0].amount, cents(200));
    assert_eq!(debits[0].status, EntryStatus::Success);

    let err = env
        .engine
        .decide_withdrawal(request.id, Decision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyProcessed(_)));
    assert_eq!(env.balance(&alice).await, 300);
    assert_eq!(
        env.engine.withdrawal_request(request.id).await.unwrap().status,
        RequestStatus::Approved
    );
}

#[tokio::test]
async fn settled_withdrawal_is_listed_after_debits_posted_while_pending() {
    let env = withdrawal_env().await;
    let alice = env.funded("alice", 5_000).await;
    env.engine
        .request_withdrawal(WithdrawalCmd::new(alice.id, cents(3_000), "bank", at(2026, 10, 1, 9)))
        .await
        .unwrap();
    let request = env
        .engine
        .verify_withdrawal(&env.notifier.last_token())
        .await
        .unwrap();

    env.engine
        .debit(LedgerCmd::new(alice.id, cents(1_000), LedgerSource::Purchase))
        .await
        .unwrap();
    let approved = env
        .engine
        .decide_withdrawal(request.id, Decision::Approve)
        .await
        .unwrap();
    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(env.balance(&alice).await, 1_000);

    let posted = env
        .engine
        .ledger_entries(
            alice.id,
            &LedgerFilter {
                status: Some(EntryStatus::Success),
                ..LedgerFilter::default()
            },
            10,
        )
        .await
        .unwrap();
    let sources: Vec<_> = posted.iter().map(|entry| entry.source).collect();
    assert_eq!(
        sources,
        vec![
            LedgerSource::Withdraw,
            LedgerSource::Purchase,
            LedgerSource::Recharge
        ]
    );
    assert!(posted[0].posted_at > posted[1].posted_at);
    assert!(posted[0].created_at < posted[1].created_at);
}
