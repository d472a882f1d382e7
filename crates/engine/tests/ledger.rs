mod common;

use std::{sync::Arc, time::Duration};

use common::{cents, connect_file, env, env_on};
use engine::{
    Direction, Engine, EngineError, EntryStatus, FinancialSettings, LedgerCmd, LedgerFilter,
    LedgerSource, NewAccountCmd,
};
use tokio::task::JoinSet;
use uuid::Uuid;

#[tokio::test]
async fn credit_then_debit_moves_balance_and_writes_entries() {
    let env = env().await;
    let alice = env.account("alice").await;

    let credit = env
        .engine
        .credit(LedgerCmd::new(alice.id, cents(10_000), LedgerSource::Recharge))
        .await
        .unwrap();
    assert_eq!(credit.direction, Direction::Credit);
    assert_eq!(credit.status, EntryStatus::Success);

    let debit = env
        .engine
        .debit(LedgerCmd::new(alice.id, cents(2_500), LedgerSource::Purchase).reference(Uuid::new_v4()))
        .await
        .unwrap();
    assert_eq!(debit.signed_amount(), cents(-2_500));

    assert_eq!(env.balance(&alice).await, 7_500);
    env.assert_consistent(&alice).await;

    let entries = env
        .engine
        .ledger_entries(alice.id, &LedgerFilter::default(), 10)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
}

#[tokio::test]
async fn debit_over_balance_fails_and_writes_nothing() {
    let env = env().await;
    let alice = env.funded("alice", 500).await;

    let err = env
        .engine
        .debit(LedgerCmd::new(alice.id, cents(600), LedgerSource::Purchase))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InsufficientBalance {
            available: cents(500),
            requested: cents(600),
        }
    );

    assert_eq!(env.balance(&alice).await, 500);
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
    assert!(debits.is_empty());
}

#[tokio::test]
async fn non_positive_amounts_are_rejected() {
    let env = env().await;
    let alice = env.funded("alice", 500).await;

    let err = env
        .engine
        .credit(LedgerCmd::new(alice.id, cents(0), LedgerSource::Reward))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidAmount("credit amount must be > 0".to_string())
    );

    let err = env
        .engine
        .debit(LedgerCmd::new(alice.id, cents(-5), LedgerSource::Purchase))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidAmount("debit amount must be > 0".to_string())
    );
    assert_eq!(env.balance(&alice).await, 500);
}

#[tokio::test]
async fn credit_to_unknown_account_is_not_found() {
    let env = env().await;
    let err = env
        .engine
        .credit(LedgerCmd::new(Uuid::new_v4(), cents(100), LedgerSource::Reward))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound("account not exists".to_string()));
}

/// Debit, retrying while another connection holds the sqlite write lock.
async fn debit_when_unlocked(
    engine: Arc<Engine>,
    account_id: Uuid,
    amount: i64,
) -> Result<i64, EngineError> {
    loop {
        match engine
            .debit(LedgerCmd::new(account_id, cents(amount), LedgerSource::Purchase))
            .await
        {
            Ok(entry) => return Ok(entry.amount.cents()),
            Err(EngineError::Database(err)) if err.to_string().contains("locked") => {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_debits_never_overdraw() {
    let dir = tempfile::tempdir().unwrap();
    let env = env_on(connect_file(&dir, 8).await, &[], FinancialSettings::default()).await;

    // (starting balance, debit amounts raced against it)
    let cases: Vec<(i64, Vec<i64>)> = vec![
        (1_000, vec![300; 10]),
        (1_000, vec![70; 25]),
        (7, vec![1; 16]),
        (4_000, vec![500; 8]),
        (2_500, vec![900, 100, 1_200, 50, 700, 300, 1_000, 250, 600, 20, 800, 450]),
        (999, vec![1_000; 6]),
    ];

    for (case, (start, amounts)) in cases.into_iter().enumerate() {
        let account = env.funded(&format!("racer{case}"), start).await;

        let mut tasks = JoinSet::new();
        for amount in amounts.iter().copied() {
            tasks.spawn(debit_when_unlocked(env.engine.clone(), account.id, amount));
        }

        let mut debited = 0;
        let mut refused = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined.unwrap() {
                Ok(amount) => debited += amount,
                Err(EngineError::InsufficientBalance { requested, .. }) => {
                    refused.push(requested.cents())
                }
                Err(other) => panic!("case {case}: unexpected error: {other}"),
            }
        }

        let balance = env.balance(&account).await;
        assert!(balance >= 0, "case {case}: overdrawn to {balance}");
        assert_eq!(balance, start - debited, "case {case}");
        env.assert_consistent(&account).await;
        // a refused debit did not fit even the final, smallest balance
        for requested in refused {
            assert!(requested > balance, "case {case}: refused {requested} of {balance}");
        }
        if amounts.iter().all(|amount| *amount == amounts[0]) {
            let fitting = (start / amounts[0]).min(amounts.len() as i64);
            assert_eq!(debited, fitting * amounts[0], "case {case}");
        }
    }
}

#[tokio::test]
async fn batch_credit_sums_per_account() {
    let env = env().await;
    let alice = env.account("alice").await;
    let bob = env.account("bob").await;
    let reference = Uuid::new_v4();

    let entries = env
        .engine
        .batch_credit(vec![
            LedgerCmd::new(alice.id, cents(100), LedgerSource::ReferralBonus).reference(reference),
            LedgerCmd::new(bob.id, cents(40), LedgerSource::ReferralBonus).reference(reference),
            LedgerCmd::new(alice.id, cents(25), LedgerSource::ReferralBonus).reference(reference),
        ])
        .await
        .unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(env.balance(&alice).await, 125);
    assert_eq!(env.balance(&bob).await, 40);
    env.assert_consistent(&alice).await;
    env.assert_consistent(&bob).await;
    assert_eq!(
        env.engine
            .ledger_entries_for_reference(reference)
            .await
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn batch_credit_with_missing_account_writes_nothing() {
    let env = env().await;
    let alice = env.account("alice").await;

    let err = env
        .engine
        .batch_credit(vec![
            LedgerCmd::new(alice.id, cents(100), LedgerSource::Reward),
            LedgerCmd::new(Uuid::new_v4(), cents(100), LedgerSource::Reward),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    assert_eq!(env.balance(&alice).await, 0);
    env.assert_consistent(&alice).await;
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let env = env().await;
    assert!(env.engine.batch_credit(Vec::new()).await.unwrap().is_empty());
}

#[tokio::test]
async fn ledger_entries_filter_and_limit() {
    let env = env().await;
    let alice = env.funded("alice", 1_000).await;
    for _ in 0..3 {
        env.engine
            .debit(LedgerCmd::new(alice.id, cents(100), LedgerSource::Purchase))
            .await
            .unwrap();
    }

    let purchases = env
        .engine
        .ledger_entries(
            alice.id,
            &LedgerFilter {
                source: Some(LedgerSource::Purchase),
                ..LedgerFilter::default()
            },
            2,
        )
        .await
        .unwrap();
    assert_eq!(purchases.len(), 2);
    assert!(purchases.iter().all(|e| e.source == LedgerSource::Purchase));
    assert!(purchases[0].created_at >= purchases[1].created_at);

    let err = env
        .engine
        .ledger_entries(alice.id, &LedgerFilter::default(), 0)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::InvalidAmount("limit must be > 0".to_string()));
}

#[tokio::test]
async fn recompute_balance_repairs_drift() {
    let env = env().await;
    let alice = env.funded("alice", 1_000).await;
    env.exec(
        "UPDATE accounts SET balance = ? WHERE id = ?",
        vec![42i64.into(), alice.id.to_string().into()],
    )
    .await;

    let reconciliation = env.engine.recompute_balance(alice.id).await.unwrap();
    assert!(reconciliation.drifted());
    assert_eq!(reconciliation.previous, cents(42));
    assert_eq!(reconciliation.recomputed, cents(1_000));
    assert_eq!(env.balance(&alice).await, 1_000);

    let again = env.engine.recompute_balance(alice.id).await.unwrap();
    assert!(!again.drifted());
}

#[tokio::test]
async fn username_is_unique_and_referrer_must_exist() {
    let env = env().await;
    env.account("alice").await;

    let err = env
        .engine
        .create_account(NewAccountCmd::new("alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ConflictingReference(_)));

    let err = env
        .engine
        .create_account(NewAccountCmd::new("bob").referred_by(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidReferrer(_)));

    let err = env
        .engine
        .create_account(NewAccountCmd::new("   "))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidAmount("username must not be empty".to_string())
    );
}

#[tokio::test]
async fn set_referrer_rejects_self_and_cycles() {
    let env = env().await;
    let top = env.account("top").await;
    let middle = env.referred("middle", &top).await;
    let leaf = env.referred("leaf", &middle).await;

    let err = env
        .engine
        .set_referrer(top.id, Some(top.id))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidReferrer(_)));

    let err = env
        .engine
        .set_referrer(top.id, Some(leaf.id))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidReferrer(_)));

    let other = env.account("other").await;
    let moved = env.engine.set_referrer(leaf.id, Some(other.id)).await.unwrap();
    assert_eq!(moved.referred_by, Some(other.id));

    let detached = env.engine.set_referrer(leaf.id, None).await.unwrap();
    assert_eq!(detached.referred_by, None);
}
