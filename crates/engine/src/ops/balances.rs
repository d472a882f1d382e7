//! The balance mutator.
//!
//! Every change to `accounts.balance` goes through this module and writes its
//! [`LedgerEntry`] in the same transaction. The `*_in` variants join the
//! caller's transaction so workflows can compose several movements
//! atomically.

use std::collections::BTreeMap;

use sea_orm::{
    ActiveValue, Condition, ConnectionTrait, DatabaseTransaction, QueryFilter, QuerySelect,
    TransactionTrait, prelude::*,
    sea_query::{CaseStatement, Expr},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Direction, EngineError, EntryStatus, LedgerCmd, LedgerEntry, LedgerSource, MoneyCents,
    ResultEngine, accounts, ledger, util::ensure_positive,
};

use super::{
    Engine,
    accounts::{find_account, lock_account},
    with_tx,
};

/// Outcome of [`Engine::recompute_balance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReconciliation {
    pub account_id: Uuid,
    /// The cached balance before the repair.
    pub previous: MoneyCents,
    /// Sum of the `SUCCESS` ledger entries, now stored as the balance.
    pub recomputed: MoneyCents,
}

impl BalanceReconciliation {
    pub fn drifted(&self) -> bool {
        self.previous != self.recomputed
    }
}

/// `SUM(amount_minor)` over the ledger entries matching `condition`.
pub(super) async fn sum_entries<C: ConnectionTrait>(
    db: &C,
    condition: Condition,
) -> ResultEngine<MoneyCents> {
    let total: Option<i64> = ledger::Entity::find()
        .select_only()
        .column_as(
            Expr::cust("CAST(COALESCE(SUM(amount_minor), 0) AS BIGINT)"),
            "total",
        )
        .filter(condition)
        .into_tuple()
        .one(db)
        .await?;
    Ok(MoneyCents::new(total.unwrap_or_default()))
}

/// Funds earmarked by pending withdrawal holds.
pub(super) async fn held_amount<C: ConnectionTrait>(
    db: &C,
    account_id: Uuid,
) -> ResultEngine<MoneyCents> {
    sum_entries(
        db,
        Condition::all()
            .add(ledger::Column::AccountId.eq(account_id.to_string()))
            .add(ledger::Column::Direction.eq(Direction::Debit.as_str()))
            .add(ledger::Column::Source.eq(LedgerSource::Withdraw.as_str()))
            .add(ledger::Column::Status.eq(EntryStatus::Pending.as_str())),
    )
    .await
}

/// Balance implied by the ledger: successful credits minus successful debits.
async fn ledger_sum<C: ConnectionTrait>(db: &C, account_id: Uuid) -> ResultEngine<MoneyCents> {
    let success = Condition::all()
        .add(ledger::Column::AccountId.eq(account_id.to_string()))
        .add(ledger::Column::Status.eq(EntryStatus::Success.as_str()));
    let credits = sum_entries(
        db,
        success
            .clone()
            .add(ledger::Column::Direction.eq(Direction::Credit.as_str())),
    )
    .await?;
    let debits = sum_entries(
        db,
        success.add(ledger::Column::Direction.eq(Direction::Debit.as_str())),
    )
    .await?;
    Ok(credits - debits)
}

/// Decrement `account_id` by `amount` only if the balance still covers it.
async fn guarded_decrement(
    db_tx: &DatabaseTransaction,
    account: &accounts::Model,
    amount: MoneyCents,
) -> ResultEngine<()> {
    let res = accounts::Entity::update_many()
        .col_expr(
            accounts::Column::Balance,
            Expr::col(accounts::Column::Balance).sub(amount.cents()),
        )
        .filter(accounts::Column::Id.eq(account.id.clone()))
        .filter(accounts::Column::Balance.gte(amount.cents()))
        .exec(db_tx)
        .await?;
    if res.rows_affected != 1 {
        return Err(EngineError::InsufficientBalance {
            available: MoneyCents::new(account.balance),
            requested: amount,
        });
    }
    Ok(())
}

impl Engine {
    /// Add `cmd.amount` to the account and record a `SUCCESS` credit.
    pub async fn credit(&self, cmd: LedgerCmd) -> ResultEngine<LedgerEntry> {
        with_tx!(self, |db_tx| self.credit_in(&db_tx, cmd).await)
    }

    pub async fn credit_in(
        &self,
        db_tx: &DatabaseTransaction,
        cmd: LedgerCmd,
    ) -> ResultEngine<LedgerEntry> {
        ensure_positive(cmd.amount, "credit amount")?;
        let res = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::Balance,
                Expr::col(accounts::Column::Balance).add(cmd.amount.cents()),
            )
            .filter(accounts::Column::Id.eq(cmd.account_id.to_string()))
            .exec(db_tx)
            .await?;
        if res.rows_affected == 0 {
            return Err(EngineError::NotFound("account not exists".to_string()));
        }

        // stamped after the row write so `posted_at` follows the row lock
        let entry = LedgerEntry::new(
            cmd.account_id,
            Direction::Credit,
            cmd.amount,
            cmd.source,
            cmd.reference_id,
            EntryStatus::Success,
        )?;
        ledger::ActiveModel::from(&entry).insert(db_tx).await?;

        tracing::debug!(
            account_id = %cmd.account_id,
            amount = %cmd.amount,
            source = cmd.source.as_str(),
            "credited"
        );
        Ok(entry)
    }

    /// Remove `cmd.amount` from the account and record a `SUCCESS` debit.
    ///
    /// The account row is locked for the rest of the transaction and the
    /// decrement is guarded by `balance >= amount`, so concurrent debits can
    /// never drive the balance negative.
    pub async fn debit(&self, cmd: LedgerCmd) -> ResultEngine<LedgerEntry> {
        with_tx!(self, |db_tx| self.debit_in(&db_tx, cmd).await)
    }

    pub async fn debit_in(
        &self,
        db_tx: &DatabaseTransaction,
        cmd: LedgerCmd,
    ) -> ResultEngine<LedgerEntry> {
        ensure_positive(cmd.amount, "debit amount")?;
        let account = lock_account(db_tx, cmd.account_id).await?;
        let balance = MoneyCents::new(account.balance);
        if balance < cmd.amount {
            return Err(EngineError::InsufficientBalance {
                available: balance,
                requested: cmd.amount,
            });
        }

        guarded_decrement(db_tx, &account, cmd.amount).await?;
        let entry = LedgerEntry::new(
            cmd.account_id,
            Direction::Debit,
            cmd.amount,
            cmd.source,
            cmd.reference_id,
            EntryStatus::Success,
        )?;
        ledger::ActiveModel::from(&entry).insert(db_tx).await?;

        tracing::debug!(
            account_id = %cmd.account_id,
            amount = %cmd.amount,
            source = cmd.source.as_str(),
            "debited"
        );
        Ok(entry)
    }

    /// Credit many accounts at once. Amounts are summed per account and
    /// applied with a single `UPDATE ... CASE`; one entry is written per item.
    ///
    /// Fails with `NotFound` (and writes nothing) if any account is missing.
    pub async fn batch_credit(&self, items: Vec<LedgerCmd>) -> ResultEngine<Vec<LedgerEntry>> {
        with_tx!(self, |db_tx| self.batch_credit_in(&db_tx, items).await)
    }

    pub async fn batch_credit_in(
        &self,
        db_tx: &DatabaseTransaction,
        items: Vec<LedgerCmd>,
    ) -> ResultEngine<Vec<LedgerEntry>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut per_account: BTreeMap<Uuid, MoneyCents> = BTreeMap::new();
        for item in &items {
            ensure_positive(item.amount, "credit amount")?;
            let total = per_account.entry(item.account_id).or_default();
            *total = total
                .checked_add(item.amount)
                .ok_or_else(|| EngineError::InvalidAmount("credit overflow".to_string()))?;
        }

        let increments = per_account
            .iter()
            .fold(CaseStatement::new(), |case, (account_id, amount)| {
                case.case(
                    accounts::Column::Id.eq(account_id.to_string()),
                    amount.cents(),
                )
            })
            .finally(0i64);
        let ids: Vec<String> = per_account.keys().map(ToString::to_string).collect();

        let res = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::Balance,
                Expr::col(accounts::Column::Balance).add(increments),
            )
            .filter(accounts::Column::Id.is_in(ids))
            .exec(db_tx)
            .await?;
        if res.rows_affected != per_account.len() as u64 {
            return Err(EngineError::NotFound(format!(
                "{} of {} accounts not exists",
                per_account.len() as u64 - res.rows_affected,
                per_account.len()
            )));
        }

        let entries = items
            .iter()
            .map(|item| {
                LedgerEntry::new(
                    item.account_id,
                    Direction::Credit,
                    item.amount,
                    item.source,
                    item.reference_id,
                    EntryStatus::Success,
                )
            })
            .collect::<ResultEngine<Vec<_>>>()?;
        ledger::Entity::insert_many(entries.iter().map(ledger::ActiveModel::from))
            .exec_without_returning(db_tx)
            .await?;

        tracing::debug!(
            accounts = per_account.len(),
            entries = entries.len(),
            "batch credited"
        );
        Ok(entries)
    }

    /// Record a `PENDING` withdrawal hold. The balance is untouched but the
    /// held amount no longer counts as available.
    pub(super) async fn place_hold_in(
        &self,
        db_tx: &DatabaseTransaction,
        cmd: LedgerCmd,
    ) -> ResultEngine<LedgerEntry> {
        ensure_positive(cmd.amount, "withdrawal amount")?;
        let account = lock_account(db_tx, cmd.account_id).await?;
        let available = MoneyCents::new(account.balance) - held_amount(db_tx, cmd.account_id).await?;
        if available < cmd.amount {
            return Err(EngineError::InsufficientBalance {
                available,
                requested: cmd.amount,
            });
        }

        let entry = LedgerEntry::new(
            cmd.account_id,
            Direction::Debit,
            cmd.amount,
            LedgerSource::Withdraw,
            cmd.reference_id,
            EntryStatus::Pending,
        )?;
        ledger::ActiveModel::from(&entry).insert(db_tx).await?;
        Ok(entry)
    }

    /// Turn a pending hold into a `SUCCESS` debit and take the money.
    pub(super) async fn settle_hold_in(
        &self,
        db_tx: &DatabaseTransaction,
        hold_id: Uuid,
    ) -> ResultEngine<LedgerEntry> {
        let hold = self.pending_hold(db_tx, hold_id).await?;
        let account = lock_account(db_tx, hold.account_id).await?;
        let balance = MoneyCents::new(account.balance);
        if balance < hold.amount {
            return Err(EngineError::InsufficientBalance {
                available: balance,
                requested: hold.amount,
            });
        }
        guarded_decrement(db_tx, &account, hold.amount).await?;
        self.finish_hold(db_tx, hold, EntryStatus::Success).await
    }

    /// Mark a pending hold `FAILED`. No money moves.
    pub(super) async fn release_hold_in(
        &self,
        db_tx: &DatabaseTransaction,
        hold_id: Uuid,
    ) -> ResultEngine<LedgerEntry> {
        let hold = self.pending_hold(db_tx, hold_id).await?;
        self.finish_hold(db_tx, hold, EntryStatus::Failed).await
    }

    async fn pending_hold(
        &self,
        db_tx: &DatabaseTransaction,
        hold_id: Uuid,
    ) -> ResultEngine<LedgerEntry> {
        let model = ledger::Entity::find_by_id(hold_id.to_string())
            .lock_exclusive()
            .one(db_tx)
            .await?
            .ok_or_else(|| EngineError::NotFound("ledger entry not exists".to_string()))?;
        let hold = LedgerEntry::try_from(model)?;
        if hold.status != EntryStatus::Pending || hold.direction != Direction::Debit {
            return Err(EngineError::AlreadyProcessed(format!(
                "ledger entry {hold_id} is {}",
                hold.status.as_str()
            )));
        }
        Ok(hold)
    }

    async fn finish_hold(
        &self,
        db_tx: &DatabaseTransaction,
        mut hold: LedgerEntry,
        status: EntryStatus,
    ) -> ResultEngine<LedgerEntry> {
        let now = chrono::Utc::now();
        let posted_at = (status == EntryStatus::Success).then_some(now);
        let res = ledger::Entity::update_many()
            .col_expr(ledger::Column::Status, Expr::value(status.as_str()))
            .col_expr(ledger::Column::UpdatedAt, Expr::value(now))
            .col_expr(ledger::Column::PostedAt, Expr::value(posted_at))
            .filter(ledger::Column::Id.eq(hold.id.to_string()))
            .filter(ledger::Column::Status.eq(EntryStatus::Pending.as_str()))
            .exec(db_tx)
            .await?;
        if res.rows_affected != 1 {
            return Err(EngineError::AlreadyProcessed(format!(
                "ledger entry {} already settled",
                hold.id
            )));
        }
        hold.status = status;
        hold.updated_at = now;
        hold.posted_at = posted_at;
        Ok(hold)
    }

    /// Cached balance. Plain read, no lock.
    pub async fn balance(&self, account_id: Uuid) -> ResultEngine<MoneyCents> {
        let account = find_account(&self.database, account_id).await?;
        Ok(MoneyCents::new(account.balance))
    }

    /// Balance minus the amounts held by pending withdrawals.
    pub async fn available_balance(&self, account_id: Uuid) -> ResultEngine<MoneyCents> {
        let account = find_account(&self.database, account_id).await?;
        let held = held_amount(&self.database, account_id).await?;
        Ok(MoneyCents::new(account.balance) - held)
    }

    /// The balance implied by the ledger alone. Equal to [`Engine::balance`]
    /// unless the cache drifted.
    pub async fn ledger_balance(&self, account_id: Uuid) -> ResultEngine<MoneyCents> {
        find_account(&self.database, account_id).await?;
        ledger_sum(&self.database, account_id).await
    }

    /// Overwrite the cached balance with the ledger sum.
    pub async fn recompute_balance(&self, account_id: Uuid) -> ResultEngine<BalanceReconciliation> {
        let reconciliation = with_tx!(self, |db_tx| {
            let account = lock_account(&db_tx, account_id).await?;
            let previous = MoneyCents::new(account.balance);
            let recomputed = ledger_sum(&db_tx, account_id).await?;
            if previous != recomputed {
                let mut active: accounts::ActiveModel = account.into();
                active.balance = ActiveValue::Set(recomputed.cents());
                active.update(&db_tx).await?;
            }
            Ok::<_, EngineError>(BalanceReconciliation {
                account_id,
                previous,
                recomputed,
            })
        })?;

        if reconciliation.drifted() {
            tracing::warn!(
                %account_id,
                previous = %reconciliation.previous,
                recomputed = %reconciliation.recomputed,
                "cached balance drifted from the ledger"
            );
        }
        Ok(reconciliation)
    }
}
