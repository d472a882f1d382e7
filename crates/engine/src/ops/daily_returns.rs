//! Daily return accrual and the pre-aggregated summaries it maintains.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use sea_orm::{
    DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
    sea_query::{Expr, OnConflict},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    DailyReturnLog, DailyReturnSummary, DomainEvent, EngineError, LedgerCmd, LedgerSource,
    MoneyCents, PeriodType, ResultEngine, Subscription, daily_return_logs,
    daily_return_summaries, subscriptions, util::is_unique_violation,
};

use super::{Engine, plans::find_plan, with_tx};

const REBUILD_CHUNK: usize = 500;

/// Counters of one accrual run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualReport {
    pub credited: u32,
    /// Already credited for the date, or nothing to credit.
    pub skipped: u32,
    pub failed: u32,
    pub total: MoneyCents,
}

/// What [`Engine::accrue_daily_return`] did for one subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccrualOutcome {
    Credited(DailyReturnLog),
    AlreadyCredited,
    /// The plan pays no daily return.
    NoReturn,
    /// The subscription is not running on that date.
    NotEligible,
}

fn day_bounds(for_date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = for_date.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

fn eligible_on(subscription: &Subscription, for_date: NaiveDate) -> bool {
    let (day_start, day_end) = day_bounds(for_date);
    subscription.active && subscription.end_at > day_start && subscription.start_at < day_end
}

impl Engine {
    /// Credit one daily return to every subscription running on `for_date`.
    ///
    /// Each subscription is processed in its own transaction: a failure is
    /// logged and counted, and the run continues. Running the job twice for
    /// the same date credits nothing the second time.
    pub async fn run_daily_returns(&self, for_date: NaiveDate) -> ResultEngine<AccrualReport> {
        let (day_start, day_end) = day_bounds(for_date);
        let eligible = subscriptions::Entity::find()
            .filter(subscriptions::Column::Active.eq(true))
            .filter(subscriptions::Column::EndAt.gt(day_start))
            .filter(subscriptions::Column::StartAt.lt(day_end))
            .order_by_asc(subscriptions::Column::StartAt)
            .all(&self.database)
            .await?;

        let mut report = AccrualReport::default();
        for model in eligible {
            let subscription_id = model.id.clone();
            let result = match Subscription::try_from(model) {
                Ok(subscription) => self.accrue(&subscription, for_date).await,
                Err(err) => Err(err),
            };
            match result {
                Ok(AccrualOutcome::Credited(log)) => {
                    report.credited += 1;
                    report.total += log.amount;
                }
                Ok(_) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(%subscription_id, %for_date, "daily return failed: {err}");
                }
            }
        }

        tracing::info!(
            %for_date,
            credited = report.credited,
            skipped = report.skipped,
            failed = report.failed,
            total = %report.total,
            "daily returns run finished"
        );
        Ok(report)
    }

    /// Credit the daily return of one subscription for `for_date`, at most
    /// once.
    pub async fn accrue_daily_return(
        &self,
        subscription_id: Uuid,
        for_date: NaiveDate,
    ) -> ResultEngine<AccrualOutcome> {
        let subscription = self.subscription(subscription_id).await?;
        self.accrue(&subscription, for_date).await
    }

    async fn accrue(
        &self,
        subscription: &Subscription,
        for_date: NaiveDate,
    ) -> ResultEngine<AccrualOutcome> {
        if !eligible_on(subscription, for_date) {
            return Ok(AccrualOutcome::NotEligible);
        }
        let already = daily_return_logs::Entity::find()
            .filter(daily_return_logs::Column::SubscriptionId.eq(subscription.id.to_string()))
            .filter(daily_return_logs::Column::CreditedFor.eq(for_date))
            .one(&self.database)
            .await?;
        if already.is_some() {
            return Ok(AccrualOutcome::AlreadyCredited);
        }
        let plan = find_plan(&self.database, subscription.plan_id).await?;
        if !plan.daily_return.is_positive() {
            return Ok(AccrualOutcome::NoReturn);
        }

        let log = with_tx!(self, |db_tx| {
            let entry = self
                .credit_in(
                    &db_tx,
                    LedgerCmd::new(
                        subscription.account_id,
                        plan.daily_return,
                        LedgerSource::DailyReturn,
                    )
                    .reference(subscription.id),
                )
                .await?;
            let log = DailyReturnLog {
                id: Uuid::new_v4(),
                subscription_id: subscription.id,
                account_id: subscription.account_id,
                credited_for: for_date,
                amount: plan.daily_return,
                ledger_entry_id: entry.id,
                created_at: Utc::now(),
            };
            // the unique (subscription_id, credited_for) index is the real
            // idempotency guard; dropping db_tx undoes the credit above
            match daily_return_logs::ActiveModel::from(&log).insert(&db_tx).await {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => {
                    return Ok(AccrualOutcome::AlreadyCredited);
                }
                Err(err) => return Err(err.into()),
            }
            increment_summaries_in(&db_tx, &log).await?;
            Ok::<_, EngineError>(log)
        })?;

        tracing::debug!(
            subscription_id = %subscription.id,
            %for_date,
            amount = %log.amount,
            "daily return credited"
        );
        self.emit(DomainEvent::DailyReturnCredited {
            subscription_id: log.subscription_id,
            account_id: log.account_id,
            credited_for: log.credited_for,
            amount: log.amount,
        });
        Ok(AccrualOutcome::Credited(log))
    }

    /// Recompute every summary row from the daily return logs.
    ///
    /// Returns the number of rows written.
    pub async fn rebuild_daily_return_summaries(&self) -> ResultEngine<usize> {
        let written = with_tx!(self, |db_tx| {
            daily_return_summaries::Entity::delete_many()
                .exec(&db_tx)
                .await?;

            let logs = daily_return_logs::Entity::find().all(&db_tx).await?;
            let mut totals: BTreeMap<(Uuid, PeriodType, String), (MoneyCents, u64)> =
                BTreeMap::new();
            for model in logs {
                let log = DailyReturnLog::try_from(model)?;
                for period in PeriodType::ALL {
                    let slot = totals
                        .entry((log.account_id, period, period.key_for(log.credited_for)))
                        .or_default();
                    slot.0 += log.amount;
                    slot.1 += 1;
                }
            }

            let rows: Vec<daily_return_summaries::ActiveModel> = totals
                .into_iter()
                .map(|((account_id, period_type, period_key), (total, entry_count))| {
                    daily_return_summaries::ActiveModel::from(&DailyReturnSummary {
                        account_id,
                        period_type,
                        period_key,
                        total,
                        entry_count,
                    })
                })
                .collect();
            let written = rows.len();
            for chunk in rows.chunks(REBUILD_CHUNK) {
                daily_return_summaries::Entity::insert_many(chunk.to_vec())
                    .exec_without_returning(&db_tx)
                    .await?;
            }
            Ok::<_, EngineError>(written)
        })?;

        tracing::info!(rows = written, "daily return summaries rebuilt");
        Ok(written)
    }

    /// Total credited to an account for one period, from the summaries.
    pub async fn daily_return_total(
        &self,
        account_id: Uuid,
        period: PeriodType,
        period_key: &str,
    ) -> ResultEngine<MoneyCents> {
        let row = daily_return_summaries::Entity::find_by_id((
            account_id.to_string(),
            period.as_str().to_string(),
            period_key.to_string(),
        ))
        .one(&self.database)
        .await?;
        Ok(row.map_or(MoneyCents::ZERO, |row| MoneyCents::new(row.total_minor)))
    }

    /// Same as [`Engine::daily_return_total`] but summed from the raw logs.
    pub async fn daily_return_total_from_logs(
        &self,
        account_id: Uuid,
        period: PeriodType,
        period_key: &str,
    ) -> ResultEngine<MoneyCents> {
        let logs = daily_return_logs::Entity::find()
            .filter(daily_return_logs::Column::AccountId.eq(account_id.to_string()))
            .all(&self.database)
            .await?;
        Ok(logs
            .into_iter()
            .filter(|log| period.key_for(log.credited_for) == period_key)
            .map(|log| MoneyCents::new(log.amount_minor))
            .sum())
    }

    /// Summary rows, optionally restricted to one account, in key order.
    pub async fn daily_return_summaries(
        &self,
        account_id: Option<Uuid>,
    ) -> ResultEngine<Vec<DailyReturnSummary>> {
        let mut query = daily_return_summaries::Entity::find();
        if let Some(account_id) = account_id {
            query = query.filter(daily_return_summaries::Column::AccountId.eq(account_id.to_string()));
        }
        query
            .order_by_asc(daily_return_summaries::Column::AccountId)
            .order_by_asc(daily_return_summaries::Column::PeriodType)
            .order_by_asc(daily_return_summaries::Column::PeriodKey)
            .all(&self.database)
            .await?
            .into_iter()
            .map(DailyReturnSummary::try_from)
            .collect()
    }

    /// Accrual history of one subscription, oldest first.
    pub async fn daily_return_logs(&self, subscription_id: Uuid) -> ResultEngine<Vec<DailyReturnLog>> {
        daily_return_logs::Entity::find()
            .filter(daily_return_logs::Column::SubscriptionId.eq(subscription_id.to_string()))
            .order_by_asc(daily_return_logs::Column::CreditedFor)
            .all(&self.database)
            .await?
            .into_iter()
            .map(DailyReturnLog::try_from)
            .collect()
    }
}

/// Add one log to its day, week and month rows.
async fn increment_summaries_in(
    db_tx: &DatabaseTransaction,
    log: &DailyReturnLog,
) -> ResultEngine<()> {
    use daily_return_summaries::{ActiveModel, Column, Entity};

    for period in PeriodType::ALL {
        let row = ActiveModel::from(&DailyReturnSummary {
            account_id: log.account_id,
            period_type: period,
            period_key: period.key_for(log.credited_for),
            total: log.amount,
            entry_count: 1,
        });
        Entity::insert(row)
            .on_conflict(
                OnConflict::columns([Column::AccountId, Column::PeriodType, Column::PeriodKey])
                    .value(
                        Column::TotalMinor,
                        Expr::col((Entity, Column::TotalMinor)).add(log.amount.cents()),
                    )
                    .value(
                        Column::EntryCount,
                        Expr::col((Entity, Column::EntryCount)).add(1i64),
                    )
                    .to_owned(),
            )
            .exec_without_returning(db_tx)
            .await?;
    }
    Ok(())
}
