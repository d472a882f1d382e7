use chrono::{DateTime, Utc};
use sea_orm::{QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*, sea_query::Expr};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    DomainEvent, EngineError, LedgerCmd, LedgerSource, MoneyCents, ResultEngine, Subscription,
    subscriptions,
};

use super::{Engine, with_tx};

/// Counters of one expiry run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryReport {
    pub expired: u32,
    /// Already handled by a concurrent run.
    pub skipped: u32,
    pub failed: u32,
    /// Principal credited back, after tax.
    pub returned: MoneyCents,
}

impl Engine {
    /// Deactivate every subscription whose `end_at` is before `now` and
    /// credit back its principal minus the configured tax.
    ///
    /// Subscriptions are handled one by one; a failing one is logged and the
    /// run continues.
    pub async fn run_subscription_expiry(&self, now: DateTime<Utc>) -> ResultEngine<ExpiryReport> {
        let due: Vec<String> = subscriptions::Entity::find()
            .select_only()
            .column(subscriptions::Column::Id)
            .filter(subscriptions::Column::Active.eq(true))
            .filter(subscriptions::Column::EndAt.lt(now))
            .order_by_asc(subscriptions::Column::EndAt)
            .into_tuple()
            .all(&self.database)
            .await?;

        let mut report = ExpiryReport::default();
        for subscription_id in due {
            let result = match Uuid::parse_str(&subscription_id) {
                Ok(id) => self.expire_subscription(id, now).await,
                Err(_) => Err(EngineError::NotFound("invalid subscription id".to_string())),
            };
            match result {
                Ok(Some(returned)) => {
                    report.expired += 1;
                    report.returned += returned;
                }
                Ok(None) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(%subscription_id, "subscription expiry failed: {err}");
                }
            }
        }

        tracing::info!(
            expired = report.expired,
            skipped = report.skipped,
            failed = report.failed,
            returned = %report.returned,
            "subscription expiry run finished"
        );
        Ok(report)
    }

    /// Mature one subscription. Returns the credited principal, or `None` if
    /// it is not due or was already deactivated.
    pub async fn expire_subscription(
        &self,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> ResultEngine<Option<MoneyCents>> {
        let tax_percent = self.settings.financial_settings().principal_tax_percent;

        let matured = with_tx!(self, |db_tx| {
            let model = subscriptions::Entity::find_by_id(subscription_id.to_string())
                .lock_exclusive()
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound("subscription not exists".to_string()))?;
            let subscription = Subscription::try_from(model)?;
            if !subscription.active || subscription.end_at >= now {
                return Ok(None);
            }

            let tax = subscription.price.percent_of(tax_percent).ok_or_else(|| {
                EngineError::InvalidAmount(format!("principal tax overflow on {subscription_id}"))
            })?;
            let returned = subscription.price - tax;

            let res = subscriptions::Entity::update_many()
                .col_expr(subscriptions::Column::Active, Expr::value(false))
                .filter(subscriptions::Column::Id.eq(subscription_id.to_string()))
                .filter(subscriptions::Column::Active.eq(true))
                .exec(&db_tx)
                .await?;
            if res.rows_affected != 1 {
                return Ok(None);
            }
            if returned.is_positive() {
                self.credit_in(
                    &db_tx,
                    LedgerCmd::new(
                        subscription.account_id,
                        returned,
                        LedgerSource::PrincipalReturn,
                    )
                    .reference(subscription.id),
                )
                .await?;
            }
            Ok::<_, EngineError>((subscription, returned))
        })?;

        let (subscription, returned) = matured;
        tracing::info!(
            %subscription_id,
            account_id = %subscription.account_id,
            price = %subscription.price,
            returned = %returned,
            "subscription matured"
        );
        self.emit(DomainEvent::SubscriptionMatured {
            subscription_id,
            account_id: subscription.account_id,
            returned,
        });
        Ok(Some(returned))
    }
}
