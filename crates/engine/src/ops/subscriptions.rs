use sea_orm::{QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    DomainEvent, EngineError, LedgerCmd, LedgerSource, PurchaseCmd, ResultEngine, Subscription,
    subscriptions,
};

use super::{
    Engine,
    accounts::{ensure_enabled, find_account},
    plans::find_plan,
    with_tx,
};

impl Engine {
    /// Buy a subscription: debit the plan price, create the subscription and
    /// pay the referral chain, all in one transaction.
    ///
    /// Referral payouts run in a savepoint; their failure is logged and does
    /// not abort the purchase. Everything else is all-or-nothing.
    pub async fn purchase_subscription(&self, cmd: PurchaseCmd) -> ResultEngine<Subscription> {
        let plan = find_plan(&self.database, cmd.plan_id).await?;
        if !plan.active {
            return Err(EngineError::PlanInactive(plan.name));
        }
        let buyer = find_account(&self.database, cmd.account_id).await?;
        ensure_enabled(&buyer)?;

        let subscription = Subscription::new(cmd.account_id, &plan, cmd.purchased_at)?;
        let rewarded = with_tx!(self, |db_tx| {
            self.debit_in(
                &db_tx,
                LedgerCmd::new(cmd.account_id, plan.price, LedgerSource::Purchase)
                    .reference(subscription.id),
            )
            .await?;
            subscriptions::ActiveModel::from(&subscription)
                .insert(&db_tx)
                .await?;
            if buyer.referred_by.is_some() {
                self.distribute_referral_rewards_isolated(
                    &db_tx,
                    &buyer,
                    plan.price,
                    subscription.id,
                )
                .await
            } else {
                Ok(0)
            }
        })?;

        tracing::info!(
            subscription_id = %subscription.id,
            account_id = %cmd.account_id,
            plan = %plan.name,
            price = %plan.price,
            rewarded,
            "subscription purchased"
        );
        self.emit(DomainEvent::SubscriptionPurchased {
            subscription_id: subscription.id,
            account_id: subscription.account_id,
            plan_id: plan.id,
            price: subscription.price,
            purchased_at: subscription.start_at,
        });
        Ok(subscription)
    }

    pub async fn subscription(&self, subscription_id: Uuid) -> ResultEngine<Subscription> {
        let model = subscriptions::Entity::find_by_id(subscription_id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::NotFound("subscription not exists".to_string()))?;
        Subscription::try_from(model)
    }

    /// Subscriptions of an account, newest first.
    pub async fn subscriptions_for_account(
        &self,
        account_id: Uuid,
    ) -> ResultEngine<Vec<Subscription>> {
        subscriptions::Entity::find()
            .filter(subscriptions::Column::AccountId.eq(account_id.to_string()))
            .order_by_desc(subscriptions::Column::StartAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Subscription::try_from)
            .collect()
    }
}
