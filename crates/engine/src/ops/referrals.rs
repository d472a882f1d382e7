use sea_orm::{DatabaseTransaction, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    LedgerCmd, LedgerEntry, LedgerSource, MoneyCents, ResultEngine, accounts,
    referral::{AncestorWalk, ReferralPayout, WalkStop, compute_payouts},
    util::parse_uuid,
};

use super::Engine;

impl Engine {
    /// Follow `referred_by` up from the buyer, at most the configured depth,
    /// and compute what each ancestor earns on `price`.
    async fn referral_payouts_in(
        &self,
        db_tx: &DatabaseTransaction,
        buyer: &accounts::Model,
        price: MoneyCents,
    ) -> ResultEngine<Vec<ReferralPayout>> {
        let settings = self.settings.referral_settings();
        let buyer_id = parse_uuid(&buyer.id, "account")?;
        let mut walk = AncestorWalk::new(buyer_id, settings.depth());

        let mut next = buyer.referred_by.clone();
        while let Some(parent_id) = next {
            if walk.next_level().is_none() {
                break;
            }
            let Some(parent) = accounts::Entity::find_by_id(parent_id.clone())
                .one(db_tx)
                .await?
            else {
                tracing::warn!(%buyer_id, referrer = %parent_id, "referrer not found, chain cut");
                break;
            };
            match walk.push(parse_uuid(&parent.id, "referrer")?, parent.disabled) {
                Ok(_) => {}
                Err(WalkStop::Cycle(account_id)) => {
                    tracing::warn!(%buyer_id, %account_id, "referral cycle detected, walk stopped");
                    break;
                }
                Err(WalkStop::DepthReached) => break,
            }
            next = parent.referred_by;
        }

        Ok(compute_payouts(&walk.into_chain(), price, &settings))
    }

    /// Credit every eligible ancestor of `buyer` in one batch.
    pub(super) async fn distribute_referral_rewards_in(
        &self,
        db_tx: &DatabaseTransaction,
        buyer: &accounts::Model,
        price: MoneyCents,
        subscription_id: Uuid,
    ) -> ResultEngine<Vec<LedgerEntry>> {
        let payouts = self.referral_payouts_in(db_tx, buyer, price).await?;
        let items = payouts
            .iter()
            .map(|payout| {
                LedgerCmd::new(payout.account_id, payout.amount, LedgerSource::ReferralBonus)
                    .reference(subscription_id)
            })
            .collect();
        self.batch_credit_in(db_tx, items).await
    }

    /// Runs the referral payout inside a savepoint of `db_tx`. If it fails
    /// only the savepoint is rolled back and the purchase goes on without
    /// rewards.
    pub(super) async fn distribute_referral_rewards_isolated(
        &self,
        db_tx: &DatabaseTransaction,
        buyer: &accounts::Model,
        price: MoneyCents,
        subscription_id: Uuid,
    ) -> ResultEngine<usize> {
        let savepoint = db_tx.begin().await?;
        match self
            .distribute_referral_rewards_in(&savepoint, buyer, price, subscription_id)
            .await
        {
            Ok(entries) => {
                savepoint.commit().await?;
                Ok(entries.len())
            }
            Err(err) => {
                savepoint.rollback().await?;
                tracing::warn!(
                    buyer_id = %buyer.id,
                    %subscription_id,
                    "referral rewards skipped: {err}"
                );
                Ok(0)
            }
        }
    }
}
