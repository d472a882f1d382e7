use std::collections::HashSet;

use sea_orm::{
    ActiveValue, ConnectionTrait, DatabaseTransaction, QueryFilter, QuerySelect,
    TransactionTrait, prelude::*,
    sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    Account, EngineError, NewAccountCmd, ResultEngine, accounts,
    util::{is_unique_violation, normalize_optional_text},
};

use super::{Engine, normalize_required_name, with_tx};

/// Load an account row without locking it.
pub(super) async fn find_account<C: ConnectionTrait>(
    db: &C,
    account_id: Uuid,
) -> ResultEngine<accounts::Model> {
    accounts::Entity::find_by_id(account_id.to_string())
        .one(db)
        .await?
        .ok_or_else(|| EngineError::NotFound("account not exists".to_string()))
}

/// Load an account row with a row-level write lock held until the end of
/// `db_tx`.
pub(super) async fn lock_account(
    db_tx: &DatabaseTransaction,
    account_id: Uuid,
) -> ResultEngine<accounts::Model> {
    accounts::Entity::find_by_id(account_id.to_string())
        .lock_exclusive()
        .one(db_tx)
        .await?
        .ok_or_else(|| EngineError::NotFound("account not exists".to_string()))
}

pub(super) fn ensure_enabled(account: &accounts::Model) -> ResultEngine<()> {
    if account.disabled {
        return Err(EngineError::AccountDisabled(account.username.clone()));
    }
    Ok(())
}

impl Engine {
    /// Register a new account with a zero balance.
    ///
    /// The optional referrer must exist. Usernames are unique.
    pub async fn create_account(&self, cmd: NewAccountCmd) -> ResultEngine<Account> {
        let username = normalize_required_name(&cmd.username, "username")?;
        let email = normalize_optional_text(cmd.email.as_deref());
        let account = Account::new(username, email, cmd.referred_by);

        with_tx!(self, |db_tx| {
            if let Some(referrer_id) = account.referred_by {
                find_account(&db_tx, referrer_id).await.map_err(|_| {
                    EngineError::InvalidReferrer(format!("referrer {referrer_id} not exists"))
                })?;
            }
            match accounts::ActiveModel::from(&account).insert(&db_tx).await {
                Ok(_) => Ok(()),
                Err(err) if is_unique_violation(&err) => Err(EngineError::ConflictingReference(
                    format!("username {} already taken", account.username),
                )),
                Err(err) => Err(err.into()),
            }
        })?;

        tracing::info!(account_id = %account.id, username = %account.username, "account created");
        Ok(account)
    }

    pub async fn account(&self, account_id: Uuid) -> ResultEngine<Account> {
        Account::try_from(find_account(&self.database, account_id).await?)
    }

    /// Attach (or detach, with `None`) the direct referrer of an account.
    ///
    /// Rejects self-referral and any link that would close a cycle in the
    /// referral graph.
    pub async fn set_referrer(
        &self,
        account_id: Uuid,
        referrer_id: Option<Uuid>,
    ) -> ResultEngine<Account> {
        let account = with_tx!(self, |db_tx| {
            let model = lock_account(&db_tx, account_id).await?;
            if let Some(referrer_id) = referrer_id {
                if referrer_id == account_id {
                    return Err(EngineError::InvalidReferrer(
                        "an account cannot refer itself".to_string(),
                    ));
                }
                self.ensure_not_descendant(&db_tx, account_id, referrer_id)
                    .await?;
            }

            let mut active: accounts::ActiveModel = model.into();
            active.referred_by = ActiveValue::Set(referrer_id.map(|id| id.to_string()));
            Account::try_from(active.update(&db_tx).await?)
        })?;

        tracing::info!(%account_id, referrer = ?referrer_id, "referrer updated");
        Ok(account)
    }

    /// Walks up from `referrer_id` and fails if `account_id` is one of its
    /// ancestors.
    async fn ensure_not_descendant(
        &self,
        db_tx: &DatabaseTransaction,
        account_id: Uuid,
        referrer_id: Uuid,
    ) -> ResultEngine<()> {
        let mut visited = HashSet::from([referrer_id]);
        let referrer = find_account(db_tx, referrer_id).await.map_err(|_| {
            EngineError::InvalidReferrer(format!("referrer {referrer_id} not exists"))
        })?;
        let mut next = referrer.referred_by;
        while let Some(parent) = next {
            let parent_id = Uuid::parse_str(&parent)
                .map_err(|_| EngineError::InvalidReferrer(format!("invalid referrer {parent}")))?;
            if parent_id == account_id {
                return Err(EngineError::InvalidReferrer(format!(
                    "{referrer_id} is referred by {account_id}"
                )));
            }
            if !visited.insert(parent_id) {
                tracing::warn!(%parent_id, "referral cycle found while validating referrer");
                break;
            }
            next = accounts::Entity::find_by_id(parent)
                .one(db_tx)
                .await?
                .and_then(|model| model.referred_by);
        }
        Ok(())
    }

    /// Disabled accounts keep their balance but cannot buy, withdraw or
    /// recharge, and are skipped by referral payouts.
    pub async fn set_account_disabled(&self, account_id: Uuid, disabled: bool) -> ResultEngine<()> {
        let res = accounts::Entity::update_many()
            .col_expr(accounts::Column::Disabled, Expr::value(disabled))
            .filter(accounts::Column::Id.eq(account_id.to_string()))
            .exec(&self.database)
            .await?;
        if res.rows_affected == 0 {
            return Err(EngineError::NotFound("account not exists".to_string()));
        }
        tracing::info!(%account_id, disabled, "account state changed");
        Ok(())
    }
}
