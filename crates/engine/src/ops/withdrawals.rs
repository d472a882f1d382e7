//! Two-phase withdrawal: request and email verification, then admin decision.

use chrono::Utc;
use sea_orm::{
    ActiveValue, QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*,
    sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    Decision, DomainEvent, EngineError, LedgerCmd, LedgerSource, MoneyCents, Notification,
    PendingWithdrawal, RequestStatus, ResultEngine, WithdrawalCmd, WithdrawalQuote,
    WithdrawalRequest,
    util::{ensure_positive, is_unique_violation},
    withdrawals as withdrawal_requests,
};

use super::{
    Engine,
    accounts::{ensure_enabled, find_account},
    balances::held_amount,
    normalize_required_name, with_tx,
};

fn cache_key(token: &str) -> String {
    format!("withdrawal:{token}")
}

impl Engine {
    /// Validate a withdrawal and park it in the cache until the owner
    /// verifies it. Nothing is written to the database yet.
    ///
    /// The verification token only leaves the engine through the notifier.
    pub async fn request_withdrawal(&self, cmd: WithdrawalCmd) -> ResultEngine<WithdrawalQuote> {
        ensure_positive(cmd.amount, "withdrawal amount")?;
        let destination = normalize_required_name(&cmd.destination, "destination")?;
        let financial = self.settings.financial_settings();
        if cmd.amount < financial.min_withdrawal {
            return Err(EngineError::BelowMinimum {
                minimum: financial.min_withdrawal,
                requested: cmd.amount,
            });
        }
        if cmd.amount <= financial.withdrawal_fee {
            return Err(EngineError::InvalidAmount(format!(
                "withdrawal amount must exceed the fee of {}",
                financial.withdrawal_fee
            )));
        }

        let account = find_account(&self.database, cmd.account_id).await?;
        ensure_enabled(&account)?;
        let available =
            MoneyCents::new(account.balance) - held_amount(&self.database, cmd.account_id).await?;
        if available < cmd.amount {
            return Err(EngineError::InsufficientBalance {
                available,
                requested: cmd.amount,
            });
        }

        let pending = PendingWithdrawal {
            account_id: cmd.account_id,
            amount: cmd.amount,
            fee: financial.withdrawal_fee,
            net_amount: cmd.amount - financial.withdrawal_fee,
            destination,
            requested_at: cmd.requested_at,
        };
        let payload =
            serde_json::to_string(&pending).map_err(|e| EngineError::Serialization(e.to_string()))?;
        // the cache counts the ttl from insertion, so the quote does too
        let ttl = std::time::Duration::from_secs(financial.withdrawal_ttl_secs);
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| EngineError::InvalidAmount("withdrawal ttl out of range".to_string()))?;
        let token = Uuid::new_v4().simple().to_string();
        self.cache
            .set(&cache_key(&token), payload, ttl)
            .map_err(|e| EngineError::Cache(e.to_string()))?;

        self.notify(Notification::WithdrawalVerification {
            account_id: cmd.account_id,
            email: account.email,
            token,
            amount: pending.amount,
            net_amount: pending.net_amount,
        });
        tracing::info!(
            account_id = %cmd.account_id,
            amount = %pending.amount,
            fee = %pending.fee,
            "withdrawal awaiting verification"
        );
        Ok(WithdrawalQuote {
            amount: pending.amount,
            fee: pending.fee,
            net_amount: pending.net_amount,
            expires_at,
        })
    }

    /// Consume a verification token: re-check the available balance, place a
    /// pending hold and persist the request as `pending`.
    pub async fn verify_withdrawal(&self, token: &str) -> ResultEngine<WithdrawalRequest> {
        let token = token.trim();
        let key = cache_key(token);
        let payload = self
            .cache
            .get(&key)
            .map_err(|e| EngineError::Cache(e.to_string()))?
            .ok_or(EngineError::ExpiredOrInvalidToken)?;
        let pending: PendingWithdrawal =
            serde_json::from_str(&payload).map_err(|_| EngineError::ExpiredOrInvalidToken)?;

        let account = find_account(&self.database, pending.account_id).await?;
        ensure_enabled(&account)?;

        let request = with_tx!(self, |db_tx| {
            let request_id = Uuid::new_v4();
            let hold = self
                .place_hold_in(
                    &db_tx,
                    LedgerCmd::new(pending.account_id, pending.amount, LedgerSource::Withdraw)
                        .reference(request_id),
                )
                .await?;
            let request = WithdrawalRequest {
                id: request_id,
                account_id: pending.account_id,
                amount: pending.amount,
                fee: pending.fee,
                net_amount: pending.net_amount,
                destination: pending.destination.clone(),
                status: RequestStatus::Pending,
                hold_entry_id: hold.id,
                created_at: Utc::now(),
                decided_at: None,
            };
            let mut model = withdrawal_requests::ActiveModel::from(&request);
            model.verification_token = ActiveValue::Set(token.to_string());
            match model.insert(&db_tx).await {
                Ok(_) => Ok(request),
                Err(err) if is_unique_violation(&err) => Err(EngineError::AlreadyProcessed(
                    "verification token already used".to_string(),
                )),
                Err(err) => Err(err.into()),
            }
        })?;

        if let Err(err) = self.cache.del(&key) {
            tracing::warn!(request_id = %request.id, "failed to drop used withdrawal token: {err}");
        }
        tracing::info!(
            request_id = %request.id,
            account_id = %request.account_id,
            amount = %request.amount,
            "withdrawal verified"
        );
        self.emit(DomainEvent::WithdrawalRequested {
            request_id: request.id,
            account_id: request.account_id,
            amount: request.amount,
        });
        Ok(request)
    }

    /// Approve (settle the hold, take the money) or reject (release the
    /// hold) a pending request. A request is decided exactly once.
    pub async fn decide_withdrawal(
        &self,
        request_id: Uuid,
        decision: Decision,
    ) -> ResultEngine<WithdrawalRequest> {
        let request = with_tx!(self, |db_tx| {
            let model = withdrawal_requests::Entity::find_by_id(request_id.to_string())
                .lock_exclusive()
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound("withdrawal request not exists".to_string()))?;
            let mut request = WithdrawalRequest::try_from(model)?;
            if request.status != RequestStatus::Pending {
                return Err(EngineError::AlreadyProcessed(format!(
                    "withdrawal request {request_id} is {}",
                    request.status.as_str()
                )));
            }

            let status = decision.target_status();
            let decided_at = Utc::now();
            let res = withdrawal_requests::Entity::update_many()
                .col_expr(withdrawal_requests::Column::Status, Expr::value(status.as_str()))
                .col_expr(withdrawal_requests::Column::DecidedAt, Expr::value(decided_at))
                .filter(withdrawal_requests::Column::Id.eq(request_id.to_string()))
                .filter(withdrawal_requests::Column::Status.eq(RequestStatus::Pending.as_str()))
                .exec(&db_tx)
                .await?;
            if res.rows_affected != 1 {
                return Err(EngineError::AlreadyProcessed(format!(
                    "withdrawal request {request_id} already decided"
                )));
            }

            match decision {
                Decision::Approve => self.settle_hold_in(&db_tx, request.hold_entry_id).await?,
                Decision::Reject => self.release_hold_in(&db_tx, request.hold_entry_id).await?,
            };
            request.status = status;
            request.decided_at = Some(decided_at);
            Ok::<_, EngineError>(request)
        })?;

        tracing::info!(
            %request_id,
            account_id = %request.account_id,
            status = request.status.as_str(),
            "withdrawal decided"
        );
        self.notify(Notification::WithdrawalStatusChanged {
            account_id: request.account_id,
            request_id,
            status: request.status,
        });
        self.emit(DomainEvent::WithdrawalDecided {
            request_id,
            account_id: request.account_id,
            status: request.status,
        });
        Ok(request)
    }

    pub async fn withdrawal_request(&self, request_id: Uuid) -> ResultEngine<WithdrawalRequest> {
        let model = withdrawal_requests::Entity::find_by_id(request_id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::NotFound("withdrawal request not exists".to_string()))?;
        WithdrawalRequest::try_from(model)
    }

    /// Requests still waiting for a decision, oldest first.
    pub async fn pending_withdrawals(&self) -> ResultEngine<Vec<WithdrawalRequest>> {
        withdrawal_requests::Entity::find()
            .filter(withdrawal_requests::Column::Status.eq(RequestStatus::Pending.as_str()))
            .order_by_asc(withdrawal_requests::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(WithdrawalRequest::try_from)
            .collect()
    }
}
