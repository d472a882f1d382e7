use chrono::Utc;
use sea_orm::{QueryFilter, QueryOrder, QuerySelect, TransactionTrait, prelude::*, sea_query::Expr};
use uuid::Uuid;

use crate::{
    Decision, DomainEvent, EngineError, LedgerCmd, LedgerSource, MoneyCents, Notification,
    RechargeRequest, RequestStatus, ResultEngine,
    recharges as recharge_requests,
    util::{ensure_positive, is_unique_violation},
};

use super::{
    Engine,
    accounts::{ensure_enabled, find_account},
    normalize_required_name, with_tx,
};

impl Engine {
    /// Record a top-up the user claims to have paid, identified by the
    /// payment provider's transaction id. No money moves until approval.
    pub async fn request_recharge(
        &self,
        account_id: Uuid,
        amount: MoneyCents,
        external_txn_id: &str,
    ) -> ResultEngine<RechargeRequest> {
        ensure_positive(amount, "recharge amount")?;
        let external_txn_id = normalize_required_name(external_txn_id, "external transaction id")?;
        let minimum = self.settings.financial_settings().min_recharge;
        if amount < minimum {
            return Err(EngineError::BelowMinimum {
                minimum,
                requested: amount,
            });
        }
        let account = find_account(&self.database, account_id).await?;
        ensure_enabled(&account)?;

        let request = RechargeRequest {
            id: Uuid::new_v4(),
            account_id,
            amount,
            external_txn_id,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
        };
        match recharge_requests::ActiveModel::from(&request)
            .insert(&self.database)
            .await
        {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(EngineError::ConflictingReference(format!(
                    "transaction {} already submitted",
                    request.external_txn_id
                )));
            }
            Err(err) => return Err(err.into()),
        }

        tracing::info!(
            request_id = %request.id,
            %account_id,
            %amount,
            "recharge requested"
        );
        Ok(request)
    }

    /// Approve (credit the account) or reject a pending recharge. A request is
    /// decided exactly once.
    pub async fn decide_recharge(
        &self,
        request_id: Uuid,
        decision: Decision,
    ) -> ResultEngine<RechargeRequest> {
        let request = with_tx!(self, |db_tx| {
            let model = recharge_requests::Entity::find_by_id(request_id.to_string())
                .lock_exclusive()
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::NotFound("recharge request not exists".to_string()))?;
            let mut request = RechargeRequest::try_from(model)?;
            if request.status != RequestStatus::Pending {
                return Err(EngineError::AlreadyProcessed(format!(
                    "recharge request {request_id} is {}",
                    request.status.as_str()
                )));
            }

            let status = decision.target_status();
            let decided_at = Utc::now();
            let res = recharge_requests::Entity::update_many()
                .col_expr(recharge_requests::Column::Status, Expr::value(status.as_str()))
                .col_expr(recharge_requests::Column::DecidedAt, Expr::value(decided_at))
                .filter(recharge_requests::Column::Id.eq(request_id.to_string()))
                .filter(recharge_requests::Column::Status.eq(RequestStatus::Pending.as_str()))
                .exec(&db_tx)
                .await?;
            if res.rows_affected != 1 {
                return Err(EngineError::AlreadyProcessed(format!(
                    "recharge request {request_id} already decided"
                )));
            }

            if decision == Decision::Approve {
                self.credit_in(
                    &db_tx,
                    LedgerCmd::new(request.account_id, request.amount, LedgerSource::Recharge)
                        .reference(request_id),
                )
                .await?;
            }
            request.status = status;
            request.decided_at = Some(decided_at);
            Ok::<_, EngineError>(request)
        })?;

        tracing::info!(
            %request_id,
            account_id = %request.account_id,
            status = request.status.as_str(),
            "recharge decided"
        );
        self.notify(Notification::RechargeStatusChanged {
            account_id: request.account_id,
            request_id,
            status: request.status,
        });
        self.emit(DomainEvent::RechargeDecided {
            request_id,
            account_id: request.account_id,
            status: request.status,
        });
        Ok(request)
    }

    pub async fn recharge_request(&self, request_id: Uuid) -> ResultEngine<RechargeRequest> {
        let model = recharge_requests::Entity::find_by_id(request_id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::NotFound("recharge request not exists".to_string()))?;
        RechargeRequest::try_from(model)
    }

    /// Requests still waiting for a decision, oldest first.
    pub async fn pending_recharges(&self) -> ResultEngine<Vec<RechargeRequest>> {
        recharge_requests::Entity::find()
            .filter(recharge_requests::Column::Status.eq(RequestStatus::Pending.as_str()))
            .order_by_asc(recharge_requests::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(RechargeRequest::try_from)
            .collect()
    }
}
