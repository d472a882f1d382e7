//! Withdrawal requests.
//!
//! A row only exists once the owner verified the request by email; the
//! unverified request lives in the ephemeral cache as a [`PendingWithdrawal`].
//! `status` moves `pending -> approved` or `pending -> rejected` exactly once.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl TryFrom<&str> for RequestStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(EngineError::InvalidAmount(format!(
                "invalid request status: {other}"
            ))),
        }
    }
}

/// Admin decision on a pending request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn target_status(self) -> RequestStatus {
        match self {
            Self::Approve => RequestStatus::Approved,
            Self::Reject => RequestStatus::Rejected,
        }
    }
}

/// The cached, not yet verified, request payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    pub account_id: Uuid,
    pub amount: MoneyCents,
    pub fee: MoneyCents,
    pub net_amount: MoneyCents,
    pub destination: String,
    pub requested_at: DateTime<Utc>,
}

/// What the requester gets back before verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalQuote {
    pub amount: MoneyCents,
    pub fee: MoneyCents,
    pub net_amount: MoneyCents,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: MoneyCents,
    pub fee: MoneyCents,
    pub net_amount: MoneyCents,
    pub destination: String,
    pub status: RequestStatus,
    /// The pending ledger hold earmarking `amount` until the decision.
    pub hold_entry_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "withdrawal_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub account_id: String,
    pub amount_minor: i64,
    pub fee_minor: i64,
    pub net_amount_minor: i64,
    pub destination: String,
    pub status: String,
    pub hold_entry_id: String,
    /// Set once from the consumed verification token; unique.
    #[sea_orm(unique)]
    pub verification_token: String,
    pub created_at: DateTimeUtc,
    pub decided_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::AccountId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Accounts,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Accounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&WithdrawalRequest> for ActiveModel {
    fn from(value: &WithdrawalRequest) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            account_id: ActiveValue::Set(value.account_id.to_string()),
            amount_minor: ActiveValue::Set(value.amount.cents()),
            fee_minor: ActiveValue::Set(value.fee.cents()),
            net_amount_minor: ActiveValue::Set(value.net_amount.cents()),
            destination: ActiveValue::Set(value.destination.clone()),
            status: ActiveValue::Set(value.status.as_str().to_string()),
            hold_entry_id: ActiveValue::Set(value.hold_entry_id.to_string()),
            verification_token: ActiveValue::NotSet,
            created_at: ActiveValue::Set(value.created_at),
            decided_at: ActiveValue::Set(value.decided_at),
        }
    }
}

impl TryFrom<Model> for WithdrawalRequest {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "withdrawal request")?,
            account_id: parse_uuid(&model.account_id, "account")?,
            amount: MoneyCents::new(model.amount_minor),
            fee: MoneyCents::new(model.fee_minor),
            net_amount: MoneyCents::new(model.net_amount_minor),
            destination: model.destination,
            status: RequestStatus::try_from(model.status.as_str())?,
            hold_entry_id: parse_uuid(&model.hold_entry_id, "ledger entry")?,
            created_at: model.created_at,
            decided_at: model.decided_at,
        })
    }
}
