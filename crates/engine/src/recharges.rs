//! Recharge requests: money sent from outside, approved by an admin.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, RequestStatus, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RechargeRequest {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: MoneyCents,
    /// Transaction id of the external payment. Unique across all requests.
    pub external_txn_id: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "recharge_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub account_id: String,
    pub amount_minor: i64,
    #[sea_orm(unique)]
    pub external_txn_id: String,
    pub status: String,
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

impl From<&RechargeRequest> for ActiveModel {
    fn from(value: &RechargeRequest) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            account_id: ActiveValue::Set(value.account_id.to_string()),
            amount_minor: ActiveValue::Set(value.amount.cents()),
            external_txn_id: ActiveValue::Set(value.external_txn_id.clone()),
            status: ActiveValue::Set(value.status.as_str().to_string()),
            created_at: ActiveValue::Set(value.created_at),
            decided_at: ActiveValue::Set(value.decided_at),
        }
    }
}

impl TryFrom<Model> for RechargeRequest {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "recharge request")?,
            account_id: parse_uuid(&model.account_id, "account")?,
            amount: MoneyCents::new(model.amount_minor),
            external_txn_id: model.external_txn_id,
            status: RequestStatus::try_from(model.status.as_str())?,
            created_at: model.created_at,
            decided_at: model.decided_at,
        })
    }
}
