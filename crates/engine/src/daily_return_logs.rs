//! One row per subscription per credited day.
//!
//! The unique `(subscription_id, credited_for)` index is the idempotency
//! guard of the accrual job: a rerun for the same date cannot credit twice.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReturnLog {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub account_id: Uuid,
    pub credited_for: NaiveDate,
    pub amount: MoneyCents,
    pub ledger_entry_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "daily_return_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub subscription_id: String,
    pub account_id: String,
    pub credited_for: Date,
    pub amount_minor: i64,
    pub ledger_entry_id: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::subscriptions::Entity",
        from = "Column::SubscriptionId",
        to = "super::subscriptions::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Subscriptions,
}

impl Related<super::subscriptions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscriptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&DailyReturnLog> for ActiveModel {
    fn from(log: &DailyReturnLog) -> Self {
        Self {
            id: ActiveValue::Set(log.id.to_string()),
            subscription_id: ActiveValue::Set(log.subscription_id.to_string()),
            account_id: ActiveValue::Set(log.account_id.to_string()),
            credited_for: ActiveValue::Set(log.credited_for),
            amount_minor: ActiveValue::Set(log.amount.cents()),
            ledger_entry_id: ActiveValue::Set(log.ledger_entry_id.to_string()),
            created_at: ActiveValue::Set(log.created_at),
        }
    }
}

impl TryFrom<Model> for DailyReturnLog {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "daily return log")?,
            subscription_id: parse_uuid(&model.subscription_id, "subscription")?,
            account_id: parse_uuid(&model.account_id, "account")?,
            credited_for: model.credited_for,
            amount: MoneyCents::new(model.amount_minor),
            ledger_entry_id: parse_uuid(&model.ledger_entry_id, "ledger entry")?,
            created_at: model.created_at,
        })
    }
}
