//! Subscriptions bought against a [`Plan`](crate::Plan).
//!
//! Lifecycle: created active at purchase, deactivated once by the expiry job
//! when `end_at < now`, never reactivated.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, Plan, ResultEngine, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub account_id: Uuid,
    pub plan_id: Uuid,
    /// Price paid at purchase time; the principal return is computed from it.
    pub price: MoneyCents,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub active: bool,
}

impl Subscription {
    pub fn new(account_id: Uuid, plan: &Plan, start_at: DateTime<Utc>) -> ResultEngine<Self> {
        let end_at = start_at
            .checked_add_signed(Duration::days(i64::from(plan.validity_days)))
            .ok_or_else(|| {
                EngineError::InvalidAmount(format!(
                    "plan validity of {} days ends out of range",
                    plan.validity_days
                ))
            })?;
        Ok(Self {
            id: Uuid::new_v4(),
            account_id,
            plan_id: plan.id,
            price: plan.price,
            start_at,
            end_at,
            active: true,
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub account_id: String,
    pub plan_id: String,
    pub price_minor: i64,
    pub start_at: DateTimeUtc,
    pub end_at: DateTimeUtc,
    pub active: bool,
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
    #[sea_orm(
        belongs_to = "super::plans::Entity",
        from = "Column::PlanId",
        to = "super::plans::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Plans,
}

impl Related<super::accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Accounts.def()
    }
}

impl Related<super::plans::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Plans.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Subscription> for ActiveModel {
    fn from(value: &Subscription) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            account_id: ActiveValue::Set(value.account_id.to_string()),
            plan_id: ActiveValue::Set(value.plan_id.to_string()),
            price_minor: ActiveValue::Set(value.price.cents()),
            start_at: ActiveValue::Set(value.start_at),
            end_at: ActiveValue::Set(value.end_at),
            active: ActiveValue::Set(value.active),
        }
    }
}

impl TryFrom<Model> for Subscription {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "subscription")?,
            account_id: parse_uuid(&model.account_id, "account")?,
            plan_id: parse_uuid(&model.plan_id, "plan")?,
            price: MoneyCents::new(model.price_minor),
            start_at: model.start_at,
            end_at: model.end_at,
            active: model.active,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn end_is_start_plus_validity() {
        let plan = Plan::new(
            "Silver".to_string(),
            MoneyCents::new(50_000),
            30,
            MoneyCents::new(100),
        )
        .unwrap();
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let sub = Subscription::new(Uuid::new_v4(), &plan, start).unwrap();

        assert_eq!(sub.end_at, Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap());
        assert_eq!(sub.price, plan.price);
        assert!(sub.active);
    }

    #[test]
    fn end_past_the_calendar_is_an_error() {
        let plan = Plan::new(
            "Silver".to_string(),
            MoneyCents::new(50_000),
            30,
            MoneyCents::new(100),
        )
        .unwrap();
        let err = Subscription::new(Uuid::new_v4(), &plan, DateTime::<Utc>::MAX_UTC).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(_)));
    }
}
