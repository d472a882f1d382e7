//! Paid subscription plans. Read-only to the ledger core.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, ResultEngine, util::parse_uuid};

/// Longest plan a subscription can run for (100 years).
pub const MAX_VALIDITY_DAYS: u32 = 36_500;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub price: MoneyCents,
    pub validity_days: u32,
    /// Amount credited once per day while a subscription is active.
    pub daily_return: MoneyCents,
    pub active: bool,
}

impl Plan {
    pub fn new(
        name: String,
        price: MoneyCents,
        validity_days: u32,
        daily_return: MoneyCents,
    ) -> ResultEngine<Self> {
        if !price.is_positive() {
            return Err(EngineError::InvalidAmount(
                "plan price must be > 0".to_string(),
            ));
        }
        if validity_days == 0 {
            return Err(EngineError::InvalidAmount(
                "plan validity must be at least one day".to_string(),
            ));
        }
        if validity_days > MAX_VALIDITY_DAYS {
            return Err(EngineError::InvalidAmount(format!(
                "plan validity must be at most {MAX_VALIDITY_DAYS} days"
            )));
        }
        if daily_return.is_negative() {
            return Err(EngineError::InvalidAmount(
                "plan daily return must be >= 0".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            price,
            validity_days,
            daily_return,
            active: true,
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "plans")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    pub price_minor: i64,
    pub validity_days: i32,
    pub daily_return_minor: i64,
    pub active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::subscriptions::Entity")]
    Subscriptions,
}

impl Related<super::subscriptions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscriptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&Plan> for ActiveModel {
    type Error = EngineError;

    fn try_from(plan: &Plan) -> Result<Self, Self::Error> {
        let validity_days = i32::try_from(plan.validity_days).map_err(|_| {
            EngineError::InvalidAmount(format!("invalid plan validity: {}", plan.validity_days))
        })?;
        Ok(Self {
            id: ActiveValue::Set(plan.id.to_string()),
            name: ActiveValue::Set(plan.name.clone()),
            price_minor: ActiveValue::Set(plan.price.cents()),
            validity_days: ActiveValue::Set(validity_days),
            daily_return_minor: ActiveValue::Set(plan.daily_return.cents()),
            active: ActiveValue::Set(plan.active),
        })
    }
}

impl TryFrom<Model> for Plan {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "plan")?,
            name: model.name,
            price: MoneyCents::new(model.price_minor),
            validity_days: u32::try_from(model.validity_days).map_err(|_| {
                EngineError::InvalidAmount(format!(
                    "invalid plan validity: {}",
                    model.validity_days
                ))
            })?,
            daily_return: MoneyCents::new(model.daily_return_minor),
            active: model.active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_plans() {
        assert!(Plan::new("Free".to_string(), MoneyCents::ZERO, 30, MoneyCents::ZERO).is_err());
        assert!(Plan::new("Flash".to_string(), MoneyCents::new(100), 0, MoneyCents::ZERO).is_err());
        assert!(
            Plan::new(
                "Odd".to_string(),
                MoneyCents::new(100),
                30,
                MoneyCents::new(-1)
            )
            .is_err()
        );
    }

    #[test]
    fn validity_is_bounded() {
        let longest = Plan::new(
            "Century".to_string(),
            MoneyCents::new(100),
            MAX_VALIDITY_DAYS,
            MoneyCents::ZERO,
        )
        .unwrap();
        assert!(matches!(
            ActiveModel::try_from(&longest).unwrap().validity_days,
            ActiveValue::Set(36_500)
        ));

        let err = Plan::new(
            "Forever".to_string(),
            MoneyCents::new(100),
            200_000_000,
            MoneyCents::ZERO,
        )
        .unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidAmount("plan validity must be at most 36500 days".to_string())
        );
    }

    #[test]
    fn new_plan_is_active() {
        let plan = Plan::new(
            "Gold".to_string(),
            MoneyCents::new(100_000),
            30,
            MoneyCents::new(500),
        )
        .unwrap();
        assert!(plan.active);
    }
}
