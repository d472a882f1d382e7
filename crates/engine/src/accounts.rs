//! The module contains the `Account` struct and its entity.
//!
//! An account is the balance-holding side of a user. Its `balance` column is
//! a cache of the ledger: every change goes through the balance mutator in
//! `ops::balances`, which writes the ledger entry in the same transaction.

use chrono::{DateTime, Utc};
use sea_orm::entity::{ActiveValue, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub balance: MoneyCents,
    /// Direct referrer (level 1). Single parent, so referrals form a forest.
    pub referred_by: Option<Uuid>,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(username: String, email: Option<String>, referred_by: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            balance: MoneyCents::ZERO,
            referred_by,
            disabled: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub username: String,
    pub email: Option<String>,
    pub balance: i64,
    pub referred_by: Option<String>,
    pub disabled: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::ledger::Entity")]
    LedgerEntries,
    #[sea_orm(has_many = "super::subscriptions::Entity")]
    Subscriptions,
}

impl Related<super::ledger::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LedgerEntries.def()
    }
}

impl Related<super::subscriptions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscriptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Account> for ActiveModel {
    fn from(value: &Account) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            username: ActiveValue::Set(value.username.clone()),
            email: ActiveValue::Set(value.email.clone()),
            balance: ActiveValue::Set(value.balance.cents()),
            referred_by: ActiveValue::Set(value.referred_by.map(|id| id.to_string())),
            disabled: ActiveValue::Set(value.disabled),
            created_at: ActiveValue::Set(value.created_at),
        }
    }
}

impl TryFrom<Model> for Account {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "account")?,
            username: model.username,
            email: model.email,
            balance: MoneyCents::new(model.balance),
            referred_by: model
                .referred_by
                .as_deref()
                .map(|id| parse_uuid(id, "referrer"))
                .transpose()?,
            disabled: model.disabled,
            created_at: model.created_at,
        })
    }
}
