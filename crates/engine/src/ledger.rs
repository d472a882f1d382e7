//! Ledger primitives.
//!
//! A [`LedgerEntry`] is an immutable record of one balance movement. Entries
//! are the source of truth; `accounts.balance` is a cache that must always
//! equal the sum of the account's `SUCCESS` entries (credits minus debits).
//!
//! `PENDING` entries never move a balance. They are only used as withdrawal
//! holds and are settled to `SUCCESS` or `FAILED` exactly once.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, ResultEngine, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }
}

impl TryFrom<&str> for Direction {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            other => Err(EngineError::InvalidAmount(format!(
                "invalid ledger direction: {other}"
            ))),
        }
    }
}

/// What caused a balance movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerSource {
    Recharge,
    Purchase,
    Withdraw,
    ReferralBonus,
    DailyReturn,
    PrincipalReturn,
    Reward,
}

impl LedgerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recharge => "recharge",
            Self::Purchase => "purchase",
            Self::Withdraw => "withdraw",
            Self::ReferralBonus => "referral_bonus",
            Self::DailyReturn => "daily_return",
            Self::PrincipalReturn => "principal_return",
            Self::Reward => "reward",
        }
    }
}

impl TryFrom<&str> for LedgerSource {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "recharge" => Ok(Self::Recharge),
            "purchase" => Ok(Self::Purchase),
            "withdraw" => Ok(Self::Withdraw),
            "referral_bonus" => Ok(Self::ReferralBonus),
            "daily_return" => Ok(Self::DailyReturn),
            "principal_return" => Ok(Self::PrincipalReturn),
            "reward" => Ok(Self::Reward),
            other => Err(EngineError::InvalidAmount(format!(
                "invalid ledger source: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Success,
    Failed,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl TryFrom<&str> for EntryStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(EngineError::InvalidAmount(format!(
                "invalid ledger status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub direction: Direction,
    /// Always strictly positive; the sign lives in `direction`.
    pub amount: MoneyCents,
    pub source: LedgerSource,
    pub reference_id: Option<Uuid>,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the entry became `SUCCESS`; account history is ordered by it.
    pub posted_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    pub fn new(
        account_id: Uuid,
        direction: Direction,
        amount: MoneyCents,
        source: LedgerSource,
        reference_id: Option<Uuid>,
        status: EntryStatus,
    ) -> ResultEngine<Self> {
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(
                "amount must be > 0".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            account_id,
            direction,
            amount,
            source,
            reference_id,
            status,
            created_at: now,
            updated_at: now,
            posted_at: (status == EntryStatus::Success).then_some(now),
        })
    }

    /// Signed effect on the balance once the entry is `SUCCESS`.
    pub fn signed_amount(&self) -> MoneyCents {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "ledger_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub account_id: String,
    pub direction: String,
    pub amount_minor: i64,
    pub source: String,
    pub reference_id: Option<String>,
    pub status: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub posted_at: Option<DateTimeUtc>,
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

impl From<&LedgerEntry> for ActiveModel {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            id: ActiveValue::Set(entry.id.to_string()),
            account_id: ActiveValue::Set(entry.account_id.to_string()),
            direction: ActiveValue::Set(entry.direction.as_str().to_string()),
            amount_minor: ActiveValue::Set(entry.amount.cents()),
            source: ActiveValue::Set(entry.source.as_str().to_string()),
            reference_id: ActiveValue::Set(entry.reference_id.map(|id| id.to_string())),
            status: ActiveValue::Set(entry.status.as_str().to_string()),
            created_at: ActiveValue::Set(entry.created_at),
            updated_at: ActiveValue::Set(entry.updated_at),
            posted_at: ActiveValue::Set(entry.posted_at),
        }
    }
}

impl TryFrom<Model> for LedgerEntry {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "ledger entry")?,
            account_id: parse_uuid(&model.account_id, "account")?,
            direction: Direction::try_from(model.direction.as_str())?,
            amount: MoneyCents::new(model.amount_minor),
            source: LedgerSource::try_from(model.source.as_str())?,
            reference_id: model
                .reference_id
                .as_deref()
                .map(|id| parse_uuid(id, "reference"))
                .transpose()?,
            status: EntryStatus::try_from(model.status.as_str())?,
            created_at: model.created_at,
            updated_at: model.updated_at,
            posted_at: model.posted_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_amounts() {
        let account_id = Uuid::new_v4();
        for cents in [0, -1] {
            let err = LedgerEntry::new(
                account_id,
                Direction::Credit,
                MoneyCents::new(cents),
                LedgerSource::Recharge,
                None,
                EntryStatus::Success,
            )
            .unwrap_err();
            assert_eq!(
                err,
                EngineError::InvalidAmount("amount must be > 0".to_string())
            );
        }
    }

    #[test]
    fn only_success_entries_are_posted() {
        let account_id = Uuid::new_v4();
        let hold = LedgerEntry::new(
            account_id,
            Direction::Debit,
            MoneyCents::new(250),
            LedgerSource::Withdraw,
            None,
            EntryStatus::Pending,
        )
        .unwrap();
        assert_eq!(hold.posted_at, None);

        let credit = LedgerEntry::new(
            account_id,
            Direction::Credit,
            MoneyCents::new(250),
            LedgerSource::Recharge,
            None,
            EntryStatus::Success,
        )
        .unwrap();
        assert_eq!(credit.posted_at, Some(credit.created_at));
    }

    #[test]
    fn signed_amount_follows_direction() {
        let account_id = Uuid::new_v4();
        let debit = LedgerEntry::new(
            account_id,
            Direction::Debit,
            MoneyCents::new(250),
            LedgerSource::Purchase,
            None,
            EntryStatus::Success,
        )
        .unwrap();
        assert_eq!(debit.signed_amount(), MoneyCents::new(-250));
    }

    #[test]
    fn source_round_trips_through_storage_string() {
        for source in [
            LedgerSource::Recharge,
            LedgerSource::Purchase,
            LedgerSource::Withdraw,
            LedgerSource::ReferralBonus,
            LedgerSource::DailyReturn,
            LedgerSource::PrincipalReturn,
            LedgerSource::Reward,
        ] {
            assert_eq!(LedgerSource::try_from(source.as_str()).unwrap(), source);
        }
        assert!(LedgerSource::try_from("bonus").is_err());
    }
}
