//! Pre-aggregated daily return totals.
//!
//! Rows are keyed by `(account_id, period_type, period_key)` and maintained by
//! upsert-increment every time a daily return log is written. The only other
//! writer is the explicit rebuild, which recomputes every row from the logs.
//!
//! Period keys:
//! - `day`: `YYYY-MM-DD`
//! - `week`: ISO week, `YYYY-Www`
//! - `month`: `YYYY-MM`

use chrono::{Datelike, NaiveDate};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Day,
    Week,
    Month,
}

impl PeriodType {
    pub const ALL: [PeriodType; 3] = [PeriodType::Day, PeriodType::Week, PeriodType::Month];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// The key of the period `date` falls into.
    pub fn key_for(self, date: NaiveDate) -> String {
        match self {
            Self::Day => date.format("%Y-%m-%d").to_string(),
            Self::Week => {
                let week = date.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Self::Month => date.format("%Y-%m").to_string(),
        }
    }
}

impl TryFrom<&str> for PeriodType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(EngineError::InvalidAmount(format!(
                "invalid period type: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReturnSummary {
    pub account_id: Uuid,
    pub period_type: PeriodType,
    pub period_key: String,
    pub total: MoneyCents,
    pub entry_count: u64,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "daily_return_summaries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub account_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub period_type: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub period_key: String,
    pub total_minor: i64,
    pub entry_count: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&DailyReturnSummary> for ActiveModel {
    fn from(value: &DailyReturnSummary) -> Self {
        Self {
            account_id: ActiveValue::Set(value.account_id.to_string()),
            period_type: ActiveValue::Set(value.period_type.as_str().to_string()),
            period_key: ActiveValue::Set(value.period_key.clone()),
            total_minor: ActiveValue::Set(value.total.cents()),
            entry_count: ActiveValue::Set(i64::try_from(value.entry_count).unwrap_or(i64::MAX)),
        }
    }
}

impl TryFrom<Model> for DailyReturnSummary {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            account_id: parse_uuid(&model.account_id, "account")?,
            period_type: PeriodType::try_from(model.period_type.as_str())?,
            period_key: model.period_key,
            total: MoneyCents::new(model.total_minor),
            entry_count: u64::try_from(model.entry_count).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn period_keys() {
        let d = date(2026, 10, 17);
        assert_eq!(PeriodType::Day.key_for(d), "2026-10-17");
        assert_eq!(PeriodType::Week.key_for(d), "2026-W42");
        assert_eq!(PeriodType::Month.key_for(d), "2026-10");
    }

    #[test]
    fn iso_week_uses_iso_year_at_boundaries() {
        // 2027-01-01 is a Friday and belongs to ISO week 53 of 2026.
        assert_eq!(PeriodType::Week.key_for(date(2027, 1, 1)), "2026-W53");
        // 2024-12-30 is a Monday and belongs to ISO week 1 of 2025.
        assert_eq!(PeriodType::Week.key_for(date(2024, 12, 30)), "2025-W01");
    }
}
