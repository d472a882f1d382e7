//! Read-only business settings consumed by the engine.
//!
//! Settings are owned elsewhere (admin panel, config file); the engine only
//! reads them through [`SettingsProvider`], once per operation, so a change
//! takes effect on the next purchase/withdrawal/job run.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{EngineError, MoneyCents, ResultEngine};

/// Payout share of one referral level. Level 1 is the direct referrer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralLevel {
    pub level: u32,
    /// Percentage of the plan price, e.g. `10` for 10%.
    pub percentage: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralSettings {
    #[serde(default)]
    pub levels: Vec<ReferralLevel>,
}

impl ReferralSettings {
    /// Builds settings from percentages ordered by level (`[l1, l2, ...]`).
    pub fn from_percentages(percentages: impl IntoIterator<Item = Decimal>) -> Self {
        let levels = percentages
            .into_iter()
            .zip(1u32..)
            .map(|(percentage, level)| ReferralLevel { level, percentage })
            .collect();
        Self { levels }
    }

    /// How many ancestors the referral walk has to visit.
    pub fn depth(&self) -> u32 {
        self.levels.iter().map(|l| l.level).max().unwrap_or(0)
    }

    /// Configured percentage for `level`, zero when the level is not configured.
    pub fn percentage(&self, level: u32) -> Decimal {
        self.levels
            .iter()
            .find(|l| l.level == level)
            .map_or(Decimal::ZERO, |l| l.percentage)
    }

    pub fn validate(&self) -> ResultEngine<()> {
        let mut seen = Vec::with_capacity(self.levels.len());
        for level in &self.levels {
            if level.level == 0 {
                return Err(EngineError::InvalidAmount(
                    "referral levels start at 1".to_string(),
                ));
            }
            if seen.contains(&level.level) {
                return Err(EngineError::InvalidAmount(format!(
                    "referral level {} configured twice",
                    level.level
                )));
            }
            if level.percentage.is_sign_negative() || level.percentage > Decimal::ONE_HUNDRED {
                return Err(EngineError::InvalidAmount(format!(
                    "referral level {} percentage must be within 0..=100",
                    level.level
                )));
            }
            seen.push(level.level);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialSettings {
    /// Fixed fee subtracted from every withdrawal.
    pub withdrawal_fee: MoneyCents,
    pub min_withdrawal: MoneyCents,
    pub min_recharge: MoneyCents,
    /// Percentage of the price kept when a subscription matures.
    pub principal_tax_percent: Decimal,
    /// How long an unverified withdrawal request stays in the cache.
    pub withdrawal_ttl_secs: u64,
}

impl Default for FinancialSettings {
    fn default() -> Self {
        Self {
            withdrawal_fee: MoneyCents::ZERO,
            min_withdrawal: MoneyCents::ZERO,
            min_recharge: MoneyCents::ZERO,
            principal_tax_percent: Decimal::ZERO,
            withdrawal_ttl_secs: 15 * 60,
        }
    }
}

impl FinancialSettings {
    pub fn validate(&self) -> ResultEngine<()> {
        if self.withdrawal_fee.is_negative()
            || self.min_withdrawal.is_negative()
            || self.min_recharge.is_negative()
        {
            return Err(EngineError::InvalidAmount(
                "fees and minimums must be >= 0".to_string(),
            ));
        }
        if self.principal_tax_percent.is_sign_negative()
            || self.principal_tax_percent > Decimal::ONE_HUNDRED
        {
            return Err(EngineError::InvalidAmount(
                "principal tax must be within 0..=100".to_string(),
            ));
        }
        Ok(())
    }
}

/// Source of the settings above.
pub trait SettingsProvider: Send + Sync {
    fn referral_settings(&self) -> ReferralSettings;
    fn financial_settings(&self) -> FinancialSettings;
}

/// Settings fixed at startup (e.g. deserialized from `settings.toml`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticSettings {
    #[serde(default)]
    pub referral: ReferralSettings,
    #[serde(default)]
    pub financial: FinancialSettings,
}

impl StaticSettings {
    pub fn new(referral: ReferralSettings, financial: FinancialSettings) -> ResultEngine<Self> {
        referral.validate()?;
        financial.validate()?;
        Ok(Self {
            referral,
            financial,
        })
    }
}

impl SettingsProvider for StaticSettings {
    fn referral_settings(&self) -> ReferralSettings {
        self.referral.clone()
    }

    fn financial_settings(&self) -> FinancialSettings {
        self.financial.clone()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn depth_and_percentages() {
        let settings = ReferralSettings::from_percentages([dec!(10), dec!(5), dec!(2)]);
        assert_eq!(settings.depth(), 3);
        assert_eq!(settings.percentage(1), dec!(10));
        assert_eq!(settings.percentage(3), dec!(2));
        assert_eq!(settings.percentage(4), Decimal::ZERO);
    }

    #[test]
    fn depth_follows_highest_level_not_list_length() {
        let settings = ReferralSettings {
            levels: vec![ReferralLevel {
                level: 3,
                percentage: dec!(1),
            }],
        };
        assert_eq!(settings.depth(), 3);
        assert_eq!(settings.percentage(1), Decimal::ZERO);
    }

    #[test]
    fn validate_rejects_bad_levels() {
        let duplicated = ReferralSettings {
            levels: vec![
                ReferralLevel {
                    level: 1,
                    percentage: dec!(10),
                },
                ReferralLevel {
                    level: 1,
                    percentage: dec!(5),
                },
            ],
        };
        assert!(duplicated.validate().is_err());
        assert!(
            ReferralSettings::from_percentages([dec!(101)])
                .validate()
                .is_err()
        );
        assert!(
            ReferralSettings::from_percentages([dec!(-1)])
                .validate()
                .is_err()
        );
    }

    #[test]
    fn static_settings_validate_financials() {
        let financial = FinancialSettings {
            principal_tax_percent: dec!(120),
            ..FinancialSettings::default()
        };
        assert!(StaticSettings::new(ReferralSettings::default(), financial).is_err());
    }
}
