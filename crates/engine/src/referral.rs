//! Multi-level referral payouts.
//!
//! The referral graph is single-parent (`accounts.referred_by`) but it is
//! user-editable data, so the walk never assumes it is acyclic: it carries a
//! visited set and is bounded by the configured depth.
//!
//! The database side of the walk lives in `ops::referrals`; this module holds
//! the bookkeeping and the arithmetic so both can be tested in isolation.

use std::collections::HashSet;

use uuid::Uuid;

use crate::{MoneyCents, ReferralSettings};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ancestor {
    pub account_id: Uuid,
    /// 1 for the direct referrer, 2 for the referrer's referrer, ...
    pub level: u32,
    pub disabled: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferralPayout {
    pub account_id: Uuid,
    pub level: u32,
    pub amount: MoneyCents,
}

/// Why a walk stopped early.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkStop {
    DepthReached,
    Cycle(Uuid),
}

/// Accumulates the ancestor chain of a buyer, one hop at a time.
#[derive(Debug)]
pub struct AncestorWalk {
    depth: u32,
    visited: HashSet<Uuid>,
    chain: Vec<Ancestor>,
}

impl AncestorWalk {
    pub fn new(buyer_id: Uuid, depth: u32) -> Self {
        Self {
            depth,
            visited: HashSet::from([buyer_id]),
            chain: Vec::new(),
        }
    }

    /// Level the next pushed ancestor would get, `None` once the depth is
    /// reached.
    pub fn next_level(&self) -> Option<u32> {
        let next = u32::try_from(self.chain.len()).ok()?.checked_add(1)?;
        (next <= self.depth).then_some(next)
    }

    /// Record the next ancestor. Fails if the walk is already deep enough or
    /// if `account_id` was seen before (a cycle).
    pub fn push(&mut self, account_id: Uuid, disabled: bool) -> Result<u32, WalkStop> {
        let level = self.next_level().ok_or(WalkStop::DepthReached)?;
        if !self.visited.insert(account_id) {
            return Err(WalkStop::Cycle(account_id));
        }
        self.chain.push(Ancestor {
            account_id,
            level,
            disabled,
        });
        Ok(level)
    }

    pub fn into_chain(self) -> Vec<Ancestor> {
        self.chain
    }
}

/// Per-level rewards for a purchase of `price`.
///
/// Levels without a positive percentage, disabled ancestors and rewards that
/// truncate to zero produce no payout.
pub fn compute_payouts(
    chain: &[Ancestor],
    price: MoneyCents,
    settings: &ReferralSettings,
) -> Vec<ReferralPayout> {
    chain
        .iter()
        .filter(|ancestor| !ancestor.disabled)
        .filter_map(|ancestor| {
            let percentage = settings.percentage(ancestor.level);
            if percentage <= rust_decimal::Decimal::ZERO {
                return None;
            }
            let amount = price.percent_of(percentage)?;
            amount.is_positive().then_some(ReferralPayout {
                account_id: ancestor.account_id,
                level: ancestor.level,
                amount,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn chain_of(ids: &[Uuid]) -> Vec<Ancestor> {
        ids.iter()
            .zip(1u32..)
            .map(|(id, level)| Ancestor {
                account_id: *id,
                level,
                disabled: false,
            })
            .collect()
    }

    #[test]
    fn three_levels_of_one_thousand() {
        let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let settings = ReferralSettings::from_percentages([dec!(10), dec!(5), dec!(2)]);

        let payouts = compute_payouts(&chain_of(&ids), MoneyCents::new(100_000), &settings);

        let amounts: Vec<i64> = payouts.iter().map(|p| p.amount.cents()).collect();
        assert_eq!(amounts, vec![10_000, 5_000, 2_000]);
        assert_eq!(payouts[2].account_id, ids[2]);
    }

    #[test]
    fn zero_percentage_and_disabled_ancestors_are_skipped() {
        let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let mut chain = chain_of(&ids);
        chain[2].disabled = true;
        let settings = ReferralSettings::from_percentages([dec!(0), dec!(5), dec!(2)]);

        let payouts = compute_payouts(&chain, MoneyCents::new(100_000), &settings);

        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].level, 2);
    }

    #[test]
    fn rewards_truncating_to_zero_are_dropped() {
        let chain = chain_of(&[Uuid::new_v4()]);
        let settings = ReferralSettings::from_percentages([dec!(0.5)]);
        assert!(compute_payouts(&chain, MoneyCents::new(99), &settings).is_empty());
    }

    #[test]
    fn walk_stops_at_depth() {
        let mut walk = AncestorWalk::new(Uuid::new_v4(), 2);
        assert_eq!(walk.push(Uuid::new_v4(), false), Ok(1));
        assert_eq!(walk.push(Uuid::new_v4(), false), Ok(2));
        assert_eq!(walk.next_level(), None);
        assert_eq!(
            walk.push(Uuid::new_v4(), false),
            Err(WalkStop::DepthReached)
        );
        assert_eq!(walk.into_chain().len(), 2);
    }

    #[test]
    fn walk_detects_cycle_back_to_buyer() {
        let buyer = Uuid::new_v4();
        let referrer = Uuid::new_v4();
        let mut walk = AncestorWalk::new(buyer, 5);
        walk.push(referrer, false).unwrap();
        assert_eq!(walk.push(buyer, false), Err(WalkStop::Cycle(buyer)));
        assert_eq!(walk.into_chain().len(), 1);
    }

    #[test]
    fn zero_depth_walk_is_empty() {
        let walk = AncestorWalk::new(Uuid::new_v4(), 0);
        assert_eq!(walk.next_level(), None);
    }
}
