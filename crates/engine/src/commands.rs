//! Command structs for engine operations.
//!
//! These types group parameters for write operations (credit/debit,
//! purchase, withdrawal, account creation), keeping call sites readable and
//! avoiding long argument lists.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{LedgerSource, MoneyCents};

/// One balance movement: used by `credit`, `debit` and `batch_credit`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerCmd {
    pub account_id: Uuid,
    pub amount: MoneyCents,
    pub source: LedgerSource,
    /// The entity that caused the movement (subscription, request, ...).
    pub reference_id: Option<Uuid>,
}

impl LedgerCmd {
    #[must_use]
    pub fn new(account_id: Uuid, amount: MoneyCents, source: LedgerSource) -> Self {
        Self {
            account_id,
            amount,
            source,
            reference_id: None,
        }
    }

    #[must_use]
    pub fn reference(mut self, reference_id: Uuid) -> Self {
        self.reference_id = Some(reference_id);
        self
    }
}

/// Buy a subscription to a plan.
#[derive(Clone, Debug)]
pub struct PurchaseCmd {
    pub account_id: Uuid,
    pub plan_id: Uuid,
    pub purchased_at: DateTime<Utc>,
}

impl PurchaseCmd {
    #[must_use]
    pub fn new(account_id: Uuid, plan_id: Uuid, purchased_at: DateTime<Utc>) -> Self {
        Self {
            account_id,
            plan_id,
            purchased_at,
        }
    }
}

/// First phase of a withdrawal.
#[derive(Clone, Debug)]
pub struct WithdrawalCmd {
    pub account_id: Uuid,
    pub amount: MoneyCents,
    pub destination: String,
    pub requested_at: DateTime<Utc>,
}

impl WithdrawalCmd {
    #[must_use]
    pub fn new(
        account_id: Uuid,
        amount: MoneyCents,
        destination: impl Into<String>,
        requested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id,
            amount,
            destination: destination.into(),
            requested_at,
        }
    }
}

/// Register a new account.
#[derive(Clone, Debug)]
pub struct NewAccountCmd {
    pub username: String,
    pub email: Option<String>,
    pub referred_by: Option<Uuid>,
}

impl NewAccountCmd {
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: None,
            referred_by: None,
        }
    }

    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn referred_by(mut self, referrer_id: Uuid) -> Self {
        self.referred_by = Some(referrer_id);
        self
    }
}
