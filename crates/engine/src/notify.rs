//! Outgoing user notifications (verification and status-change emails).
//!
//! Delivery is someone else's job: the engine hands a [`Notification`] to a
//! [`Notifier`] after the ledger work is committed, and a failure is only
//! logged.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{MoneyCents, RequestStatus};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Carries the single-use token the owner must present to verify.
    WithdrawalVerification {
        account_id: Uuid,
        email: Option<String>,
        token: String,
        amount: MoneyCents,
        net_amount: MoneyCents,
    },
    WithdrawalStatusChanged {
        account_id: Uuid,
        request_id: Uuid,
        status: RequestStatus,
    },
    RechargeStatusChanged {
        account_id: Uuid,
        request_id: Uuid,
        status: RequestStatus,
    },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), BoxError>;
}

/// Writes notifications to the log. Default when no mailer is wired in.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), BoxError> {
        match notification {
            // never log the token itself
            Notification::WithdrawalVerification {
                account_id, amount, ..
            } => tracing::info!(%account_id, %amount, "withdrawal verification requested"),
            Notification::WithdrawalStatusChanged {
                account_id,
                request_id,
                status,
            } => tracing::info!(
                %account_id,
                %request_id,
                status = status.as_str(),
                "withdrawal status changed"
            ),
            Notification::RechargeStatusChanged {
                account_id,
                request_id,
                status,
            } => tracing::info!(
                %account_id,
                %request_id,
                status = status.as_str(),
                "recharge status changed"
            ),
        }
        Ok(())
    }
}
