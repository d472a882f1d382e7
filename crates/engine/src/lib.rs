//! Wallet ledger and financial settlement engine.
//!
//! Every balance change is written as an immutable [`LedgerEntry`] in the
//! same database transaction that updates the cached `accounts.balance`.
//! On top of the `credit`/`debit` primitives the [`Engine`] runs the
//! subscription purchase workflow, multi-level referral payouts, the daily
//! return accrual and principal return jobs, and the two-phase withdrawal
//! and admin-approved recharge flows.

pub use accounts::Account;
pub use cache::{EphemeralCache, MemoryCache};
pub use commands::{LedgerCmd, NewAccountCmd, PurchaseCmd, WithdrawalCmd};
pub use daily_return_logs::DailyReturnLog;
pub use daily_return_summaries::{DailyReturnSummary, PeriodType};
pub use error::EngineError;
pub use events::{DomainEvent, EventBus, EventHandler, EventKind};
pub use ledger::{Direction, EntryStatus, LedgerEntry, LedgerSource};
pub use money::MoneyCents;
pub use notify::{BoxError, Notification, Notifier, TracingNotifier};
pub use ops::{
    AccrualOutcome, AccrualReport, BalanceReconciliation, Engine, EngineBuilder, ExpiryReport,
    LedgerFilter,
};
pub use plans::Plan;
pub use recharges::RechargeRequest;
pub use referral::{Ancestor, ReferralPayout};
pub use settings::{
    FinancialSettings, ReferralLevel, ReferralSettings, SettingsProvider, StaticSettings,
};
pub use subscriptions::Subscription;
pub use withdrawals::{
    Decision, PendingWithdrawal, RequestStatus, WithdrawalQuote, WithdrawalRequest,
};

mod accounts;
mod cache;
mod commands;
mod daily_return_logs;
mod daily_return_summaries;
mod error;
mod events;
mod ledger;
mod money;
mod notify;
mod ops;
mod plans;
mod recharges;
mod referral;
mod settings;
mod subscriptions;
mod util;
mod withdrawals;

type ResultEngine<T> = Result<T, EngineError>;
