//! Typed domain events and their dispatch table.
//!
//! Events are emitted after the database transaction committed. Delivery is
//! best-effort and at-most-once: a failing handler is logged and the remaining
//! handlers still run. Nothing is retried.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{MoneyCents, RequestStatus, notify::BoxError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    SubscriptionPurchased {
        subscription_id: Uuid,
        account_id: Uuid,
        plan_id: Uuid,
        price: MoneyCents,
        purchased_at: DateTime<Utc>,
    },
    DailyReturnCredited {
        subscription_id: Uuid,
        account_id: Uuid,
        credited_for: NaiveDate,
        amount: MoneyCents,
    },
    SubscriptionMatured {
        subscription_id: Uuid,
        account_id: Uuid,
        returned: MoneyCents,
    },
    WithdrawalRequested {
        request_id: Uuid,
        account_id: Uuid,
        amount: MoneyCents,
    },
    WithdrawalDecided {
        request_id: Uuid,
        account_id: Uuid,
        status: RequestStatus,
    },
    RechargeDecided {
        request_id: Uuid,
        account_id: Uuid,
        status: RequestStatus,
    },
}

/// Discriminant of [`DomainEvent`], the key of the dispatch table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    SubscriptionPurchased,
    DailyReturnCredited,
    SubscriptionMatured,
    WithdrawalRequested,
    WithdrawalDecided,
    RechargeDecided,
}

impl DomainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::SubscriptionPurchased { .. } => EventKind::SubscriptionPurchased,
            Self::DailyReturnCredited { .. } => EventKind::DailyReturnCredited,
            Self::SubscriptionMatured { .. } => EventKind::SubscriptionMatured,
            Self::WithdrawalRequested { .. } => EventKind::WithdrawalRequested,
            Self::WithdrawalDecided { .. } => EventKind::WithdrawalDecided,
            Self::RechargeDecided { .. } => EventKind::RechargeDecided,
        }
    }
}

pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &DomainEvent) -> Result<(), BoxError>;
}

#[derive(Clone, Default)]
pub struct EventBus {
    handlers: HashMap<EventKind, Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every event of `kind`.
    #[must_use]
    pub fn subscribe(mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.entry(kind).or_default().push(handler);
        self
    }

    /// Dispatch `event` to its handlers. Returns how many handlers succeeded.
    pub fn emit(&self, event: &DomainEvent) -> usize {
        let Some(handlers) = self.handlers.get(&event.kind()) else {
            return 0;
        };
        let mut delivered = 0;
        for handler in handlers {
            match handler.handle(event) {
                Ok(()) => delivered += 1,
                Err(err) => tracing::warn!(kind = ?event.kind(), "event handler failed: {err}"),
            }
        }
        delivered
    }
}
