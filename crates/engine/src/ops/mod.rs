use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    DomainEvent, EngineError, EphemeralCache, EventBus, MemoryCache, Notification, Notifier,
    ResultEngine, SettingsProvider, StaticSettings, TracingNotifier,
};

mod accounts;
mod balances;
mod daily_returns;
mod expiry;
mod ledger;
mod plans;
mod recharges;
mod referrals;
mod subscriptions;
mod withdrawals;

pub use balances::BalanceReconciliation;
pub use daily_returns::{AccrualOutcome, AccrualReport};
pub use expiry::ExpiryReport;
pub use ledger::LedgerFilter;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

pub struct Engine {
    database: DatabaseConnection,
    settings: Arc<dyn SettingsProvider>,
    notifier: Arc<dyn Notifier>,
    cache: Arc<dyn EphemeralCache>,
    events: EventBus,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Dispatch a committed event. Handler failures are logged by the bus.
    fn emit(&self, event: DomainEvent) {
        let delivered = self.events.emit(&event);
        tracing::debug!(kind = ?event.kind(), delivered, "event emitted");
    }

    /// Hand a notification to the notifier. A failure never undoes the
    /// committed ledger work.
    fn notify(&self, notification: Notification) {
        if let Err(err) = self.notifier.notify(&notification) {
            tracing::warn!("notification delivery failed: {err}");
        }
    }
}

fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidAmount(format!(
            "{label} must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    settings: Option<Arc<dyn SettingsProvider>>,
    notifier: Option<Arc<dyn Notifier>>,
    cache: Option<Arc<dyn EphemeralCache>>,
    events: EventBus,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Business settings. Defaults to [`StaticSettings::default`].
    pub fn settings(mut self, settings: Arc<dyn SettingsProvider>) -> EngineBuilder {
        self.settings = Some(settings);
        self
    }

    /// Defaults to [`TracingNotifier`].
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> EngineBuilder {
        self.notifier = Some(notifier);
        self
    }

    /// Store for unverified withdrawals. Defaults to an in-process [`MemoryCache`].
    pub fn cache(mut self, cache: Arc<dyn EphemeralCache>) -> EngineBuilder {
        self.cache = Some(cache);
        self
    }

    pub fn events(mut self, events: EventBus) -> EngineBuilder {
        self.events = events;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        let settings: Arc<dyn SettingsProvider> = match self.settings {
            Some(settings) => settings,
            None => Arc::new(StaticSettings::default()),
        };
        settings.referral_settings().validate()?;
        settings.financial_settings().validate()?;
        let notifier: Arc<dyn Notifier> = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(TracingNotifier),
        };
        let cache: Arc<dyn EphemeralCache> = match self.cache {
            Some(cache) => cache,
            None => Arc::new(MemoryCache::new()),
        };
        Ok(Engine {
            database: self.database,
            settings,
            notifier,
            cache,
            events: self.events,
        })
    }
}
