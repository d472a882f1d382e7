#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{
    Account, BoxError, Engine, FinancialSettings, LedgerCmd, LedgerSource, MoneyCents,
    NewAccountCmd, Notification, Notifier, Plan, ReferralSettings, StaticSettings,
};
use migration::MigratorTrait;

/// Captures notifications so tests can read the verification token.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), BoxError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

impl RecordingNotifier {
    pub fn last_token(&self) -> String {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|n| match n {
                Notification::WithdrawalVerification { token, .. } => Some(token.clone()),
                _ => None,
            })
            .expect("no verification sent")
    }
}

pub struct TestEnv {
    pub engine: Arc<Engine>,
    pub db: DatabaseConnection,
    pub notifier: Arc<RecordingNotifier>,
}

pub async fn connect() -> DatabaseConnection {
    // one connection: concurrent transactions queue on the pool
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

/// File-backed database with a real pool: transactions from different tasks
/// interleave and contend for the sqlite write lock.
pub async fn connect_file(dir: &tempfile::TempDir, connections: u32) -> DatabaseConnection {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("ledger.db").display());
    let mut options = ConnectOptions::new(url);
    options.max_connections(connections).sqlx_logging(false);
    let db = Database::connect(options).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

pub async fn env_with(referral: &[Decimal], financial: FinancialSettings) -> TestEnv {
    env_on(connect().await, referral, financial).await
}

pub async fn env_on(
    db: DatabaseConnection,
    referral: &[Decimal],
    financial: FinancialSettings,
) -> TestEnv {
    let notifier = Arc::new(RecordingNotifier::default());
    let settings = StaticSettings::new(
        ReferralSettings::from_percentages(referral.iter().copied()),
        financial,
    )
    .unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .settings(Arc::new(settings))
        .notifier(notifier.clone())
        .build()
        .await
        .unwrap();
    TestEnv {
        engine: Arc::new(engine),
        db,
        notifier,
    }
}

pub async fn env() -> TestEnv {
    env_with(&[], FinancialSettings::default()).await
}

pub fn cents(value: i64) -> MoneyCents {
    MoneyCents::new(value)
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

impl TestEnv {
    pub async fn account(&self, username: &str) -> Account {
        self.engine
            .create_account(NewAccountCmd::new(username).email(format!("{username}@example.com")))
            .await
            .unwrap()
    }

    pub async fn referred(&self, username: &str, referrer: &Account) -> Account {
        self.engine
            .create_account(NewAccountCmd::new(username).referred_by(referrer.id))
            .await
            .unwrap()
    }

    pub async fn funded(&self, username: &str, amount: i64) -> Account {
        let account = self.account(username).await;
        self.fund(&account, amount).await;
        account
    }

    pub async fn fund(&self, account: &Account, amount: i64) {
        self.engine
            .credit(LedgerCmd::new(account.id, cents(amount), LedgerSource::Recharge))
            .await
            .unwrap();
    }

    pub async fn plan(&self, price: i64, validity_days: u32, daily_return: i64) -> Plan {
        self.engine
            .create_plan("Gold", cents(price), validity_days, cents(daily_return))
            .await
            .unwrap()
    }

    pub async fn balance(&self, account: &Account) -> i64 {
        self.engine.balance(account.id).await.unwrap().cents()
    }

    /// Cached balance must always match the ledger.
    pub async fn assert_consistent(&self, account: &Account) {
        assert_eq!(
            self.engine.balance(account.id).await.unwrap(),
            self.engine.ledger_balance(account.id).await.unwrap(),
            "balance drifted for {}",
            account.username
        );
    }

    pub async fn exec(&self, sql: &str, values: Vec<sea_orm::Value>) {
        self.db
            .execute(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                sql,
                values,
            ))
            .await
            .unwrap();
    }
}
