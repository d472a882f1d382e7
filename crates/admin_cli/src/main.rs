use std::{error::Error, sync::Arc};

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError, Environment, File};
use engine::{Decision, Engine, LedgerFilter, MoneyCents, NewAccountCmd, StaticSettings};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "ledger_admin")]
#[command(about = "Operational utilities for the wallet ledger (bootstrap, decisions, job replay)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./ledger.db?mode=rwc"
    )]
    database_url: String,

    /// Settings file holding the `[engine]` section used by the daemon.
    #[arg(long, default_value = "settings")]
    config: String,

    /// Log filter for engine output on stderr.
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Account(AccountArgs),
    Plan(PlanArgs),
    Accrual(AccrualArgs),
    Expiry(ExpiryArgs),
    Summaries(SummariesArgs),
    Withdrawal(WithdrawalArgs),
    Recharge(RechargeArgs),
    Balance(BalanceArgs),
}

#[derive(Args, Debug)]
struct AccountArgs {
    #[command(subcommand)]
    command: AccountCommand,
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        referrer: Option<Uuid>,
    },
    Show {
        id: Uuid,
    },
    Disable {
        id: Uuid,
    },
    Enable {
        id: Uuid,
    },
    /// Move an account under another referrer, or detach it without `--referrer`.
    Referrer {
        id: Uuid,
        #[arg(long)]
        referrer: Option<Uuid>,
    },
}

#[derive(Args, Debug)]
struct PlanArgs {
    #[command(subcommand)]
    command: PlanCommand,
}

#[derive(Subcommand, Debug)]
enum PlanCommand {
    Create {
        #[arg(long)]
        name: String,
        /// Price, e.g. `100` or `99.50`.
        #[arg(long)]
        price: MoneyCents,
        #[arg(long)]
        validity_days: u32,
        #[arg(long)]
        daily_return: MoneyCents,
    },
    List,
    Activate {
        id: Uuid,
    },
    Deactivate {
        id: Uuid,
    },
}

#[derive(Args, Debug)]
struct AccrualArgs {
    #[command(subcommand)]
    command: AccrualCommand,
}

#[derive(Subcommand, Debug)]
enum AccrualCommand {
    /// Credit daily returns for one date (defaults to today, UTC).
    Run {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Args, Debug)]
struct ExpiryArgs {
    #[command(subcommand)]
    command: ExpiryCommand,
}

#[derive(Subcommand, Debug)]
enum ExpiryCommand {
    /// Mature every subscription whose end is at or before `--at` (defaults to now).
    Run {
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[derive(Args, Debug)]
struct SummariesArgs {
    #[command(subcommand)]
    command: SummariesCommand,
}

#[derive(Subcommand, Debug)]
enum SummariesCommand {
    Rebuild,
}

#[derive(Args, Debug)]
struct WithdrawalArgs {
    #[command(subcommand)]
    command: DecisionCommand,
}

#[derive(Args, Debug)]
struct RechargeArgs {
    #[command(subcommand)]
    command: DecisionCommand,
}

#[derive(Subcommand, Debug)]
enum DecisionCommand {
    /// Pending requests, oldest first.
    List,
    Approve {
        id: Uuid,
    },
    Reject {
        id: Uuid,
    },
}

#[derive(Args, Debug)]
struct BalanceArgs {
    #[command(subcommand)]
    command: BalanceCommand,
}

#[derive(Subcommand, Debug)]
enum BalanceCommand {
    Show {
        id: Uuid,
    },
    /// Rebuild the cached balance from the ledger.
    Recompute {
        id: Uuid,
    },
    Ledger {
        id: Uuid,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
}

fn load_engine_settings(path: &str) -> Result<StaticSettings, ConfigError> {
    let settings = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("LEDGER")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    match settings.get::<StaticSettings>("engine") {
        Ok(engine) => Ok(engine),
        Err(ConfigError::NotFound(_)) => Ok(StaticSettings::default()),
        Err(err) => Err(err),
    }
}

async fn connect_db(database_url: &str) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

fn decision_of(command: &DecisionCommand) -> Option<(Uuid, Decision)> {
    match command {
        DecisionCommand::List => None,
        DecisionCommand::Approve { id } => Some((*id, Decision::Approve)),
        DecisionCommand::Reject { id } => Some((*id, Decision::Reject)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(format!("engine={}", cli.log_level))
        .init();

    let settings = load_engine_settings(&cli.config)?;
    let db = connect_db(&cli.database_url).await?;
    let engine = Engine::builder()
        .database(db)
        .settings(Arc::new(settings))
        .build()
        .await?;

    match cli.command {
        Command::Account(AccountArgs { command }) => account(&engine, command).await?,
        Command::Plan(PlanArgs { command }) => plan(&engine, command).await?,
        Command::Accrual(AccrualArgs {
            command: AccrualCommand::Run { date },
        }) => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let report = engine.run_daily_returns(date).await?;
            println!(
                "{date}: credited {} ({}), skipped {}, failed {}",
                report.credited, report.total, report.skipped, report.failed
            );
        }
        Command::Expiry(ExpiryArgs {
            command: ExpiryCommand::Run { at },
        }) => {
            let report = engine
                .run_subscription_expiry(at.unwrap_or_else(Utc::now))
                .await?;
            println!(
                "expired {} (returned {}), skipped {}, failed {}",
                report.expired, report.returned, report.skipped, report.failed
            );
        }
        Command::Summaries(SummariesArgs {
            command: SummariesCommand::Rebuild,
        }) => {
            let rows = engine.rebuild_daily_return_summaries().await?;
            println!("rebuilt {rows} summary rows");
        }
        Command::Withdrawal(WithdrawalArgs { command }) => match decision_of(&command) {
            None => {
                for request in engine.pending_withdrawals().await? {
                    println!(
                        "{}  account {}  amount {}  net {}  to {}  since {}",
                        request.id,
                        request.account_id,
                        request.amount,
                        request.net_amount,
                        request.destination,
                        request.created_at
                    );
                }
            }
            Some((id, decision)) => {
                let request = engine.decide_withdrawal(id, decision).await?;
                println!("withdrawal {id}: {}", request.status.as_str());
            }
        },
        Command::Recharge(RechargeArgs { command }) => match decision_of(&command) {
            None => {
                for request in engine.pending_recharges().await? {
                    println!(
                        "{}  account {}  amount {}  txn {}  since {}",
                        request.id,
                        request.account_id,
                        request.amount,
                        request.external_txn_id,
                        request.created_at
                    );
                }
            }
            Some((id, decision)) => {
                let request = engine.decide_recharge(id, decision).await?;
                println!("recharge {id}: {}", request.status.as_str());
            }
        },
        Command::Balance(BalanceArgs { command }) => balance(&engine, command).await?,
    }

    Ok(())
}

async fn account(engine: &Engine, command: AccountCommand) -> Result<(), Box<dyn Error + Send + Sync>> {
    match command {
        AccountCommand::Create {
            username,
            email,
            referrer,
        } => {
            let mut cmd = NewAccountCmd::new(username);
            if let Some(email) = email {
                cmd = cmd.email(email);
            }
            if let Some(referrer) = referrer {
                cmd = cmd.referred_by(referrer);
            }
            let account = engine.create_account(cmd).await?;
            println!("created account: {} ({})", account.username, account.id);
        }
        AccountCommand::Show { id } => {
            let account = engine.account(id).await?;
            let available = engine.available_balance(id).await?;
            println!("{} ({})", account.username, account.id);
            println!("  balance:   {}", account.balance);
            println!("  available: {available}");
            if let Some(referrer) = account.referred_by {
                println!("  referrer:  {referrer}");
            }
            if account.disabled {
                println!("  disabled");
            }
        }
        AccountCommand::Disable { id } => {
            engine.set_account_disabled(id, true).await?;
            println!("disabled account {id}");
        }
        AccountCommand::Enable { id } => {
            engine.set_account_disabled(id, false).await?;
            println!("enabled account {id}");
        }
        AccountCommand::Referrer { id, referrer } => {
            let account = engine.set_referrer(id, referrer).await?;
            match account.referred_by {
                Some(referrer) => println!("{} now referred by {referrer}", account.username),
                None => println!("{} has no referrer", account.username),
            }
        }
    }
    Ok(())
}

async fn plan(engine: &Engine, command: PlanCommand) -> Result<(), Box<dyn Error + Send + Sync>> {
    match command {
        PlanCommand::Create {
            name,
            price,
            validity_days,
            daily_return,
        } => {
            let plan = engine
                .create_plan(&name, price, validity_days, daily_return)
                .await?;
            println!("created plan: {} ({})", plan.name, plan.id);
        }
        PlanCommand::List => {
            for plan in engine.plans().await? {
                println!(
                    "{}  {}  price {}  {} days  daily {}{}",
                    plan.id,
                    plan.name,
                    plan.price,
                    plan.validity_days,
                    plan.daily_return,
                    if plan.active { "" } else { "  (inactive)" }
                );
            }
        }
        PlanCommand::Activate { id } => {
            engine.set_plan_active(id, true).await?;
            println!("activated plan {id}");
        }
        PlanCommand::Deactivate { id } => {
            engine.set_plan_active(id, false).await?;
            println!("deactivated plan {id}");
        }
    }
    Ok(())
}

async fn balance(engine: &Engine, command: BalanceCommand) -> Result<(), Box<dyn Error + Send + Sync>> {
    match command {
        BalanceCommand::Show { id } => {
            println!("balance:   {}", engine.balance(id).await?);
            println!("available: {}", engine.available_balance(id).await?);
            println!("ledger:    {}", engine.ledger_balance(id).await?);
        }
        BalanceCommand::Recompute { id } => {
            let reconciliation = engine.recompute_balance(id).await?;
            if reconciliation.drifted() {
                println!(
                    "repaired {id}: {} -> {}",
                    reconciliation.previous, reconciliation.recomputed
                );
            } else {
                println!("{id} consistent at {}", reconciliation.recomputed);
            }
        }
        BalanceCommand::Ledger { id, limit } => {
            for entry in engine
                .ledger_entries(id, &LedgerFilter::default(), limit)
                .await?
            {
                println!(
                    "{}  {}  {:>6}  {:>12}  {}  {}",
                    entry.created_at,
                    entry.id,
                    entry.direction.as_str(),
                    entry.amount,
                    entry.source.as_str(),
                    entry.status.as_str()
                );
            }
        }
    }
    Ok(())
}
