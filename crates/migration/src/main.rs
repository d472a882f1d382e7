use sea_orm::Database;
use sea_orm_migration::prelude::*;

const USAGE: &str = "usage: migration [up [N] | down [N] | status | fresh | refresh | reset]";

/// Same precedence as the daemon: an explicit `DATABASE_URL` wins over the
/// `LEDGER_DATABASE__URL` override of `settings.toml`.
fn database_url() -> String {
    std::env::var("DATABASE_URL")
        .or_else(|_| std::env::var("LEDGER_DATABASE__URL"))
        .unwrap_or_else(|_| "sqlite:./ledger.db?mode=rwc".to_string())
}

fn steps(arg: Option<String>) -> Result<Option<u32>, String> {
    arg.map(|raw| raw.parse::<u32>().map_err(|_| format!("invalid step count: {raw}")))
        .transpose()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut args = std::env::args().skip(1);
    let cmd = args.next().unwrap_or_else(|| "up".to_string());
    let steps = match steps(args.next()) {
        Ok(steps) => steps,
        Err(err) => {
            eprintln!("{err}\n{USAGE}");
            std::process::exit(2);
        }
    };

    let db = Database::connect(database_url()).await?;

    match cmd.as_str() {
        "up" => migration::Migrator::up(&db, steps).await?,
        // defaults to a single step
        "down" => migration::Migrator::down(&db, Some(steps.unwrap_or(1))).await?,
        "status" => migration::Migrator::status(&db).await?,
        "fresh" => migration::Migrator::fresh(&db).await?,
        "refresh" => migration::Migrator::refresh(&db).await?,
        "reset" => migration::Migrator::reset(&db).await?,
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}
