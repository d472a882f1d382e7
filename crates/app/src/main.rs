use std::{sync::Arc, time::Duration};

use migration::{Migrator, MigratorTrait};
use sea_orm::ConnectOptions;

mod scheduler;
mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "ledgerd={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let db = connect(&settings.database).await?;
    let engine = engine::Engine::builder()
        .database(db)
        .settings(Arc::new(settings.engine))
        .build()
        .await?;
    let engine = Arc::new(engine);

    let accrual = settings.scheduler.accrual_interval_secs;
    if accrual > 0 {
        tasks.spawn(scheduler::run_accrual(
            engine.clone(),
            Duration::from_secs(accrual),
        ));
    } else {
        tracing::info!("daily return job disabled");
    }

    let expiry = settings.scheduler.expiry_interval_secs;
    if expiry > 0 {
        tasks.spawn(scheduler::run_expiry(
            engine.clone(),
            Duration::from_secs(expiry),
        ));
    } else {
        tracing::info!("expiry job disabled");
    }

    tasks.spawn(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(err) => tracing::error!("failed to listen for shutdown signal: {err}"),
        }
    });

    while tasks.join_next().await.is_some() {
        tasks.shutdown().await;
    }

    Ok(())
}

async fn connect(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .sqlx_logging(false);

    let database = sea_orm::Database::connect(options).await?;
    Migrator::up(&database, None).await?;
    tracing::info!("database ready");
    Ok(database)
}
