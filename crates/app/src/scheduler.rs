//! Interval loops driving the daily-return and expiry jobs.
//!
//! Both jobs are idempotent, so a tick that overlaps a manual run from
//! `ledger_admin` or a restart is harmless.

use std::{sync::Arc, time::Duration};

use chrono::{Days, Utc};
use engine::Engine;
use tokio::time::MissedTickBehavior;

fn interval(every: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Credits yesterday's and today's returns on every tick; yesterday is
/// retried so a subscription bought after the last tick of a day still gets
/// that day.
pub async fn run_accrual(engine: Arc<Engine>, every: Duration) {
    tracing::info!(every_secs = every.as_secs(), "daily return job started");
    let mut ticker = interval(every);
    loop {
        ticker.tick().await;
        let today = Utc::now().date_naive();
        let days = today
            .checked_sub_days(Days::new(1))
            .into_iter()
            .chain(std::iter::once(today));
        for day in days {
            match engine.run_daily_returns(day).await {
                Ok(report) if report.failed > 0 => tracing::warn!(
                    %day,
                    failed = report.failed,
                    credited = report.credited,
                    "daily return run finished with failures"
                ),
                Ok(_) => {}
                Err(err) => tracing::error!(%day, "daily return run failed: {err}"),
            }
        }
    }
}

pub async fn run_expiry(engine: Arc<Engine>, every: Duration) {
    tracing::info!(every_secs = every.as_secs(), "expiry job started");
    let mut ticker = interval(every);
    loop {
        ticker.tick().await;
        match engine.run_subscription_expiry(Utc::now()).await {
            Ok(report) if report.failed > 0 => tracing::warn!(
                failed = report.failed,
                expired = report.expired,
                "expiry run finished with failures"
            ),
            Ok(_) => {}
            Err(err) => tracing::error!("expiry run failed: {err}"),
        }
    }
}
