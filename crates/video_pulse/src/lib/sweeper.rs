//! Scheduled eviction of finished jobs from the in-memory registry.

use std::{str::FromStr, sync::Arc};

use anyhow::Context;
use apalis::{
    layers::{retry::RetryPolicy, sentry::SentryLayer},
    prelude::*,
};
use apalis_cron::{CronStream, Tick};
use chrono::Utc;
use cron::Schedule;
use tokio_util::sync::CancellationToken;

use crate::registry::JobRegistry;

pub async fn sweep_expired_jobs(_tick: Tick, registry: Data<Arc<JobRegistry>>) -> anyhow::Result<()> {
    let evicted = registry.evict_expired(Utc::now());
    tracing::debug!(evicted, remaining = registry.len(), "Swept expired jobs");
    Ok(())
}

pub fn parse_schedule(schedule: &str) -> anyhow::Result<Schedule> {
    Schedule::from_str(schedule).with_context(|| format!("Invalid sweep schedule: {schedule}"))
}

/// Runs the sweep on `schedule` until `shutdown` is cancelled.
pub async fn run_sweeper(
    registry: Arc<JobRegistry>,
    schedule: Schedule,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let worker = WorkerBuilder::new("video-pulse-sweeper")
        .backend(CronStream::new(schedule))
        .retry(RetryPolicy::retries(3))
        .layer(SentryLayer::new())
        .data(registry)
        .build(sweep_expired_jobs);

    tokio::select! {
        res = worker.run() => res?,
        _ = shutdown.cancelled() => tracing::info!("Sweeper stopped"),
    }

    Ok(())
}
