//! Periodic bridge housekeeping

use crate::bridge_correlator::BridgeCorrelator;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Expire unanswered bridge requests and purge old finished ones
pub fn spawn_bridge_maintenance(
    correlator: Arc<BridgeCorrelator>,
    every: Duration,
    retention: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Bridge maintenance every {:?}, retention {:?}",
            every, retention
        );
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let retention = ChronoDuration::from_std(retention).unwrap_or(ChronoDuration::hours(1));

        loop {
            ticker.tick().await;
            run_once(&correlator, retention).await;
        }
    })
}

async fn run_once(correlator: &BridgeCorrelator, retention: ChronoDuration) {
    let now = Utc::now();

    if let Err(e) = correlator.expire_stale(now).await {
        error!("Bridge expiry failed: {}", e);
    }
    if let Err(e) = correlator.purge_finished(now - retention).await {
        error!("Bridge cleanup failed: {}", e);
    }
}
