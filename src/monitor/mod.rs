use crate::hub::{BroadcastHub, ServerMessage};
use crate::registry::Registry;
use crate::storage::StatusStore;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// Periodic stale-agent sweep.
///
/// Each tick asks the registry to reclassify silent agents, then emits one
/// inactive-transition event per agent. The registry mutation and the
/// broadcast are separate steps: no lock is held across the emit, so a
/// report landing between the two can race with one extra stale
/// notification, bounded by a single tick interval.
pub async fn run_health_monitor(
    registry: Arc<Registry>,
    hub: Arc<BroadcastHub>,
    interval_seconds: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(Duration::from_secs(interval_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(interval_seconds = interval_seconds, "Health monitor started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep(&registry, &hub);
            }
            _ = shutdown.changed() => {
                info!("Health monitor stopping");
                break;
            }
        }
    }
}

/// One sweep pass: reclassify, then publish. A bad tick never terminates
/// the monitor loop.
fn sweep(registry: &Registry, hub: &BroadcastHub) {
    let transitioned = registry.mark_stale_as_inactive();
    if transitioned.is_empty() {
        return;
    }

    warn!(count = transitioned.len(), "Detected inactive agents");

    for id in transitioned {
        // The agent may have been pruned between the sweep and this read;
        // in that case there is nothing left to announce.
        match registry.view(&id) {
            Some(view) => {
                hub.publish(ServerMessage::bot_update(view));
            }
            None => {
                warn!(bot_id = %id, "Agent removed before inactive broadcast");
            }
        }
    }
}

/// Periodic sink liveness probe, independent of agent activity.
pub async fn run_heartbeat(
    hub: Arc<BroadcastHub>,
    interval_seconds: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(Duration::from_secs(interval_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                hub.publish(ServerMessage::heartbeat());
            }
            _ = shutdown.changed() => {
                info!("Heartbeat emitter stopping");
                break;
            }
        }
    }
}

/// Hourly retention pass over persisted history. Failures are logged and
/// the loop proceeds to the next tick.
pub async fn run_retention_sweeper(
    store: Arc<StatusStore>,
    retention_days: i64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(Duration::from_secs(3600));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(retention_days = retention_days, "Retention sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                prune_once(&store, retention_days).await;
            }
            _ = shutdown.changed() => {
                info!("Retention sweeper stopping");
                break;
            }
        }
    }
}

async fn prune_once(store: &Arc<StatusStore>, retention_days: i64) {
    let cutoff = Utc::now() - ChronoDuration::days(retention_days);
    let store = Arc::clone(store);

    let result = tokio::task::spawn_blocking(move || store.prune_before(cutoff)).await;
    match result {
        Ok(Ok(summary)) => {
            if summary.status_rows > 0 || summary.esp_now_rows > 0 {
                info!(
                    status_rows = summary.status_rows,
                    esp_now_rows = summary.esp_now_rows,
                    "Pruned old history"
                );
            }
        }
        Ok(Err(e)) => error!(error = %e, "Retention prune failed"),
        Err(e) => error!(error = %e, "Retention task panicked"),
    }
}
