use super::StatusStore;
use crate::report::{EspNowReport, StatusReport};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// One unit of deferred persistence work.
#[derive(Debug)]
pub enum StoreJob {
    Status {
        report: StatusReport,
        timestamp: DateTime<Utc>,
    },
    EspNow {
        report: EspNowReport,
        timestamp: DateTime<Utc>,
    },
}

/// Queue a job without waiting. A full queue drops the job with a warning;
/// persistence is at-least-once-ish by design and never blocks ingestion.
pub fn enqueue(tx: &mpsc::Sender<StoreJob>, job: StoreJob) {
    if let Err(e) = tx.try_send(job) {
        warn!(error = %e, "Persistence queue rejected job, dropping");
    }
}

/// Drain the persistence queue, executing each job on the blocking pool.
///
/// Runs until every sender is dropped; a job already picked up at shutdown
/// is allowed to complete. Individual failures are logged and swallowed so
/// a bad write never kills the writer.
pub async fn run_writer(store: Arc<StatusStore>, mut rx: mpsc::Receiver<StoreJob>) {
    info!("Persistence writer started");

    while let Some(job) = rx.recv().await {
        let store = Arc::clone(&store);
        let result: Result<Result<()>, _> = tokio::task::spawn_blocking(move || match job {
            StoreJob::Status { report, timestamp } => store.store_status(&report, timestamp),
            StoreJob::EspNow { report, timestamp } => store.store_esp_now(&report, timestamp),
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Persistence write failed"),
            Err(e) => error!(error = %e, "Persistence task panicked"),
        }
    }

    info!("Persistence writer stopped");
}
