use appstore_store::PackageStore;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Periodically release abandoned uploads and delete orphaned files.
///
/// `grace` must exceed the longest upload the server accepts.
pub async fn start_reconcile_task(store: PackageStore, interval_secs: u64, grace: Duration) {
    let mut interval = interval(Duration::from_secs(interval_secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval_secs,
        grace_secs = grace.as_secs(),
        "Reconcile task running"
    );

    loop {
        interval.tick().await;

        if let Err(e) = store.reconcile(grace).await {
            error!(error = %e, "Reconcile sweep failed");
        }
    }
}
