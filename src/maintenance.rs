use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::store::WalStore;

const SWEEP_EVERY: Duration = Duration::from_secs(30);

/// Background task that rewrites the journal once enough appends pile up.
/// Block churn is toggle-heavy, so most records cancel out.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64) {
    let mut interval = tokio::time::interval(SWEEP_EVERY);
    loop {
        interval.tick().await;
        match maybe_compact(&store, threshold).await {
            Ok(true) => info!("journal compacted"),
            Ok(false) => {}
            Err(e) => warn!("compaction skipped: {e}"),
        }
    }
}

/// Compact if the append counter crossed `threshold`. Returns whether it ran.
pub async fn maybe_compact(store: &WalStore, threshold: u64) -> Result<bool, crate::store::StoreError> {
    if store.appends_since_compact().await? < threshold {
        return Ok(false);
    }
    store.compact().await?;
    Ok(true)
}
