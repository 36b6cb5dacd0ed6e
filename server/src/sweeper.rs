//! Background status refresh
//!
//! Tokens nobody reads would otherwise keep a stale `status` and
//! `remainingDays` in storage until their next request.

use std::sync::Arc;
use std::time::Duration;

use crate::ledger::LedgerService;

/// Refresh all stored tokens every `every`, forever.
pub async fn run(ledger: Arc<LedgerService>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match ledger.sweep().await {
            Ok(outcome) => tracing::info!(
                scanned = outcome.scanned,
                updated = outcome.updated,
                conflicts = outcome.conflicts,
                "status sweep finished"
            ),
            Err(e) => tracing::error!(error = %e, "status sweep failed"),
        }
    }
}
