//! Proactive background token refresh
//!
//! Wakes on a fixed interval and refreshes the token when it is within the
//! background threshold of expiry. The threshold is wider than the
//! demand-path margin, so under normal operation requests never wait on
//! the authorization endpoint.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::manager::TokenManager;
use super::types::{RefreshOutcome, RefreshSchedule};

/// Spawn the background refresh task.
///
/// A failed cycle is logged and the next check happens after
/// `retry_interval` instead of the normal `interval`. The task only stops
/// when `cancel` fires.
pub fn spawn_refresh_task(
    manager: Arc<TokenManager>,
    schedule: RefreshSchedule,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            interval_secs = schedule.interval.as_secs(),
            threshold_secs = schedule.threshold.as_secs(),
            "Background token refresh started"
        );

        let mut delay = schedule.interval;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = manager.refresh_if_needed(schedule.threshold) => result,
            };

            delay = match result {
                Ok(RefreshOutcome::Refreshed) => {
                    tracing::info!("Background token refresh succeeded");
                    schedule.interval
                }
                Ok(RefreshOutcome::Fresh) => schedule.interval,
                Err(e) => {
                    tracing::error!(
                        retry_secs = schedule.retry_interval.as_secs(),
                        "Background token refresh failed: {:#}",
                        e
                    );
                    schedule.retry_interval
                }
            };
        }

        tracing::info!("Background token refresh stopped");
    })
}
