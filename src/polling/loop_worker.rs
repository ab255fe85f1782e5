use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::processor::{ActivityProcessor, CycleOutcome};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Drives poll cycles from the timer and from external triggers until cancelled.
///
/// Ticks that land while a cycle is running are dropped by the processor;
/// triggers queue at most one pending run.
pub async fn poll_loop(
    processor: Arc<ActivityProcessor>,
    interval: Duration,
    mut triggers: mpsc::Receiver<()>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_cycle(&processor, "timer", &cancel_token).await;
            }
            Some(()) = triggers.recv() => {
                run_cycle(&processor, "trigger", &cancel_token).await;
            }
            _ = cancel_token.cancelled() => {
                log_info!("poll loop shutting down");
                break;
            }
        }
    }
}

async fn run_cycle(processor: &ActivityProcessor, reason: &str, cancel_token: &CancellationToken) {
    // Dropping the cycle future is safe: snapshot writes are synchronous and atomic.
    let outcome = tokio::select! {
        outcome = processor.run_poll_cycle() => outcome,
        _ = cancel_token.cancelled() => {
            log_info!("poll cycle ({reason}) abandoned for shutdown");
            return;
        }
    };

    match &outcome {
        CycleOutcome::Skipped => log_debug!("poll cycle ({reason}) skipped, previous still running"),
        CycleOutcome::Completed(report) => log_debug!(
            "poll cycle ({reason}) finished: {} new, {} dispatched, {} expired",
            report.new_activities,
            report.dispatched,
            report.expired
        ),
        CycleOutcome::SessionInvalid(_) | CycleOutcome::Failed(_) => {}
    }

    if outcome.needs_session() {
        if let Err(err) = processor.reauthenticate().await {
            log_warn!("re-authentication failed: {err:#}");
        }
    }
}
