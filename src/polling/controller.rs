use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::loop_worker::poll_loop;
use super::processor::ActivityProcessor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerResult {
    Queued,
    /// A run is already pending; this trigger was folded into it.
    Coalesced,
    NotRunning,
}

/// Owns the background poll task.
pub struct PollController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    trigger_tx: Option<mpsc::Sender<()>>,
}

impl PollController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            trigger_tx: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, processor: Arc<ActivityProcessor>, interval: Duration) -> Result<()> {
        if self.handle.is_some() {
            bail!("polling already active");
        }
        if interval.is_zero() {
            bail!("poll interval must be positive");
        }

        let cancel_token = CancellationToken::new();
        // Capacity 1: one pending run is all a burst of triggers needs.
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        info!("Starting activity polling every {}ms", interval.as_millis());
        let handle = tokio::spawn(poll_loop(
            processor,
            interval,
            trigger_rx,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.trigger_tx = Some(trigger_tx);
        Ok(())
    }

    /// Requests a cycle outside the timer schedule.
    pub fn trigger(&self) -> TriggerResult {
        let Some(tx) = &self.trigger_tx else {
            return TriggerResult::NotRunning;
        };
        match tx.try_send(()) {
            Ok(()) => TriggerResult::Queued,
            Err(TrySendError::Full(())) => TriggerResult::Coalesced,
            Err(TrySendError::Closed(())) => TriggerResult::NotRunning,
        }
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.trigger_tx = None;
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("poll loop task failed to join")
                .map(|_| ())?;
            info!("Activity polling stopped");
        }
        Ok(())
    }
}

impl Default for PollController {
    fn default() -> Self {
        Self::new()
    }
}
