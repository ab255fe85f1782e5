//! One poll cycle: fetch, reconcile against the processed store, dispatch what
//! is fresh, persist. At most one cycle (or test command) runs at a time.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex as AsyncMutex;

use crate::models::{normalize_command, Activity, STATUS_SUCCESS};
use crate::notify::{Notifier, Severity};
use crate::plugins::PluginManager;
use crate::store::ProcessedActivityStore;

use super::source::{parse_activity, ActivitySource, FetchOutcome};
use super::stats::PollStats;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub const TEST_ACTIVITY_ID: &str = "TestActivity";

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Dispatch window; retention is twice this.
    pub time_tolerance: Duration,
    pub snapshot_path: PathBuf,
}

/// Summary of a cycle that got past the fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub query: u64,
    pub encountered: usize,
    pub new_activities: usize,
    pub dispatched: usize,
    pub processed: usize,
    pub expired: usize,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was already running.
    Skipped,
    Completed(CycleReport),
    SessionInvalid(String),
    Failed(String),
}

impl CycleOutcome {
    /// Whether the cycle actually executed.
    pub fn ran(&self) -> bool {
        !matches!(self, CycleOutcome::Skipped)
    }

    /// Fetch was rejected or failed; the source should re-authenticate.
    pub fn needs_session(&self) -> bool {
        matches!(self, CycleOutcome::SessionInvalid(_) | CycleOutcome::Failed(_))
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ActivityProcessor {
    source: Arc<dyn ActivitySource>,
    plugins: Arc<PluginManager>,
    notifier: Arc<dyn Notifier>,
    config: ProcessorConfig,
    busy: AtomicBool,
    // Loaded on the first cycle so a corrupt snapshot is reported, not fatal.
    store: AsyncMutex<Option<ProcessedActivityStore>>,
    stats: Mutex<PollStats>,
    clock: fn() -> DateTime<Utc>,
}

impl ActivityProcessor {
    pub fn new(
        source: Arc<dyn ActivitySource>,
        plugins: Arc<PluginManager>,
        notifier: Arc<dyn Notifier>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            source,
            plugins,
            notifier,
            config,
            busy: AtomicBool::new(false),
            store: AsyncMutex::new(None),
            stats: Mutex::new(PollStats::default()),
            clock: Utc::now,
        }
    }

    /// Replaces the wall clock used for the tolerance window.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn stats(&self) -> PollStats {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn total_queries(&self) -> u64 {
        self.stats().total_queries
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn reauthenticate(&self) -> Result<()> {
        self.source.reauthenticate().await
    }

    fn try_begin(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(&self.busy))
    }

    /// Runs one cycle unless one is already in flight.
    pub async fn run_poll_cycle(&self) -> CycleOutcome {
        let Some(_guard) = self.try_begin() else {
            log_debug!("poll cycle already running, skipping");
            return CycleOutcome::Skipped;
        };

        match self.poll_once().await {
            Ok(outcome) => outcome,
            Err(err) => {
                let reason = format!("{err:#}");
                self.notifier.notify(
                    &format!("Failure while processing activities: {reason}"),
                    Severity::Error,
                );
                CycleOutcome::Failed(reason)
            }
        }
    }

    async fn poll_once(&self) -> Result<CycleOutcome> {
        let started = Instant::now();

        let records = match self.source.fetch_recent_activities().await? {
            FetchOutcome::Activities(records) => records,
            FetchOutcome::SessionExpired(reason) => {
                self.notifier
                    .notify(&format!("Activity session expired: {reason}"), Severity::Warning);
                return Ok(CycleOutcome::SessionInvalid(reason));
            }
        };
        let activities: Vec<Activity> = records.iter().filter_map(parse_activity).collect();
        if activities.len() < records.len() {
            log_debug!(
                "skipped {} malformed activity records",
                records.len() - activities.len()
            );
        }

        let mut slot = self.store.lock().await;
        let store = slot.get_or_insert_with(|| self.restore_store());

        let now = (self.clock)();
        let tolerance = self.config.time_tolerance;
        let reconciliation = store.reconcile(&activities, tolerance, now);

        let mut dispatched = 0;
        let mut processed = 0;
        for activity in reconciliation.new_activities.iter() {
            if activity.age(now) > tolerance {
                log_debug!(
                    "absorbing stale activity {} from {}",
                    activity.id(),
                    activity.time()
                );
                continue;
            }
            dispatched += 1;
            match self.dispatch(activity.clone()).await {
                Ok(count) => processed += count,
                Err(err) => self.notifier.notify(
                    &format!("Failed to dispatch activity {}: {err:#}", activity.id()),
                    Severity::Error,
                ),
            }
        }

        if reconciliation.changed {
            if let Err(err) = store.save(&self.config.snapshot_path) {
                self.notifier.notify(
                    &format!("Failed to save processed activities: {err:#}"),
                    Severity::Error,
                );
            }
        }
        drop(slot);

        let query = self
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record_cycle(
                now,
                activities.len(),
                reconciliation.new_activities.len(),
                dispatched,
                processed,
            );

        let elapsed_ms = started.elapsed().as_millis();
        log_info!(
            "query {} processed {} activities in {} ms",
            query,
            activities.len(),
            elapsed_ms
        );

        Ok(CycleOutcome::Completed(CycleReport {
            query,
            encountered: activities.len(),
            new_activities: reconciliation.new_activities.len(),
            dispatched,
            processed,
            expired: reconciliation.expired,
            elapsed_ms,
        }))
    }

    fn restore_store(&self) -> ProcessedActivityStore {
        ProcessedActivityStore::try_load(&self.config.snapshot_path).unwrap_or_else(|err| {
            self.notifier.notify(
                &format!("Failed to restore processed activities: {err:#}"),
                Severity::Warning,
            );
            ProcessedActivityStore::new()
        })
    }

    // Handlers may block on child processes or the audio thread.
    async fn dispatch(&self, activity: Activity) -> Result<usize> {
        log_info!(
            "processing activity [{}]: {} \"{}\"",
            activity.status(),
            activity.id(),
            activity.command()
        );
        let plugins = Arc::clone(&self.plugins);
        tokio::task::spawn_blocking(move || plugins.dispatch(&activity))
            .await
            .context("dispatch worker join failed")
    }

    /// Dispatches `text` as if it had just been heard, bypassing the fetch and
    /// the store. Returns `None` when the text is blank or a cycle is running.
    pub async fn test_command(&self, text: &str) -> Option<usize> {
        let command = normalize_command(text);
        if command.is_empty() {
            return None;
        }
        let Some(_guard) = self.try_begin() else {
            log_debug!("poll cycle running, test command \"{}\" dropped", command);
            return None;
        };

        let activity = Activity::new(STATUS_SUCCESS, (self.clock)(), TEST_ACTIVITY_ID, command);
        match self.dispatch(activity).await {
            Ok(processed) => {
                self.stats
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .record_processed(processed);
                Some(processed)
            }
            Err(err) => {
                self.notifier
                    .notify(&format!("Test command failed: {err:#}"), Severity::Error);
                None
            }
        }
    }
}
