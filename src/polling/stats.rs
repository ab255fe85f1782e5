use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters describing the poller's work so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollStats {
    /// Cycles whose fetch succeeded. Never decreases.
    pub total_queries: u64,
    pub last_cycle_encountered: usize,
    pub last_cycle_new: usize,
    pub last_cycle_dispatched: usize,
    /// Successful handler invocations across all cycles and test commands.
    pub total_processed: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl PollStats {
    /// Records a cycle whose fetch succeeded and returns its query number.
    pub(crate) fn record_cycle(
        &mut self,
        at: DateTime<Utc>,
        encountered: usize,
        new_activities: usize,
        dispatched: usize,
        processed: usize,
    ) -> u64 {
        self.total_queries += 1;
        self.last_cycle_encountered = encountered;
        self.last_cycle_new = new_activities;
        self.last_cycle_dispatched = dispatched;
        self.total_processed += processed as u64;
        self.last_cycle_at = Some(at);
        self.total_queries
    }

    pub(crate) fn record_processed(&mut self, processed: usize) {
        self.total_processed += processed as u64;
    }
}
