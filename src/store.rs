//! Processed-activity store: remembers which activity ids have been seen so
//! each one is handled at most once, across polls and across restarts.
//!
//! Every entry is either present in the latest poll result or younger than
//! twice the tolerance, so the set stays bounded by the feed size.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Activity;
use crate::utils::write_atomic;

const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    schema_version: u32,
    activities: Vec<Activity>,
}

/// Outcome of folding one poll result into the store.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Activities seen for the first time, in fetch order.
    pub new_activities: Vec<Activity>,
    /// Entries dropped because they vanished from the feed or aged out.
    pub expired: usize,
    /// Whether anything was added or removed.
    pub changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessedActivityStore {
    // Keyed by activity id.
    activities: HashMap<String, Activity>,
}

impl ProcessedActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a snapshot. A missing file is an empty store, not an error.
    pub fn try_load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&contents)
            .with_context(|| format!("Corrupt snapshot {}", path.display()))?;
        if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
            anyhow::bail!(
                "unsupported snapshot schema {} in {}",
                snapshot.schema_version,
                path.display()
            );
        }

        Ok(Self {
            activities: snapshot
                .activities
                .into_iter()
                .map(|activity| (activity.id().to_string(), activity))
                .collect(),
        })
    }

    /// Writes the store through a temp file and rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut activities: Vec<Activity> = self.activities.values().cloned().collect();
        activities.sort();

        let snapshot = Snapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            activities,
        };
        let serialized = serde_json::to_string_pretty(&snapshot)?;
        write_atomic(path, &serialized)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))
    }

    /// Records unseen activities, then expires every entry that is missing
    /// from `fetched` or older than `2 * tolerance` relative to `now`.
    pub fn reconcile(
        &mut self,
        fetched: &[Activity],
        tolerance: Duration,
        now: DateTime<Utc>,
    ) -> Reconciliation {
        let mut new_activities = Vec::new();
        for activity in fetched {
            if !self.activities.contains_key(activity.id()) {
                self.activities
                    .insert(activity.id().to_string(), activity.clone());
                new_activities.push(activity.clone());
            }
        }

        let encountered: HashSet<&str> = fetched.iter().map(Activity::id).collect();
        let retention = tolerance * 2;

        let before = self.activities.len();
        self.activities.retain(|id, activity| {
            encountered.contains(id.as_str()) && activity.age(now) <= retention
        });
        let expired = before - self.activities.len();

        Reconciliation {
            changed: !new_activities.is_empty() || expired > 0,
            new_activities,
            expired,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.activities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.activities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Activity> {
        self.activities.values()
    }
}
