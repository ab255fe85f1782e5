use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Status the remote source reports for a normally completed interaction.
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// One voice interaction as reported by the activity history.
///
/// Identity is the remote `id` alone: equality, hashing and ordering all
/// compare ids ordinally and ignore every other field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    status: String,
    time: DateTime<Utc>,
    id: String,
    #[serde(default, deserialize_with = "deserialize_command")]
    command: String,
}

impl Activity {
    pub fn new(
        status: impl Into<String>,
        time: DateTime<Utc>,
        id: impl Into<String>,
        command: impl AsRef<str>,
    ) -> Self {
        Self {
            status: status.into(),
            time,
            id: id.into(),
            command: normalize_command(command.as_ref()),
        }
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Lowercased tokens of the command, for order-independent phrase matching.
    ///
    /// Recomputed on each call so copies never share a stale cache.
    pub fn command_words(&self) -> HashSet<String> {
        self.command
            .split(' ')
            .filter(|word| !word.is_empty())
            .map(|word| word.to_lowercase())
            .collect()
    }

    /// Absolute distance between `now` and the reported time.
    ///
    /// Activities stamped in the future (clock skew) age the same way as past ones.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        let delta = now - self.time;
        if delta < Duration::zero() {
            -delta
        } else {
            delta
        }
    }
}

impl PartialEq for Activity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Activity {}

impl Hash for Activity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Activity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Activity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.as_bytes().cmp(other.id.as_bytes())
    }
}

/// Trims and collapses every whitespace run to a single space.
pub fn normalize_command(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn deserialize_command<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(normalize_command(raw.as_deref().unwrap_or_default()))
}
