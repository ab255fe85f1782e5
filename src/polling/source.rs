//! The activity feed collaborator and raw-record parsing.
//!
//! The remote history returns records shaped like
//! `{"id", "activityStatus", "creationTimestamp" (ms since epoch), "description"}`
//! where `description` is itself a JSON string carrying the transcript as `summary`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::Activity;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawActivity {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub activity_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_millis")]
    pub creation_timestamp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityFeed {
    #[serde(default)]
    pub activities: Vec<RawActivity>,
}

/// What a fetch produced. A rejected session is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Activities(Vec<RawActivity>),
    SessionExpired(String),
}

/// Supplies the most recent activity records.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Returns the newest records; transport failures are `Err`.
    async fn fetch_recent_activities(&self) -> Result<FetchOutcome>;

    /// Re-establishes the session after a failed or rejected fetch.
    async fn reauthenticate(&self) -> Result<()> {
        Ok(())
    }
}

/// Reads an activity feed dump from disk on every fetch.
///
/// Lets an external fetcher (browser session, script) hand records to the
/// poller without this process knowing how they were obtained.
pub struct FileActivitySource {
    path: PathBuf,
}

impl FileActivitySource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ActivitySource for FileActivitySource {
    async fn fetch_recent_activities(&self) -> Result<FetchOutcome> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read activity feed {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(FetchOutcome::Activities(Vec::new()));
        }
        let feed: ActivityFeed = serde_json::from_str(&contents)
            .with_context(|| format!("invalid activity feed {}", self.path.display()))?;
        Ok(FetchOutcome::Activities(feed.activities))
    }
}

/// Converts a raw record; records without an id or status are skipped.
pub fn parse_activity(raw: &RawActivity) -> Option<Activity> {
    let id = raw.id.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let status = raw
        .activity_status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())?;
    let time = raw
        .creation_timestamp
        .and_then(millis_to_datetime)
        .unwrap_or_default();
    let command = raw
        .description
        .as_deref()
        .map(speech_summary)
        .unwrap_or_default();

    Some(Activity::new(status, time, id, command))
}

fn millis_to_datetime(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(millis.round() as i64).single()
}

#[derive(Deserialize)]
struct Description {
    #[serde(default)]
    summary: Option<String>,
}

/// Extracts the transcript from a record description, empty when absent.
fn speech_summary(description: &str) -> String {
    serde_json::from_str::<Description>(description)
        .ok()
        .and_then(|d| d.summary)
        .unwrap_or_default()
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
