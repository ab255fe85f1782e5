use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use crate::speech::SpeechSettings;
use crate::utils::write_atomic;

pub const CONFIG_DIR_ENV: &str = "ECHODO_CONFIG_DIR";
pub const SETTINGS_FILE: &str = "settings.json";

const DEFAULT_QUERY_INTERVAL_SECS: u64 = 3;
const DEFAULT_TIME_TOLERANCE_SECS: f64 = 30.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub query_interval_secs: u64,
    pub time_tolerance_secs: f64,
    pub commands_file: PathBuf,
    pub snapshot_file: PathBuf,
    pub activity_feed_file: PathBuf,
    pub tts_enabled: bool,
    /// Playback volume for sound responses, 0.0 to 1.0.
    pub volume: f32,
    pub speech: SpeechSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            query_interval_secs: DEFAULT_QUERY_INTERVAL_SECS,
            time_tolerance_secs: DEFAULT_TIME_TOLERANCE_SECS,
            commands_file: "commands.json".into(),
            snapshot_file: "processed-activities.json".into(),
            activity_feed_file: "activities.json".into(),
            tts_enabled: true,
            volume: 1.0,
            speech: SpeechSettings::default(),
        }
    }
}

impl Settings {
    pub fn query_interval(&self) -> Duration {
        if self.query_interval_secs == 0 {
            warn!("queryIntervalSecs must be positive, using {DEFAULT_QUERY_INTERVAL_SECS}");
            return Duration::from_secs(DEFAULT_QUERY_INTERVAL_SECS);
        }
        Duration::from_secs(self.query_interval_secs)
    }

    /// Dispatch window around "now"; non-positive values fall back to the default.
    pub fn time_tolerance(&self) -> chrono::Duration {
        let secs = if self.time_tolerance_secs.is_finite() && self.time_tolerance_secs > 0.0 {
            self.time_tolerance_secs
        } else {
            warn!("timeToleranceSecs must be positive, using {DEFAULT_TIME_TOLERANCE_SECS}");
            DEFAULT_TIME_TOLERANCE_SECS
        };
        chrono::Duration::milliseconds((secs * 1000.0).round() as i64)
    }
}

/// Resolves the configuration directory: `ECHODO_CONFIG_DIR` wins, then the
/// platform config location.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    ProjectDirs::from("com", "echodo", "echodo")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow!("could not determine a configuration directory; set {CONFIG_DIR_ENV}"))
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring invalid settings in {}: {err}", path.display());
                Settings::default()
            })
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory relative file settings resolve against.
    pub fn base_dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn settings(&self) -> Settings {
        self.data
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn update(&self, settings: Settings) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_relative() {
            self.base_dir().join(file)
        } else {
            file.to_path_buf()
        }
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        write_atomic(&self.path, &serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join(SETTINGS_FILE)).unwrap();
        let settings = store.settings();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.query_interval(), Duration::from_secs(3));
        assert_eq!(settings.time_tolerance(), chrono::Duration::seconds(30));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, r#"{"timeToleranceSecs": 12.5, "ttsEnabled": false}"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().settings();
        assert_eq!(settings.time_tolerance(), chrono::Duration::milliseconds(12_500));
        assert!(!settings.tts_enabled);
        assert_eq!(settings.query_interval_secs, 3);
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "{ nope").unwrap();
        assert_eq!(SettingsStore::new(path).unwrap().settings(), Settings::default());
    }

    #[test]
    fn invalid_durations_use_defaults() {
        let settings = Settings {
            query_interval_secs: 0,
            time_tolerance_secs: -1.0,
            ..Settings::default()
        };
        assert_eq!(settings.query_interval(), Duration::from_secs(3));
        assert_eq!(settings.time_tolerance(), chrono::Duration::seconds(30));
    }

    #[test]
    fn update_persists_and_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.settings();
        settings.query_interval_secs = 10;
        store.update(settings).unwrap();

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.settings().query_interval_secs, 10);
        assert_eq!(
            reloaded.resolve(Path::new("commands.json")),
            dir.path().join("commands.json")
        );
        assert_eq!(reloaded.resolve(Path::new("/abs/feed.json")), PathBuf::from("/abs/feed.json"));
    }
}
