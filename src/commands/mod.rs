//! Command definitions loaded once at startup.
//!
//! A command ties a trigger to an action (the handler that runs it) and an
//! optional response. The command file is JSON:
//!
//! ```json
//! {"commands": [{"id": "lights", "trigger": {"keyPhrases": ["simon says"]},
//!                "action": {"kind": "launch", "parameters": {"program": "lights.sh"}}}]}
//! ```

pub mod response;
pub mod trigger;

pub use response::{Response, ResponseMessage, ResponseType};
pub use trigger::{KeyPhrase, MatchStyle, Trigger, TriggerMatch};

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::models::Activity;

/// Which handler runs a command, and its handler-specific parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    pub kind: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub usage: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub trigger: Trigger,
    pub action: ActionSpec,
    #[serde(default)]
    pub response: Option<Response>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Command {
    pub fn is_match(&self, activity: &Activity) -> Option<TriggerMatch> {
        self.trigger.is_match(activity)
    }

    pub fn succeeded_response(&self) -> Option<&ResponseMessage> {
        self.response.as_ref().and_then(|r| r.succeeded.as_ref())
    }

    pub fn failed_response(&self) -> Option<&ResponseMessage> {
        self.response.as_ref().and_then(|r| r.failed.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CommandSet {
    #[serde(default)]
    pub commands: Vec<Command>,
}

impl CommandSet {
    /// Reads and validates the command file. Relative response sound files
    /// resolve against `base_dir`.
    pub fn load(path: &Path, base_dir: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read commands from {}", path.display()))?;
        let set = Self::parse(&contents, base_dir)
            .with_context(|| format!("Invalid command file {}", path.display()))?;
        Ok(set)
    }

    pub fn parse(contents: &str, base_dir: &Path) -> Result<Self> {
        let mut set: CommandSet = serde_json::from_str(contents)?;

        let mut seen = HashSet::new();
        for command in &mut set.commands {
            if command.id.trim().is_empty() {
                bail!("command with empty id");
            }
            if !seen.insert(command.id.clone()) {
                bail!("duplicate command id '{}'", command.id);
            }
            if command.trigger.key_phrases.iter().all(KeyPhrase::is_empty) {
                warn!("Command '{}' has no key phrases and will never match", command.id);
            }
            if let Some(response) = command.response.as_mut() {
                for message in [response.succeeded.as_mut(), response.failed.as_mut()]
                    .into_iter()
                    .flatten()
                {
                    message.resolve_paths(base_dir);
                }
            }
        }

        Ok(set)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter().filter(|command| command.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SAMPLE: &str = r#"{
        "commands": [
            {
                "id": "lights",
                "description": "Turn lights on",
                "trigger": {"keyPhrases": ["simon says"], "matchStyle": "startsWith"},
                "action": {"kind": "launch", "parameters": {"program": "lights.sh"}},
                "response": {
                    "succeeded": {"type": "tts", "value": "done"},
                    "failed": {"type": "wav", "fileName": "sad.wav", "value": "failed: [reason]"}
                }
            },
            {
                "id": "disabled",
                "enabled": false,
                "trigger": {"keyPhrases": ["stop"], "matchStyle": "endsWith"},
                "action": {"kind": "speak"}
            }
        ]
    }"#;

    #[test]
    fn parses_commands_and_defaults() {
        let set = CommandSet::parse(SAMPLE, Path::new("/cfg")).unwrap();
        assert_eq!(set.commands.len(), 2);

        let lights = &set.commands[0];
        assert!(lights.enabled);
        assert_eq!(lights.action.kind, "launch");
        assert_eq!(lights.succeeded_response().unwrap().value, "done");
        assert_eq!(
            lights.failed_response().unwrap().file_name,
            Some(PathBuf::from("/cfg/sad.wav"))
        );

        let ids: Vec<_> = set.enabled().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["lights"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let raw = r#"{"commands": [
            {"id": "a", "trigger": {"keyPhrases": ["x"]}, "action": {"kind": "speak"}},
            {"id": "a", "trigger": {"keyPhrases": ["y"]}, "action": {"kind": "speak"}}
        ]}"#;
        let err = CommandSet::parse(raw, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("duplicate command id"));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CommandSet::load(&dir.path().join("missing.json"), dir.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to read commands"));
    }
}
