//! Text-to-speech through an external speech program (`say`, `espeak`, ...).

use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

const MIN_RATE: i32 = -10;
const MAX_RATE: i32 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SpeechSettings {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Relative speaking rate, -10 (slowest) to 10 (fastest); 0 keeps the
    /// program's default.
    #[serde(default)]
    pub rate: i32,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        let program = if cfg!(target_os = "macos") { "say" } else { "espeak" };
        Self {
            program: program.into(),
            args: Vec::new(),
            rate: 0,
        }
    }
}

pub struct SpeechEngine {
    settings: SpeechSettings,
}

impl SpeechEngine {
    pub fn new(mut settings: SpeechSettings) -> Self {
        settings.rate = settings.rate.clamp(MIN_RATE, MAX_RATE);
        Self { settings }
    }

    pub fn rate(&self) -> i32 {
        self.settings.rate
    }

    /// Starts speaking `text` without waiting for the utterance to finish.
    pub fn speak(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let args = self.command_args(text);
        debug!("speaking via {}: {:?}", self.settings.program, args);

        let child = Command::new(&self.settings.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start speech program '{}'", self.settings.program))?;

        // Reap in the background so finished utterances do not linger as zombies.
        std::thread::spawn(move || {
            let mut child = child;
            let _ = child.wait();
        });
        Ok(())
    }

    fn command_args(&self, text: &str) -> Vec<String> {
        let mut args = self.settings.args.clone();
        if let Some(flag) = self.rate_flag() {
            args.extend(flag);
        }
        args.push(text.to_string());
        args
    }

    // `say` takes words per minute with -r, `espeak` takes it with -s; both
    // default to roughly 175 wpm, so each rate step is 10% of that.
    fn rate_flag(&self) -> Option<[String; 2]> {
        if self.settings.rate == 0 {
            return None;
        }
        let wpm = (175 + self.settings.rate * 17).max(80);
        let program = std::path::Path::new(&self.settings.program)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        match program {
            "say" => Some(["-r".into(), wpm.to_string()]),
            "espeak" | "espeak-ng" => Some(["-s".into(), wpm.to_string()]),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.settings.program.trim().is_empty() {
            bail!("speech program is not configured");
        }
        Ok(())
    }
}
