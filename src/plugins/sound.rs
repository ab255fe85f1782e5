use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::commands::ActionSpec;
use crate::models::Activity;
use crate::responder::ResponseSink;

use super::handler::ActivityHandler;
use super::registry::HandlerContext;

#[derive(Debug, Clone, Deserialize)]
struct SoundParameters {
    file: PathBuf,
}

/// Plays a sound file whenever its command triggers.
pub struct PlaySoundHandler {
    file: PathBuf,
    sink: Arc<dyn ResponseSink>,
}

impl PlaySoundHandler {
    pub fn from_spec(spec: &ActionSpec, ctx: &HandlerContext) -> Result<Box<dyn ActivityHandler>> {
        let params: SoundParameters = serde_json::from_value(spec.parameters.clone())
            .context("invalid play parameters")?;
        let file = if params.file.is_relative() {
            ctx.base_dir.join(params.file)
        } else {
            params.file
        };
        Ok(Box::new(Self {
            file,
            sink: Arc::clone(&ctx.sink),
        }))
    }
}

impl ActivityHandler for PlaySoundHandler {
    fn name(&self) -> &str {
        "play"
    }

    fn initialize(&mut self) -> Result<()> {
        if !self.file.is_file() {
            bail!("sound file {} does not exist", self.file.display());
        }
        Ok(())
    }

    fn process_activity(&self, _activity: &Activity, _query: Option<&str>) -> Result<()> {
        self.sink.play(&self.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::testing::{Delivered, RecordingSink};
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn plays_file_relative_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("chime.wav");
        std::fs::write(&wav, b"RIFF").unwrap();

        let sink = Arc::new(RecordingSink {
            playable: vec![wav.clone()],
            ..Default::default()
        });
        let ctx = HandlerContext {
            sink: sink.clone(),
            base_dir: dir.path().to_path_buf(),
        };
        let spec = ActionSpec {
            kind: "play".into(),
            parameters: json!({"file": "chime.wav"}),
        };

        let mut handler = PlaySoundHandler::from_spec(&spec, &ctx).unwrap();
        handler.initialize().unwrap();
        let activity = Activity::new("SUCCESS", Utc::now(), "1", "ring");
        handler.process_activity(&activity, None).unwrap();

        assert_eq!(sink.delivered(), [Delivered::Played(wav)]);
    }

    #[test]
    fn missing_file_fails_initialization() {
        let ctx = HandlerContext {
            sink: Arc::new(RecordingSink::default()),
            base_dir: PathBuf::from("/nowhere"),
        };
        let spec = ActionSpec {
            kind: "play".into(),
            parameters: json!({"file": "missing.wav"}),
        };
        let mut handler = PlaySoundHandler::from_spec(&spec, &ctx).unwrap();
        assert!(handler.initialize().is_err());
    }
}
