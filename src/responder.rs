use std::path::Path;

use anyhow::Result;
use log::warn;

use crate::audio::AudioEngineHandle;
use crate::commands::{ResponseMessage, ResponseType};
use crate::speech::SpeechEngine;

/// Where command responses end up: spoken text or a played sound.
pub trait ResponseSink: Send + Sync {
    fn speak(&self, text: &str) -> Result<()>;
    fn play(&self, path: &Path) -> Result<()>;
}

/// Delivers a response message, substituting `failure_reason` into `[reason]`.
///
/// Sound responses fall back to speaking their text when the file is missing
/// or cannot be played. Sink failures are logged, never propagated.
pub fn process_response(
    sink: &dyn ResponseSink,
    message: &ResponseMessage,
    failure_reason: Option<&str>,
) {
    let text = message.render(failure_reason);

    if message.kind == ResponseType::Wav {
        let played = match message.file_name.as_deref() {
            Some(path) => sink.play(path).map_err(|err| {
                warn!("Failed to play sound response \"{}\": {err:#}", path.display());
            }),
            None => {
                warn!("Sound response has no file name");
                Err(())
            }
        };
        if played.is_ok() {
            return;
        }
    }

    if text.is_empty() {
        return;
    }
    if let Err(err) = sink.speak(&text) {
        warn!("Failed to speak response \"{text}\": {err:#}");
    }
}

/// Response sink backed by the speech program and the audio thread.
pub struct Responder {
    speech: SpeechEngine,
    audio: AudioEngineHandle,
    tts_enabled: bool,
}

impl Responder {
    pub fn new(speech: SpeechEngine, audio: AudioEngineHandle, tts_enabled: bool) -> Self {
        Self {
            speech,
            audio,
            tts_enabled,
        }
    }
}

impl ResponseSink for Responder {
    fn speak(&self, text: &str) -> Result<()> {
        if !self.tts_enabled {
            return Ok(());
        }
        self.speech.speak(text)
    }

    fn play(&self, path: &Path) -> Result<()> {
        self.audio.play_file(path)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Delivered {
        Spoken(String),
        Played(PathBuf),
    }

    /// Records deliveries; plays succeed only for paths listed in `playable`.
    #[derive(Default)]
    pub struct RecordingSink {
        pub delivered: Mutex<Vec<Delivered>>,
        pub playable: Vec<PathBuf>,
    }

    impl RecordingSink {
        pub fn delivered(&self) -> Vec<Delivered> {
            self.delivered.lock().unwrap().clone()
        }
    }

    impl ResponseSink for RecordingSink {
        fn speak(&self, text: &str) -> Result<()> {
            self.delivered
                .lock()
                .unwrap()
                .push(Delivered::Spoken(text.to_string()));
            Ok(())
        }

        fn play(&self, path: &Path) -> Result<()> {
            if !self.playable.iter().any(|p| p == path) {
                anyhow::bail!("cannot play {}", path.display());
            }
            self.delivered
                .lock()
                .unwrap()
                .push(Delivered::Played(path.to_path_buf()));
            Ok(())
        }
    }
}
