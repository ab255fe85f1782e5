//! Sound-file playback on a dedicated thread.
//!
//! rodio's output stream is not `Send`, so a single `audio-engine` thread owns
//! it and everything else talks to that thread over a channel.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

const PLAY_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

enum AudioCommand {
    Play {
        path: PathBuf,
        reply: Sender<Result<(), String>>,
    },
    Stop,
    SetVolume(f32),
}

#[derive(Clone)]
pub struct AudioEngineHandle {
    tx: Arc<Mutex<Option<Sender<AudioCommand>>>>,
}

impl AudioEngineHandle {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AudioCommand>, String> {
        let mut guard = self.tx.lock().map_err(|e| e.to_string())?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();

        thread::Builder::new()
            .name("audio-engine".to_string())
            .spawn(move || {
                let mut output: Option<(OutputStream, OutputStreamHandle)> = None;
                let mut sink: Option<Sink> = None;
                let mut volume = 1.0_f32;

                fn ensure_output(
                    output: &mut Option<(OutputStream, OutputStreamHandle)>,
                ) -> Result<&OutputStreamHandle, String> {
                    if output.is_none() {
                        let pair = OutputStream::try_default()
                            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                        *output = Some(pair);
                    }
                    output
                        .as_ref()
                        .map(|(_, handle)| handle)
                        .ok_or_else(|| "audio output unavailable".to_string())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Play { path, reply } => {
                            // A new sound interrupts whatever is still playing.
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            let result = (|| -> Result<(), String> {
                                let file = File::open(&path)
                                    .map_err(|e| format!("{}: {}", path.display(), e))?;
                                let source = Decoder::new(BufReader::new(file))
                                    .map_err(|e| format!("{}: {}", path.display(), e))?;
                                let handle = ensure_output(&mut output)?;
                                let new_sink = Sink::try_new(handle)
                                    .map_err(|e| format!("Failed to create audio sink: {}", e))?;
                                new_sink.set_volume(volume);
                                new_sink.append(source);
                                sink = Some(new_sink);
                                Ok(())
                            })();
                            let _ = reply.send(result);
                        }
                        AudioCommand::Stop => {
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                        }
                        AudioCommand::SetVolume(v) => {
                            volume = v.clamp(0.0, 1.0);
                            if let Some(ref s) = sink {
                                s.set_volume(volume);
                            }
                        }
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    /// Starts playing `path`, returning once the file has been decoded and queued.
    pub fn play_file(&self, path: &Path) -> Result<()> {
        if !path.is_file() {
            bail!("sound file not found: {}", path.display());
        }

        let tx = self.ensure_thread().map_err(|e| anyhow!(e))?;
        let (reply_tx, reply_rx) = mpsc::channel();
        tx.send(AudioCommand::Play {
            path: path.to_path_buf(),
            reply: reply_tx,
        })
        .map_err(|e| anyhow!("audio engine stopped: {e}"))?;

        reply_rx
            .recv_timeout(PLAY_REPLY_TIMEOUT)
            .map_err(|e| anyhow!("audio engine did not respond: {e}"))?
            .map_err(|e| anyhow!("failed to play sound: {e}"))
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        let tx = self.ensure_thread().map_err(|e| anyhow!(e))?;
        tx.send(AudioCommand::SetVolume(volume))
            .map_err(|e| anyhow!("audio engine stopped: {e}"))
    }

    pub fn stop(&self) {
        if let Ok(Some(tx)) = self.tx.lock().map(|g| g.clone()) {
            let _ = tx.send(AudioCommand::Stop);
        }
    }
}

impl Default for AudioEngineHandle {
    fn default() -> Self {
        Self::new()
    }
}
