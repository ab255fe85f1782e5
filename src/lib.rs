pub mod audio;
pub mod commands;
pub mod models;
pub mod notify;
pub mod plugins;
pub mod polling;
pub mod responder;
pub mod settings;
pub mod speech;
pub mod store;
pub mod utils;

use std::future::Future;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use tokio::sync::mpsc;

use audio::AudioEngineHandle;
use commands::CommandSet;
use notify::LogNotifier;
use plugins::{HandlerContext, HandlerRegistry, PluginManager};
use polling::{
    ActivityProcessor, CycleOutcome, FileActivitySource, PollController, ProcessorConfig, TriggerResult,
};
use responder::{ResponseSink, Responder};
use settings::{config_dir, SettingsStore, SETTINGS_FILE};
use speech::SpeechEngine;

/// Set to any non-empty value to log at debug level.
pub const DEBUG_ENV: &str = "ECHODO_DEBUG";

const USAGE: &str = "usage: echodo [run | once | test <words...>]";

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliMode {
    /// Poll until Ctrl-C; SIGUSR1 requests an immediate cycle.
    Run,
    /// A single poll cycle, then exit.
    Once,
    /// Dispatch the given words as a synthetic activity.
    Test(String),
}

impl CliMode {
    fn parse(args: &[String]) -> Result<Self> {
        match args.split_first() {
            None => Ok(CliMode::Run),
            Some((cmd, rest)) => match cmd.as_str() {
                "run" if rest.is_empty() => Ok(CliMode::Run),
                "once" if rest.is_empty() => Ok(CliMode::Once),
                "test" if !rest.is_empty() => Ok(CliMode::Test(rest.join(" "))),
                _ => bail!("{USAGE}"),
            },
        }
    }
}

pub(crate) struct AppState {
    pub(crate) settings: SettingsStore,
    pub(crate) processor: Arc<ActivityProcessor>,
    audio: AudioEngineHandle,
}

impl AppState {
    fn build(settings: SettingsStore) -> Result<Self> {
        let current = settings.settings();

        let speech = SpeechEngine::new(current.speech.clone());
        if current.tts_enabled {
            if let Err(err) = speech.validate() {
                warn!("Spoken responses disabled: {err:#}");
            }
        }
        let audio = AudioEngineHandle::new();
        if (current.volume - 1.0).abs() > f32::EPSILON {
            audio.set_volume(current.volume)?;
        }
        let responder = Responder::new(speech, audio.clone(), current.tts_enabled);
        let sink: Arc<dyn ResponseSink> = Arc::new(responder);

        let base_dir = settings.base_dir().to_path_buf();
        let commands_path = settings.resolve(&current.commands_file);
        let commands = CommandSet::load(&commands_path, &base_dir)
            .with_context(|| format!("Failed to load commands from {}", commands_path.display()))?;

        let ctx = HandlerContext { sink, base_dir };
        let plugins = PluginManager::from_commands(&commands, &HandlerRegistry::with_builtins(), &ctx)?;
        if plugins.is_empty() {
            warn!("No enabled commands in {}", commands_path.display());
        } else {
            info!("Loaded {} commands", plugins.len());
        }

        let source = FileActivitySource::new(settings.resolve(&current.activity_feed_file));
        let processor = ActivityProcessor::new(
            Arc::new(source),
            Arc::new(plugins),
            Arc::new(LogNotifier),
            ProcessorConfig {
                time_tolerance: current.time_tolerance(),
                snapshot_path: settings.resolve(&current.snapshot_file),
            },
        );

        Ok(Self {
            settings,
            processor: Arc::new(processor),
            audio,
        })
    }
}

fn init_logging() {
    let level = if std::env::var_os(DEBUG_ENV).is_some_and(|v| !v.is_empty()) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

pub fn run() -> Result<()> {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = CliMode::parse(&args)?;

    log::info!("EchoDo starting up...");

    let config_dir = config_dir()?;
    let settings = SettingsStore::new(config_dir.join(SETTINGS_FILE))?;
    info!("Using settings from {}", settings.path().display());
    let state = AppState::build(settings)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    let result = runtime.block_on(run_mode(&state, mode));
    state.audio.stop();
    result
}

async fn run_mode(state: &AppState, mode: CliMode) -> Result<()> {
    match mode {
        CliMode::Test(words) => {
            match state.processor.test_command(&words).await {
                Some(processed) => info!("Test command \"{words}\" processed by {processed} handlers"),
                None => warn!("Test command \"{words}\" was not dispatched"),
            }
            Ok(())
        }
        CliMode::Once => match state.processor.run_poll_cycle().await {
            CycleOutcome::Failed(reason) => bail!("poll cycle failed: {reason}"),
            CycleOutcome::SessionInvalid(reason) => bail!("activity session invalid: {reason}"),
            _ => Ok(()),
        },
        CliMode::Run => {
            let interval = state.settings.settings().query_interval();
            let mut controller = PollController::new();
            controller.start(Arc::clone(&state.processor), interval)?;

            let (wakeup_tx, wakeup_rx) = mpsc::channel(1);
            forward_wakeup_signal(wakeup_tx)?;
            let ctrl_c = async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl-C: {err}");
                    std::future::pending::<()>().await;
                }
            };
            serve_until_shutdown(&controller, ctrl_c, wakeup_rx).await;
            info!("Shutting down");
            controller.stop().await?;

            let stats = state.processor.stats();
            info!(
                "{} queries, {} activities processed",
                stats.total_queries, stats.total_processed
            );
            Ok(())
        }
    }
}

/// Turns wakeups into poll triggers until `shutdown` resolves.
async fn serve_until_shutdown(
    controller: &PollController,
    shutdown: impl Future<Output = ()>,
    mut wakeups: mpsc::Receiver<()>,
) {
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(()) = wakeups.recv() => match controller.trigger() {
                TriggerResult::Queued => info!("Poll requested"),
                TriggerResult::Coalesced => debug!("Poll already pending"),
                TriggerResult::NotRunning => warn!("Poll requested but the poll loop is not running"),
            },
        }
    }
}

#[cfg(unix)]
fn forward_wakeup_signal(tx: mpsc::Sender<()>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = signal(SignalKind::user_defined1()).context("Failed to listen for SIGUSR1")?;
    tokio::spawn(async move {
        while usr1.recv().await.is_some() {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn forward_wakeup_signal(_tx: mpsc::Sender<()>) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polling::FetchOutcome;
    use crate::polling::processor::testing::ScriptedSource;
    use crate::responder::testing::RecordingSink;
    use std::time::Duration;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_cli_modes() {
        assert_eq!(CliMode::parse(&[]).unwrap(), CliMode::Run);
        assert_eq!(CliMode::parse(&args(&["once"])).unwrap(), CliMode::Once);
        assert_eq!(
            CliMode::parse(&args(&["test", "simon", "says", "hi"])).unwrap(),
            CliMode::Test("simon says hi".into())
        );
        assert!(CliMode::parse(&args(&["test"])).is_err());
        assert!(CliMode::parse(&args(&["dance"])).is_err());
    }

    #[tokio::test]
    async fn app_state_wires_commands_and_feed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("commands.json"),
            r#"{"commands": [{"id": "echo", "trigger": {"keyPhrases": ["simon says"]}, "action": {"kind": "speak"}}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("activities.json"), r#"{"activities": []}"#).unwrap();
        let settings_path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&settings_path, r#"{"ttsEnabled": false}"#).unwrap();

        let state = AppState::build(SettingsStore::new(settings_path).unwrap()).unwrap();
        let outcome = state.processor.run_poll_cycle().await;

        assert!(matches!(outcome, CycleOutcome::Completed(_)));
        assert_eq!(state.processor.test_command("simon says hi").await, Some(1));
        state.audio.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn wakeups_trigger_cycles_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(ScriptedSource::default());
        source.push(FetchOutcome::Activities(Vec::new()));
        source.push(FetchOutcome::Activities(Vec::new()));
        let processor = Arc::new(ActivityProcessor::new(
            source,
            Arc::new(PluginManager::new(Arc::new(RecordingSink::default()))),
            Arc::new(LogNotifier),
            ProcessorConfig {
                time_tolerance: chrono::Duration::seconds(30),
                snapshot_path: dir.path().join("snapshot.json"),
            },
        ));
        let mut controller = PollController::new();
        controller
            .start(Arc::clone(&processor), Duration::from_secs(600))
            .unwrap();

        let (tx, rx) = mpsc::channel(1);
        let shutdown = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send(()).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        };
        serve_until_shutdown(&controller, shutdown, rx).await;
        controller.stop().await.unwrap();

        // The first tick fires at start; the wakeup adds one more.
        assert_eq!(processor.total_queries(), 2);
    }

    #[test]
    fn missing_commands_file_is_a_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsStore::new(dir.path().join(SETTINGS_FILE)).unwrap();
        assert!(AppState::build(settings).is_err());
    }
}
