//! Plugin dispatch: routes a matched activity to every enabled handler whose
//! command trigger accepts it, then delivers that command's response.

pub mod handler;
pub mod launcher;
pub mod registry;
pub mod sound;
pub mod speak;

pub use handler::ActivityHandler;
pub use registry::{HandlerContext, HandlerRegistry};

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{info, warn};

use crate::commands::{Command, CommandSet};
use crate::models::Activity;
use crate::responder::{process_response, ResponseSink};

struct Plugin {
    command: Command,
    handler: Box<dyn ActivityHandler>,
}

pub struct PluginManager {
    plugins: Vec<Plugin>,
    sink: Arc<dyn ResponseSink>,
}

impl PluginManager {
    pub fn new(sink: Arc<dyn ResponseSink>) -> Self {
        Self {
            plugins: Vec::new(),
            sink,
        }
    }

    /// Builds one handler per enabled command, in file order.
    pub fn from_commands(
        commands: &CommandSet,
        registry: &HandlerRegistry,
        ctx: &HandlerContext,
    ) -> Result<Self> {
        let mut manager = Self::new(Arc::clone(&ctx.sink));
        for command in commands.enabled() {
            let handler = registry
                .build(&command.action, ctx)
                .with_context(|| format!("Failed to create handler for command '{}'", command.id))?;
            manager.register(command.clone(), handler)?;
        }
        Ok(manager)
    }

    /// Initializes and appends a handler. Disabled commands are skipped.
    pub fn register(&mut self, command: Command, mut handler: Box<dyn ActivityHandler>) -> Result<()> {
        if !command.enabled {
            info!("Skipping disabled command '{}'", command.id);
            return Ok(());
        }
        handler
            .initialize()
            .with_context(|| format!("Failed to initialize handler for command '{}'", command.id))?;
        info!("Registered {} handler for command '{}'", handler.name(), command.id);
        self.plugins.push(Plugin { command, handler });
        Ok(())
    }

    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.plugins.iter().map(|plugin| &plugin.command)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Runs every matching handler and returns how many succeeded.
    ///
    /// Handlers are independent: one failing or panicking does not stop the rest.
    pub fn dispatch(&self, activity: &Activity) -> usize {
        if activity.command().is_empty() {
            return 0;
        }

        let mut processed = 0;
        for plugin in &self.plugins {
            let Some(matched) = plugin.command.is_match(activity) else {
                continue;
            };

            let result = catch_unwind(AssertUnwindSafe(|| {
                plugin
                    .handler
                    .process_activity(activity, matched.query.as_deref())
            }))
            .unwrap_or_else(|payload| Err(anyhow!("handler panicked: {}", panic_message(&*payload))));

            match result {
                Ok(()) => {
                    processed += 1;
                    if let Some(response) = plugin.command.succeeded_response() {
                        process_response(self.sink.as_ref(), response, None);
                    }
                    info!(
                        "Command '{}' processed activity [{}]: {} \"{}\"",
                        plugin.command.id,
                        activity.status(),
                        activity.id(),
                        activity.command()
                    );
                }
                Err(err) => {
                    let reason = format!("{err:#}");
                    if let Some(response) = plugin.command.failed_response() {
                        process_response(self.sink.as_ref(), response, Some(&reason));
                    }
                    warn!(
                        "Command '{}' failed to process activity [{}]: {} \"{}\" - {}",
                        plugin.command.id,
                        activity.status(),
                        activity.id(),
                        activity.command(),
                        reason
                    );
                }
            }
        }
        processed
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{ActionSpec, MatchStyle, Response, ResponseMessage, Trigger};
    use crate::responder::testing::{Delivered, RecordingSink};
    use anyhow::bail;
    use chrono::Utc;
    use std::sync::Mutex;

    struct FakeHandler {
        fail_with: Option<&'static str>,
        calls: Arc<Mutex<Vec<Option<String>>>>,
    }

    impl ActivityHandler for FakeHandler {
        fn name(&self) -> &str {
            "fake"
        }

        fn process_activity(&self, _activity: &Activity, query: Option<&str>) -> Result<()> {
            self.calls.lock().unwrap().push(query.map(str::to_string));
            if let Some(reason) = self.fail_with {
                bail!(reason);
            }
            Ok(())
        }
    }

    fn command(id: &str, phrase: &str, style: MatchStyle) -> Command {
        Command {
            id: id.into(),
            description: String::new(),
            usage: String::new(),
            enabled: true,
            trigger: Trigger::new([phrase], style),
            action: ActionSpec {
                kind: "fake".into(),
                parameters: serde_json::Value::Null,
            },
            response: Some(Response {
                succeeded: Some(ResponseMessage::tts(&format!("{id} ok"))),
                failed: Some(ResponseMessage::tts(&format!("{id} failed: [reason]"))),
            }),
            notes: None,
        }
    }

    struct PanickingHandler;

    impl ActivityHandler for PanickingHandler {
        fn name(&self) -> &str {
            "panicking"
        }

        fn process_activity(&self, _activity: &Activity, _query: Option<&str>) -> Result<()> {
            panic!("handler bug");
        }
    }

    fn fake(fail_with: Option<&'static str>) -> (Box<dyn ActivityHandler>, Arc<Mutex<Vec<Option<String>>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let handler = FakeHandler {
            fail_with,
            calls: calls.clone(),
        };
        (Box::new(handler), calls)
    }

    fn activity(command: &str) -> Activity {
        Activity::new("SUCCESS", Utc::now(), "a-1", command)
    }

    #[test]
    fn matching_handler_gets_residual_query_and_success_response() {
        let sink = Arc::new(RecordingSink::default());
        let mut manager = PluginManager::new(sink.clone());
        let (handler, calls) = fake(None);
        manager
            .register(command("lights", "simon says", MatchStyle::StartsWith), handler)
            .unwrap();

        let processed = manager.dispatch(&activity("Simon Says turn on the lights"));

        assert_eq!(processed, 1);
        assert_eq!(*calls.lock().unwrap(), [Some("turn on the lights".to_string())]);
        assert_eq!(sink.delivered(), [Delivered::Spoken("lights ok".into())]);
    }

    #[test]
    fn no_match_processes_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let mut manager = PluginManager::new(sink.clone());
        let (handler, calls) = fake(None);
        manager
            .register(command("lights", "simon says", MatchStyle::StartsWith), handler)
            .unwrap();

        assert_eq!(manager.dispatch(&activity("what time is it")), 0);
        assert!(calls.lock().unwrap().is_empty());
        assert!(sink.delivered().is_empty());
    }

    #[test]
    fn failing_handler_does_not_block_others() {
        let sink = Arc::new(RecordingSink::default());
        let mut manager = PluginManager::new(sink.clone());
        let (broken, broken_calls) = fake(Some("door is open"));
        let (working, working_calls) = fake(None);
        manager
            .register(command("arm", "simon says", MatchStyle::StartsWith), broken)
            .unwrap();
        manager
            .register(command("chime", "alarm", MatchStyle::AnyOrder), working)
            .unwrap();

        let processed = manager.dispatch(&activity("simon says arm the alarm"));

        assert_eq!(processed, 1);
        assert_eq!(broken_calls.lock().unwrap().len(), 1);
        assert_eq!(*working_calls.lock().unwrap(), [None::<String>]);
        assert_eq!(
            sink.delivered(),
            [
                Delivered::Spoken("arm failed: door is open".into()),
                Delivered::Spoken("chime ok".into()),
            ]
        );
    }

    #[test]
    fn panicking_handler_is_reported_as_failure_and_others_still_run() {
        let sink = Arc::new(RecordingSink::default());
        let mut manager = PluginManager::new(sink.clone());
        let (working, working_calls) = fake(None);
        manager
            .register(
                command("buggy", "simon says", MatchStyle::StartsWith),
                Box::new(PanickingHandler),
            )
            .unwrap();
        manager
            .register(command("count", "simon says", MatchStyle::StartsWith), working)
            .unwrap();

        let processed = manager.dispatch(&activity("simon says count me"));

        assert_eq!(processed, 1);
        assert_eq!(*working_calls.lock().unwrap(), [Some("count me".to_string())]);
        assert_eq!(
            sink.delivered(),
            [
                Delivered::Spoken("buggy failed: handler panicked: handler bug".into()),
                Delivered::Spoken("count ok".into()),
            ]
        );
    }

    #[test]
    fn disabled_commands_are_not_registered() {
        let sink = Arc::new(RecordingSink::default());
        let mut manager = PluginManager::new(sink);
        let mut disabled = command("off", "simon says", MatchStyle::StartsWith);
        disabled.enabled = false;
        let (handler, calls) = fake(None);
        manager.register(disabled, handler).unwrap();

        assert!(manager.is_empty());
        assert_eq!(manager.dispatch(&activity("simon says hi")), 0);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn builds_from_command_file_with_registry() {
        let sink: Arc<dyn ResponseSink> = Arc::new(RecordingSink::default());
        let ctx = HandlerContext {
            sink,
            base_dir: std::path::PathBuf::from("."),
        };
        let commands = CommandSet::parse(
            r#"{"commands": [
                {"id": "echo", "trigger": {"keyPhrases": ["repeat"]}, "action": {"kind": "speak"}},
                {"id": "off", "enabled": false, "trigger": {"keyPhrases": ["x"]}, "action": {"kind": "teleport"}}
            ]}"#,
            std::path::Path::new("."),
        )
        .unwrap();

        let manager =
            PluginManager::from_commands(&commands, &HandlerRegistry::with_builtins(), &ctx).unwrap();
        let ids: Vec<_> = manager.commands().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["echo"]);
    }

    #[test]
    fn unknown_action_kind_fails_startup() {
        let ctx = HandlerContext {
            sink: Arc::new(RecordingSink::default()),
            base_dir: std::path::PathBuf::from("."),
        };
        let commands = CommandSet::parse(
            r#"{"commands": [{"id": "t", "trigger": {"keyPhrases": ["x"]}, "action": {"kind": "teleport"}}]}"#,
            std::path::Path::new("."),
        )
        .unwrap();
        let result = PluginManager::from_commands(&commands, &HandlerRegistry::with_builtins(), &ctx);
        assert!(result.is_err());
    }
}
