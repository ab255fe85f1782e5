use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::commands::ActionSpec;
use crate::responder::ResponseSink;

use super::handler::ActivityHandler;
use super::launcher::LaunchHandler;
use super::sound::PlaySoundHandler;
use super::speak::SpeakHandler;

/// Shared services a handler may need when it is constructed.
#[derive(Clone)]
pub struct HandlerContext {
    pub sink: Arc<dyn ResponseSink>,
    /// Directory relative file parameters resolve against.
    pub base_dir: PathBuf,
}

pub type HandlerFactory =
    Box<dyn Fn(&ActionSpec, &HandlerContext) -> Result<Box<dyn ActivityHandler>> + Send + Sync>;

/// Maps an action kind to the factory that builds its handler.
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in `launch`, `speak` and `play` handlers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("launch", LaunchHandler::from_spec);
        registry.register("speak", SpeakHandler::from_spec);
        registry.register("play", PlaySoundHandler::from_spec);
        registry
    }

    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ActionSpec, &HandlerContext) -> Result<Box<dyn ActivityHandler>> + Send + Sync + 'static,
    {
        self.factories
            .insert(kind.to_ascii_lowercase(), Box::new(factory));
    }

    pub fn build(&self, spec: &ActionSpec, ctx: &HandlerContext) -> Result<Box<dyn ActivityHandler>> {
        let factory = self
            .factories
            .get(&spec.kind.to_ascii_lowercase())
            .ok_or_else(|| anyhow!("unknown action kind '{}'", spec.kind))?;
        factory(spec, ctx)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::testing::RecordingSink;
    use serde_json::json;

    fn ctx() -> HandlerContext {
        HandlerContext {
            sink: Arc::new(RecordingSink::default()),
            base_dir: PathBuf::from("."),
        }
    }

    #[test]
    fn builtins_are_registered() {
        let registry = HandlerRegistry::with_builtins();
        let mut kinds: Vec<_> = registry.kinds().collect();
        kinds.sort();
        assert_eq!(kinds, ["launch", "play", "speak"]);
    }

    #[test]
    fn kinds_are_case_insensitive() {
        let registry = HandlerRegistry::with_builtins();
        let spec = ActionSpec {
            kind: "Speak".into(),
            parameters: json!({"text": "hi"}),
        };
        assert_eq!(registry.build(&spec, &ctx()).unwrap().name(), "speak");
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let registry = HandlerRegistry::with_builtins();
        let spec = ActionSpec {
            kind: "teleport".into(),
            parameters: serde_json::Value::Null,
        };
        let err = registry.build(&spec, &ctx()).err().unwrap();
        assert!(err.to_string().contains("unknown action kind"));
    }
}
