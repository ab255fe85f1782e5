use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::commands::ActionSpec;
use crate::models::Activity;
use crate::responder::ResponseSink;

use super::handler::{fill_query, ActivityHandler};
use super::registry::HandlerContext;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeakParameters {
    #[serde(default = "default_text")]
    text: String,
}

fn default_text() -> String {
    "{query}".into()
}

/// Speaks a fixed text, or echoes the residual query back by default.
pub struct SpeakHandler {
    text: String,
    sink: Arc<dyn ResponseSink>,
}

impl SpeakHandler {
    pub fn from_spec(spec: &ActionSpec, ctx: &HandlerContext) -> Result<Box<dyn ActivityHandler>> {
        let params: SpeakParameters = if spec.parameters.is_null() {
            SpeakParameters { text: default_text() }
        } else {
            serde_json::from_value(spec.parameters.clone()).context("invalid speak parameters")?
        };
        Ok(Box::new(Self {
            text: params.text,
            sink: Arc::clone(&ctx.sink),
        }))
    }
}

impl ActivityHandler for SpeakHandler {
    fn name(&self) -> &str {
        "speak"
    }

    fn process_activity(&self, _activity: &Activity, query: Option<&str>) -> Result<()> {
        let text = fill_query(&self.text, query);
        if text.trim().is_empty() {
            bail!("nothing to say");
        }
        self.sink.speak(&text)
    }
}
