use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use log::{info, warn};
use serde::Deserialize;

use crate::commands::ActionSpec;
use crate::models::Activity;

use super::handler::{fill_query, ActivityHandler};
use super::registry::HandlerContext;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LaunchParameters {
    program: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    working_dir: Option<PathBuf>,
}

/// Starts an external program; `{query}` in its arguments becomes the
/// residual query. The program runs detached from the poll cycle.
pub struct LaunchHandler {
    name: String,
    params: LaunchParameters,
}

impl LaunchHandler {
    pub fn from_spec(spec: &ActionSpec, ctx: &HandlerContext) -> Result<Box<dyn ActivityHandler>> {
        let mut params: LaunchParameters = serde_json::from_value(spec.parameters.clone())
            .context("invalid launch parameters")?;
        if let Some(dir) = params.working_dir.as_mut() {
            if dir.is_relative() {
                *dir = ctx.base_dir.join(&*dir);
            }
        }
        Ok(Box::new(Self {
            name: format!("launch:{}", params.program),
            params,
        }))
    }

    fn build_args(&self, query: Option<&str>) -> Vec<String> {
        self.params
            .args
            .iter()
            .map(|arg| fill_query(arg, query))
            .filter(|arg| !arg.is_empty())
            .collect()
    }
}

impl ActivityHandler for LaunchHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> Result<()> {
        if self.params.program.trim().is_empty() {
            bail!("launch action needs a program");
        }
        if let Some(dir) = &self.params.working_dir {
            if !dir.is_dir() {
                bail!("working directory {} does not exist", dir.display());
            }
        }
        Ok(())
    }

    fn process_activity(&self, activity: &Activity, query: Option<&str>) -> Result<()> {
        let args = self.build_args(query);
        let mut command = Command::new(&self.params.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = &self.params.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("could not start {}", self.params.program))?;
        info!(
            "Launched {} (pid {}) for activity {}",
            self.params.program,
            child.id(),
            activity.id()
        );

        let program = self.params.program.clone();
        std::thread::spawn(move || match child.wait() {
            Ok(status) if !status.success() => warn!("{program} exited with {status}"),
            Ok(_) => {}
            Err(err) => warn!("failed to wait for {program}: {err}"),
        });
        Ok(())
    }
}
