use super::state::Transition;
use std::path::PathBuf;
use tokio::process::Command;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Hook name for a transition: `service-<name>-<started|stopped>`.
pub fn hook_name(transition: &Transition) -> String {
    format!("service-{}-{}", transition.service(), transition.kind())
}

/// Hook path as passed to `juju-exec`: `hooks/service-<name>-<kind>`.
pub fn hook_path(transition: &Transition) -> String {
    format!("hooks/{}", hook_name(transition))
}

/// Runs the charm hook for each transition through `juju-exec`.
///
/// Delivery is at most once: a failed or unreachable command is logged and
/// the transition is dropped.
#[derive(Debug, Clone)]
pub struct HookDispatcher {
    juju_exec: PathBuf,
    unit: String,
}

impl HookDispatcher {
    pub fn new(juju_exec: impl Into<PathBuf>, unit: impl Into<String>) -> Self {
        Self {
            juju_exec: juju_exec.into(),
            unit: unit.into(),
        }
    }

    pub fn command_args(&self, transition: &Transition) -> [String; 2] {
        [self.unit.clone(), hook_path(transition)]
    }

    /// Run the hook and wait for it. Returns whether it exited successfully.
    pub async fn run(&self, transition: &Transition) -> bool {
        let args = self.command_args(transition);
        let command_line = format!("{} {}", self.juju_exec.display(), args.join(" "));
        debug!(hook = %hook_name(transition), command = %command_line, "Invoking hook");

        match Command::new(&self.juju_exec).args(&args).status().await {
            Ok(status) if status.success() => {
                info!(command = %command_line, "Hook command succeeded");
                true
            }
            Ok(status) => {
                error!(
                    command = %command_line,
                    code = ?status.code(),
                    "Hook command failed"
                );
                false
            }
            Err(e) => {
                error!(command = %command_line, error = %e, "Failed to run hook command");
                false
            }
        }
    }

    /// Run the hook in the background so signal delivery is never blocked.
    pub fn spawn(&self, transition: Transition, tasks: &mut JoinSet<bool>) {
        let dispatcher = self.clone();
        tasks.spawn(async move { dispatcher.run(&transition).await });
    }
}
