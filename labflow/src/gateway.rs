//! Execution gateway: the controller-facing wrapper around the remote executor.
//!
//! Infers the environment and working directory for the generated script,
//! dispatches it exactly once, and reports the outcome as an
//! [`ExecutionUpdate`]. Retry policy lives in the controller.

use std::path::PathBuf;

use anyhow::{Result, bail};
use tracing::{info, instrument, warn};

use crate::core::error::WorkflowError;
use crate::core::routing::{RoutingTable, detect_workspace};
use crate::core::state_update::ExecutionUpdate;
use crate::core::types::{ExecutionResult, WorkflowState};
use crate::io::executor::{ExecRequest, RemoteExecutor};

/// Reason recorded when a specialist produced nothing to run.
pub const NO_SCRIPT: &str = "No script was generated for this step.";

pub struct Gateway<'a> {
    executor: &'a dyn RemoteExecutor,
    routes: &'a RoutingTable,
}

impl<'a> Gateway<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, routes: &'a RoutingTable) -> Self {
        Self { executor, routes }
    }

    /// Build the executor request for `script` given the sticky workspace.
    ///
    /// A workspace-creating script runs without a working directory.
    pub fn request_for(&self, script: &str, state: &WorkflowState) -> (ExecRequest, Option<PathBuf>) {
        let created = detect_workspace(script);
        let cwd = if created.is_some() {
            None
        } else {
            state.workspace.clone()
        };
        let request = ExecRequest {
            script: script.to_string(),
            cwd,
            environment: self.routes.environment_for_script(script).to_string(),
        };
        (request, created)
    }

    #[instrument(skip_all)]
    pub fn dispatch(&self, state: &WorkflowState) -> ExecutionUpdate {
        let Some(script) = state.generated_script.as_deref() else {
            warn!("no script to execute");
            return ExecutionUpdate {
                result: ExecutionResult::not_run(NO_SCRIPT),
                created_workspace: None,
            };
        };

        let (request, created) = self.request_for(script, state);
        info!(
            env = %request.environment,
            cwd = ?request.cwd,
            creates_workspace = created.is_some(),
            "dispatching script"
        );

        let result = match self.executor.execute(&request) {
            Ok(result) => result,
            Err(err) => {
                let error = WorkflowError::Transport(format!("{err:#}"));
                warn!(%error, "executor unreachable");
                ExecutionResult::not_run(error.to_string())
            }
        };
        if !result.success() {
            let error = WorkflowError::StepExecution(result.failure_message());
            warn!(exit_status = result.exit_status, %error, "step did not succeed");
        }

        ExecutionUpdate {
            result,
            created_workspace: created,
        }
    }

    /// Run a trivial command to confirm the executor is reachable.
    pub fn health_check(&self) -> Result<()> {
        let request = ExecRequest {
            script: "true".to_string(),
            cwd: None,
            environment: self.routes.default_environment().to_string(),
        };
        let result = self.executor.execute(&request)?;
        if !result.success() {
            bail!(
                "health check exited with status {}: {}",
                result.exit_status,
                result.failure_message()
            );
        }
        Ok(())
    }
}
