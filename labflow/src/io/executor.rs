//! Remote executor abstraction: run an opaque script in a named environment.
//!
//! The [`RemoteExecutor`] trait decouples the control loop from the transport
//! (currently the system `ssh` client, or a local `bash` for development).
//! Tests use scripted executors that return predetermined results without
//! spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::types::ExecutionResult;
use crate::io::config::ExecutorConfig;
use crate::io::observability::{
    CallRecord, ObservabilityEvent, ObservabilitySink, ProgressRecord, timestamp,
};
use crate::io::process::{CommandOutput, PollOptions, run_command_polled};

/// Parameters for one remote execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub script: String,
    /// Working directory; `None` runs in the login directory.
    pub cwd: Option<PathBuf>,
    /// Conda environment to activate.
    pub environment: String,
}

/// Abstraction over script execution backends.
///
/// `Err` means the script could not be run at all (transport failure); a
/// script that ran and failed is an `Ok` result with a non-zero status.
pub trait RemoteExecutor {
    fn execute(&self, request: &ExecRequest) -> Result<ExecutionResult>;
}

/// Quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Build the shell text that activates the environment, enters `cwd`, and runs the script.
///
/// A missing `cwd` fails the script rather than being recreated.
pub fn compose_command(conda_root: Option<&str>, request: &ExecRequest) -> String {
    let mut parts = Vec::new();
    if let Some(root) = conda_root.filter(|root| !root.trim().is_empty()) {
        parts.push(format!(
            "source {}/etc/profile.d/conda.sh",
            root.trim_end_matches('/')
        ));
        parts.push(format!("conda activate {}", shell_quote(&request.environment)));
    }
    if let Some(cwd) = &request.cwd {
        parts.push(format!("cd {}", shell_quote(&cwd.to_string_lossy())));
    }

    let mut command = parts.join(" && ");
    if command.is_empty() {
        command.push_str(&request.script);
    } else {
        // Group the script so `&&` binds to the whole thing, not its first line.
        command.push_str(&format!(" && {{\n{}\n}}", request.script));
    }
    command
}

/// Executor that runs scripts on the lab's compute node over `ssh`.
pub struct SshExecutor<'a> {
    config: ExecutorConfig,
    sink: &'a dyn ObservabilitySink,
}

impl<'a> SshExecutor<'a> {
    pub fn new(config: ExecutorConfig, sink: &'a dyn ObservabilitySink) -> Self {
        Self { config, sink }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.config.connect_timeout_secs))
            .arg("-p")
            .arg(self.config.port.to_string())
            .arg(format!("{}@{}", self.config.user, self.config.host))
            .arg("bash -s");
        cmd
    }
}

impl RemoteExecutor for SshExecutor<'_> {
    #[instrument(skip_all, fields(host = %self.config.host, env = %request.environment))]
    fn execute(&self, request: &ExecRequest) -> Result<ExecutionResult> {
        info!(cwd = ?request.cwd, "running remote script");
        let composed = compose_command(self.config.conda_root.as_deref(), request);
        run_observed(self.command(), &composed, request, &self.config, self.sink)
            .context("run script over ssh")
    }
}

/// Executor that runs scripts with the local `bash`.
pub struct LocalExecutor<'a> {
    config: ExecutorConfig,
    sink: &'a dyn ObservabilitySink,
}

impl<'a> LocalExecutor<'a> {
    pub fn new(config: ExecutorConfig, sink: &'a dyn ObservabilitySink) -> Self {
        Self { config, sink }
    }
}

impl RemoteExecutor for LocalExecutor<'_> {
    #[instrument(skip_all, fields(env = %request.environment))]
    fn execute(&self, request: &ExecRequest) -> Result<ExecutionResult> {
        info!(cwd = ?request.cwd, "running local script");
        let composed = compose_command(self.config.conda_root.as_deref(), request);
        let mut cmd = Command::new("bash");
        cmd.arg("-s");
        run_observed(cmd, &composed, request, &self.config, self.sink)
            .context("run script with local bash")
    }
}

/// Run `cmd` with `composed` on stdin, recording progress and the finished call.
fn run_observed(
    cmd: Command,
    composed: &str,
    request: &ExecRequest,
    config: &ExecutorConfig,
    sink: &dyn ObservabilitySink,
) -> Result<ExecutionResult> {
    debug!(script_bytes = composed.len(), "dispatching script");
    let options = PollOptions {
        poll_interval: Duration::from_millis(config.poll_interval_ms),
        progress_interval: Duration::from_secs(config.progress_interval_secs),
        output_limit_bytes: config.output_limit_bytes,
    };
    let mut on_progress = |elapsed: Duration| {
        info!(
            elapsed_secs = elapsed.as_secs(),
            "command still running"
        );
        let event = ObservabilityEvent::Progress(ProgressRecord::new(&request.environment, elapsed));
        if let Err(err) = sink.record(&event) {
            warn!(err = %err, "failed to record progress");
        }
    };

    let start = Instant::now();
    let output = match run_command_polled(cmd, Some(composed.as_bytes()), options, &mut on_progress)
    {
        Ok(output) => output,
        Err(err) => {
            // The call never produced a result; log it as not run.
            let failed = ExecutionResult::not_run(format!("{err:#}"));
            record_call(sink, request, &failed, start.elapsed());
            return Err(err);
        }
    };
    let result = to_result(&output);
    record_call(sink, request, &result, output.elapsed);

    if result.success() {
        debug!(elapsed_ms = output.elapsed.as_millis() as u64, "script succeeded");
    } else {
        warn!(exit_status = result.exit_status, "script failed");
    }
    Ok(result)
}

fn record_call(
    sink: &dyn ObservabilitySink,
    request: &ExecRequest,
    result: &ExecutionResult,
    elapsed: Duration,
) {
    let record = ObservabilityEvent::Call(CallRecord {
        ts: timestamp(),
        environment: request.environment.clone(),
        cwd: request.cwd.clone(),
        script: request.script.clone(),
        exit_status: result.exit_status,
        stdout: result.stdout.clone(),
        stderr: result.stderr.clone(),
        elapsed_ms: elapsed.as_millis() as u64,
    });
    if let Err(err) = sink.record(&record) {
        warn!(err = %err, "failed to record call");
    }
}

fn to_result(output: &CommandOutput) -> ExecutionResult {
    ExecutionResult {
        stdout: output.stdout_lossy(),
        stderr: output.stderr_lossy(),
        exit_status: output.exit_code(),
    }
}
