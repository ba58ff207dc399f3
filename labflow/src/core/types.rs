//! Workflow state threaded through every node of the control loop.
//!
//! These types carry no behavior beyond small accessors. All mutation goes
//! through [`crate::core::state_update::apply_update`] so each field has one
//! documented merge rule.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identifier of a registered specialist worker (e.g. `obitools`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Author of a request-history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One plan entry. The agent tag is chosen once at planning time and carried
/// verbatim, so retries never re-infer routing from prose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub description: String,
    pub agent: AgentId,
}

impl PlanStep {
    pub fn new(description: impl Into<String>, agent: AgentId) -> Self {
        Self {
            description: description.into(),
            agent,
        }
    }
}

/// Where control goes after the node that set it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "agent")]
pub enum Route {
    Specialist(AgentId),
    Executor,
}

/// Point-in-time listing of input resources captured during planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Directory the listing was taken from, when one was found in the request.
    pub root: Option<PathBuf>,
    /// Listing text, already bounded to the configured character budget.
    pub listing: String,
    pub truncated: bool,
}

/// Outcome of one remote execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl ExecutionResult {
    /// Exit status used when the script never ran (transport failure, no script).
    pub const NOT_RUN: i32 = -1;

    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Result standing in for an execution that never reached the remote side.
    pub fn not_run(reason: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: reason.into(),
            exit_status: Self::NOT_RUN,
        }
    }

    /// Text appended to the error log when this execution failed.
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("script exited with status {}", self.exit_status)
        } else {
            stderr.to_string()
        }
    }
}

/// The single mutable record threaded through the loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Append-only; the last entry is the active request.
    pub messages: Vec<Message>,
    pub plan: Vec<PlanStep>,
    pub current_step: Option<PlanStep>,
    pub next_agent: Option<Route>,
    pub resource_snapshot: Option<ResourceSnapshot>,
    pub generated_script: Option<String>,
    /// Sticky working directory, set by the first successful workspace-creating step.
    pub workspace: Option<PathBuf>,
    pub last_execution: Option<ExecutionResult>,
    pub errors: Vec<String>,
    /// Consecutive failed attempts at `current_step`.
    pub retry_count: u32,
    /// True between a controller dispatch and the execution that answers it.
    pub step_pending: bool,
    pub final_answer: Option<String>,
    pub fatal_error: Option<String>,
}

impl WorkflowState {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(request)],
            plan: Vec::new(),
            current_step: None,
            next_agent: None,
            resource_snapshot: None,
            generated_script: None,
            workspace: None,
            last_execution: None,
            errors: Vec::new(),
            retry_count: 0,
            step_pending: false,
            final_answer: None,
            fatal_error: None,
        }
    }

    /// Content of the most recent user message.
    pub fn active_request(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    pub fn is_terminal(&self) -> bool {
        self.final_answer.is_some() || self.fatal_error.is_some()
    }

    /// Index of `current_step` in `plan`, by value equality.
    pub fn current_index(&self) -> Option<usize> {
        let current = self.current_step.as_ref()?;
        self.plan.iter().position(|step| step == current)
    }

    pub fn snapshot_listing(&self) -> Option<&str> {
        self.resource_snapshot
            .as_ref()
            .map(|snapshot| snapshot.listing.as_str())
    }
}
