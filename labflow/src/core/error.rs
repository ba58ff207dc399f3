//! Error taxonomy for the control loop.
//!
//! Only the fatal kinds ever reach a caller, and they do so as the text of
//! `WorkflowState::fatal_error`, never as an `Err` out of the loop.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// `current_step` is not an element of `plan`.
    #[error("plan synchronization error: current step is not part of the plan")]
    PlanSynchronization,

    #[error("planning parse error: {0}")]
    PlanningParse(String),

    /// The planning collaborator itself failed (transport, empty request).
    #[error("planning failed: {0}")]
    Planning(String),

    /// Non-zero exit from the remote executor. Consumes a retry.
    #[error("step execution failed: {0}")]
    StepExecution(String),

    #[error("Task failed after {attempts} attempts. Last error: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    /// The remote executor could not be reached. Consumes a retry, like `StepExecution`.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("step budget of {budget} transitions exhausted")]
    StepBudgetExhausted { budget: u32 },

    #[error("no specialist registered for route '{0}'")]
    UnknownAgent(String),

    #[error("state invariant violated: {0}")]
    InvariantViolation(String),
}
