//! Node outputs and the merge rules that fold them into [`WorkflowState`].
//!
//! Every node returns one [`StateUpdate`]; [`apply_update`] is the only place
//! that writes state. Per field:
//!
//! | field              | controller                 | worker  | execution                      |
//! |--------------------|----------------------------|---------|--------------------------------|
//! | `plan`             | replace (planning only)    | -       | -                              |
//! | `current_step`     | replace                    | -       | -                              |
//! | `next_agent`       | replace                    | replace | clear                          |
//! | `generated_script` | -                          | replace | clear                          |
//! | `workspace`        | -                          | -       | replace on success, if detected|
//! | `last_execution`   | -                          | -       | replace                        |
//! | `errors`           | clear on plan/advance      | -       | append on failure, clear on success |
//! | `retry_count`      | replace                    | -       | reset on success               |
//! | terminal fields    | set once                   | -       | -                              |
//!
//! Once a terminal field is set the state is frozen and updates are ignored.

use std::path::PathBuf;

use tracing::debug;

use crate::core::error::WorkflowError;
use crate::core::types::{
    AgentId, ExecutionResult, PlanStep, ResourceSnapshot, Route, WorkflowState,
};

/// Decision produced by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerUpdate {
    /// Plan synthesis finished; dispatch the first step to `first_agent`.
    Planned {
        plan: Vec<PlanStep>,
        snapshot: ResourceSnapshot,
        first_agent: AgentId,
    },
    /// Previous step succeeded; dispatch `step` to its tagged agent.
    Advance { step: PlanStep },
    /// Previous step failed; re-dispatch the same step to the same agent.
    Retry { agent: AgentId, retry_count: u32 },
    /// Nothing happened since the last dispatch.
    Unchanged,
    Complete { message: String },
    Fatal { error: WorkflowError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerUpdate {
    /// Cleaned script, or `None` when generation produced nothing usable.
    pub script: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionUpdate {
    pub result: ExecutionResult,
    /// Workspace created by the executed script, if one was detected.
    pub created_workspace: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateUpdate {
    Controller(ControllerUpdate),
    Worker(WorkerUpdate),
    Execution(ExecutionUpdate),
}

/// Apply one node output to `state` and return the next state.
pub fn apply_update(mut state: WorkflowState, update: StateUpdate) -> WorkflowState {
    if state.is_terminal() {
        debug!("state is terminal; ignoring update");
        return state;
    }

    match update {
        StateUpdate::Controller(update) => apply_controller(&mut state, update),
        StateUpdate::Worker(update) => {
            state.generated_script = update.script;
            state.next_agent = Some(Route::Executor);
        }
        StateUpdate::Execution(update) => apply_execution(&mut state, update),
    }

    state
}

fn apply_controller(state: &mut WorkflowState, update: ControllerUpdate) {
    match update {
        ControllerUpdate::Planned {
            plan,
            snapshot,
            first_agent,
        } => {
            state.current_step = plan.first().cloned();
            state.plan = plan;
            state.resource_snapshot = Some(snapshot);
            state.next_agent = Some(Route::Specialist(first_agent));
            state.retry_count = 0;
            state.errors.clear();
            state.step_pending = true;
        }
        ControllerUpdate::Advance { step } => {
            state.next_agent = Some(Route::Specialist(step.agent.clone()));
            state.current_step = Some(step);
            state.errors.clear();
            state.retry_count = 0;
            state.step_pending = true;
        }
        ControllerUpdate::Retry { agent, retry_count } => {
            state.next_agent = Some(Route::Specialist(agent));
            state.retry_count = retry_count;
            state.step_pending = true;
        }
        ControllerUpdate::Unchanged => {}
        ControllerUpdate::Complete { message } => {
            state.final_answer = Some(message);
            state.next_agent = None;
        }
        ControllerUpdate::Fatal { error } => {
            if let WorkflowError::RetryExhausted { attempts, .. } = &error {
                state.retry_count = *attempts;
            }
            state.fatal_error = Some(error.to_string());
            state.next_agent = None;
        }
    }
}

fn apply_execution(state: &mut WorkflowState, update: ExecutionUpdate) {
    state.generated_script = None;
    state.next_agent = None;
    state.step_pending = false;

    if update.result.success() {
        state.errors.clear();
        state.retry_count = 0;
        if let Some(workspace) = update.created_workspace {
            state.workspace = Some(workspace);
        }
    } else {
        state.errors.push(update.result.failure_message());
    }
    state.last_execution = Some(update.result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{failed, planned_state, succeeded};

    fn qiime() -> AgentId {
        AgentId::new("qiime")
    }

    #[test]
    fn planned_sets_first_step_and_resets_counters() {
        let mut state = WorkflowState::new("req");
        state.errors.push("stale".to_string());
        state.retry_count = 2;
        let plan = vec![
            PlanStep::new("1. create workspace", AgentId::new("obitools")),
            PlanStep::new("2. denoise", qiime()),
        ];

        let next = apply_update(
            state,
            StateUpdate::Controller(ControllerUpdate::Planned {
                plan: plan.clone(),
                snapshot: ResourceSnapshot {
                    root: None,
                    listing: "none".to_string(),
                    truncated: false,
                },
                first_agent: AgentId::new("obitools"),
            }),
        );

        assert_eq!(next.plan, plan);
        assert_eq!(next.current_step, Some(plan[0].clone()));
        assert_eq!(
            next.next_agent,
            Some(Route::Specialist(AgentId::new("obitools")))
        );
        assert!(next.errors.is_empty());
        assert_eq!(next.retry_count, 0);
        assert!(next.step_pending);
    }

    #[test]
    fn worker_update_routes_to_executor() {
        let state = planned_state(&[("1. create", "obitools")]);
        let next = apply_update(
            state,
            StateUpdate::Worker(WorkerUpdate {
                script: Some("mkdir -p /data/run1".to_string()),
            }),
        );
        assert_eq!(next.generated_script.as_deref(), Some("mkdir -p /data/run1"));
        assert_eq!(next.next_agent, Some(Route::Executor));
    }

    #[test]
    fn failed_execution_appends_error_and_clears_script() {
        let mut state = planned_state(&[("1. create", "obitools")]);
        state.generated_script = Some("false".to_string());
        state.errors.push("earlier".to_string());

        let next = apply_update(
            state,
            StateUpdate::Execution(ExecutionUpdate {
                result: failed("boom"),
                created_workspace: Some(PathBuf::from("/data/run1")),
            }),
        );

        assert_eq!(next.generated_script, None);
        assert_eq!(next.errors, vec!["earlier".to_string(), "boom".to_string()]);
        assert_eq!(next.workspace, None);
        assert!(!next.step_pending);
    }

    #[test]
    fn successful_execution_clears_errors_and_promotes_workspace() {
        let mut state = planned_state(&[("1. create", "obitools")]);
        state.generated_script = Some("mkdir -p /data/run1".to_string());
        state.errors.push("earlier".to_string());
        state.retry_count = 2;

        let next = apply_update(
            state,
            StateUpdate::Execution(ExecutionUpdate {
                result: succeeded("ok"),
                created_workspace: Some(PathBuf::from("/data/run1")),
            }),
        );

        assert!(next.errors.is_empty());
        assert_eq!(next.retry_count, 0);
        assert_eq!(next.workspace, Some(PathBuf::from("/data/run1")));
        assert_eq!(next.generated_script, None);
        assert_eq!(next.last_execution, Some(succeeded("ok")));
    }

    #[test]
    fn retry_keeps_step_and_errors() {
        let mut state = planned_state(&[("1. create", "obitools"), ("2. denoise", "qiime")]);
        state.current_step = Some(state.plan[1].clone());
        state.errors.push("boom".to_string());

        let next = apply_update(
            state,
            StateUpdate::Controller(ControllerUpdate::Retry {
                agent: qiime(),
                retry_count: 1,
            }),
        );

        assert_eq!(next.current_step.as_ref().map(|s| s.description.as_str()), Some("2. denoise"));
        assert_eq!(next.errors, vec!["boom".to_string()]);
        assert_eq!(next.retry_count, 1);
        assert_eq!(next.next_agent, Some(Route::Specialist(qiime())));
    }

    #[test]
    fn terminal_state_ignores_further_updates() {
        let state = planned_state(&[("1. create", "obitools")]);
        let done = apply_update(
            state,
            StateUpdate::Controller(ControllerUpdate::Complete {
                message: "done".to_string(),
            }),
        );
        let after = apply_update(
            done.clone(),
            StateUpdate::Controller(ControllerUpdate::Fatal {
                error: WorkflowError::PlanSynchronization,
            }),
        );
        assert_eq!(after, done);
        assert_eq!(after.fatal_error, None);
    }

    #[test]
    fn retry_exhaustion_records_attempts() {
        let state = planned_state(&[("1. create", "obitools")]);
        let next = apply_update(
            state,
            StateUpdate::Controller(ControllerUpdate::Fatal {
                error: WorkflowError::RetryExhausted {
                    attempts: 3,
                    last_error: "boom".to_string(),
                },
            }),
        );
        assert_eq!(next.retry_count, 3);
        assert!(next.fatal_error.as_deref().is_some_and(|e| e.contains("boom")));
        assert_eq!(next.final_answer, None);
    }
}
