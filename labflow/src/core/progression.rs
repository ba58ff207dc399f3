//! Step progression: advance, retry, or stop after an execution.

use crate::core::error::WorkflowError;
use crate::core::state_update::ControllerUpdate;
use crate::core::types::WorkflowState;

/// Message recorded as the final answer when every plan step succeeded.
pub const COMPLETION_MESSAGE: &str = "All steps completed successfully.";

/// Decide the controller's next move for a state whose plan is already set.
///
/// - A still-pending dispatch (no execution since) yields `Unchanged`.
/// - A failed step is re-dispatched to the agent tagged on it until the
///   `max_retries`-th consecutive failure, which is fatal.
/// - A successful step advances exactly one index, or completes the run.
pub fn progress(state: &WorkflowState, max_retries: u32) -> ControllerUpdate {
    if state.is_terminal() || state.step_pending {
        return ControllerUpdate::Unchanged;
    }

    let Some(index) = state.current_index() else {
        return ControllerUpdate::Fatal {
            error: WorkflowError::PlanSynchronization,
        };
    };

    if let Some(last_error) = state.errors.last() {
        let attempts = state.retry_count.saturating_add(1);
        if attempts >= max_retries {
            return ControllerUpdate::Fatal {
                error: WorkflowError::RetryExhausted {
                    attempts,
                    last_error: last_error.clone(),
                },
            };
        }
        return ControllerUpdate::Retry {
            agent: state.plan[index].agent.clone(),
            retry_count: attempts,
        };
    }

    match state.plan.get(index + 1) {
        Some(step) => ControllerUpdate::Advance { step: step.clone() },
        None => ControllerUpdate::Complete {
            message: COMPLETION_MESSAGE.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AgentId, PlanStep};
    use crate::test_support::planned_state;

    fn executed(mut state: WorkflowState) -> WorkflowState {
        state.step_pending = false;
        state
    }

    #[test]
    fn advances_to_next_step_in_order() {
        let state = executed(planned_state(&[
            ("1. create", "obitools"),
            ("2. denoise", "qiime"),
            ("3. diversity", "qiime"),
        ]));

        let update = progress(&state, 3);
        assert_eq!(
            update,
            ControllerUpdate::Advance {
                step: PlanStep::new("2. denoise", AgentId::new("qiime"))
            }
        );
    }

    #[test]
    fn completes_after_last_step() {
        let mut state = executed(planned_state(&[("1. create", "obitools"), ("2. merge", "obitools")]));
        state.current_step = Some(state.plan[1].clone());

        assert_eq!(
            progress(&state, 3),
            ControllerUpdate::Complete {
                message: COMPLETION_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn retries_on_same_tagged_agent() {
        let mut state = executed(planned_state(&[("1. create", "obitools"), ("2. import", "qiime")]));
        state.current_step = Some(state.plan[1].clone());
        state.errors.push("bad manifest".to_string());

        assert_eq!(
            progress(&state, 3),
            ControllerUpdate::Retry {
                agent: AgentId::new("qiime"),
                retry_count: 1,
            }
        );
    }

    #[test]
    fn third_consecutive_failure_is_fatal() {
        let mut state = executed(planned_state(&[("1. create", "obitools")]));
        state.retry_count = 2;
        state.errors = vec!["e1".into(), "e2".into(), "e3".into()];

        match progress(&state, 3) {
            ControllerUpdate::Fatal {
                error: WorkflowError::RetryExhausted { attempts, last_error },
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, "e3");
            }
            other => panic!("expected retry exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn second_failure_still_retries() {
        let mut state = executed(planned_state(&[("1. create", "obitools")]));
        state.retry_count = 1;
        state.errors = vec!["e1".into(), "e2".into()];

        assert_eq!(
            progress(&state, 3),
            ControllerUpdate::Retry {
                agent: AgentId::new("obitools"),
                retry_count: 2,
            }
        );
    }

    #[test]
    fn missing_current_step_is_a_sync_error() {
        let mut state = executed(planned_state(&[("1. create", "obitools")]));
        state.current_step = Some(PlanStep::new("rewritten step", AgentId::new("obitools")));

        assert_eq!(
            progress(&state, 3),
            ControllerUpdate::Fatal {
                error: WorkflowError::PlanSynchronization
            }
        );
    }

    #[test]
    fn pending_dispatch_is_a_no_op() {
        let state = planned_state(&[("1. create", "obitools"), ("2. merge", "obitools")]);
        assert!(state.step_pending);
        assert_eq!(progress(&state, 3), ControllerUpdate::Unchanged);
        assert_eq!(progress(&state, 3), ControllerUpdate::Unchanged);
    }
}
