//! Structural invariants of [`WorkflowState`].

use crate::core::types::WorkflowState;

/// Collect every invariant violation in `state` (empty when valid).
///
/// - `final_answer` and `fatal_error` are mutually exclusive.
/// - Outside a terminal state, a non-empty plan has a `current_step` that is
///   one of its elements.
/// - Outside a terminal state, `retry_count` stays below `max_retries`.
/// - No script is left behind once the step has executed.
pub fn validate_invariants(state: &WorkflowState, max_retries: u32) -> Vec<String> {
    let mut errors = Vec::new();

    if state.final_answer.is_some() && state.fatal_error.is_some() {
        errors.push("final_answer and fatal_error are both set".to_string());
    }
    if state.is_terminal() {
        return errors;
    }

    if !state.plan.is_empty() && state.current_index().is_none() {
        errors.push("current_step is not an element of plan".to_string());
    }
    if state.plan.is_empty() && state.current_step.is_some() {
        errors.push("current_step is set without a plan".to_string());
    }
    if state.retry_count >= max_retries {
        errors.push(format!(
            "retry_count {} reached the cap of {} without termination",
            state.retry_count, max_retries
        ));
    }
    if !state.step_pending && state.generated_script.is_some() {
        errors.push("generated_script survived an execution".to_string());
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AgentId, PlanStep};
    use crate::test_support::planned_state;

    #[test]
    fn planned_state_is_valid() {
        let state = planned_state(&[("1. create", "obitools")]);
        assert!(validate_invariants(&state, 3).is_empty());
    }

    #[test]
    fn reports_every_violation() {
        let mut state = planned_state(&[("1. create", "obitools")]);
        state.current_step = Some(PlanStep::new("other", AgentId::new("obitools")));
        state.retry_count = 3;
        state.step_pending = false;
        state.generated_script = Some("ls".to_string());

        let errors = validate_invariants(&state, 3);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("not an element of plan")));
        assert!(errors.iter().any(|e| e.contains("retry_count")));
        assert!(errors.iter().any(|e| e.contains("generated_script")));
    }

    #[test]
    fn terminal_fields_are_exclusive() {
        let mut state = planned_state(&[("1. create", "obitools")]);
        state.final_answer = Some("done".to_string());
        state.fatal_error = Some("failed".to_string());
        let errors = validate_invariants(&state, 3);
        assert_eq!(errors, vec!["final_answer and fatal_error are both set".to_string()]);
    }
}
