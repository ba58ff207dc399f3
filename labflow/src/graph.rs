//! Orchestration graph: controller -> specialist -> executor -> controller.
//!
//! [`Workflow::steps`] yields one [`Transition`] per node execution so a
//! caller can observe intermediate states; [`Workflow::run`] drains it. The
//! loop ends when a terminal field is set or the step budget runs out, and it
//! never returns `Err` for a failed run.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::agents::specialist::{Specialist, StepContext};
use crate::controller::Controller;
use crate::core::budget::StepBudget;
use crate::core::error::WorkflowError;
use crate::core::invariants::validate_invariants;
use crate::core::state_update::{ControllerUpdate, StateUpdate, apply_update};
use crate::core::types::{AgentId, Route, WorkflowState};
use crate::gateway::Gateway;

/// A schedulable node of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "agent")]
pub enum Node {
    Controller,
    Specialist(AgentId),
    Executor,
    /// Pseudo-node reported when the step budget refused the next node.
    BudgetExhausted,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Controller => f.write_str("controller"),
            Node::Specialist(agent) => write!(f, "specialist:{agent}"),
            Node::Executor => f.write_str("executor"),
            Node::BudgetExhausted => f.write_str("budget_exhausted"),
        }
    }
}

/// State observed right after `node` ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub node: Node,
    pub state: WorkflowState,
}

/// Node that runs after `ran`, or `None` once the state is terminal.
pub fn next_node(ran: &Node, state: &WorkflowState) -> Option<Node> {
    if state.is_terminal() {
        return None;
    }
    match ran {
        Node::Controller => Some(match &state.next_agent {
            Some(Route::Specialist(agent)) => Node::Specialist(agent.clone()),
            Some(Route::Executor) => Node::Executor,
            None => Node::Controller,
        }),
        Node::Specialist(_) => Some(Node::Executor),
        Node::Executor => Some(Node::Controller),
        Node::BudgetExhausted => None,
    }
}

/// The wired control loop.
pub struct Workflow<'a> {
    controller: Controller<'a>,
    specialists: BTreeMap<AgentId, &'a dyn Specialist>,
    gateway: Gateway<'a>,
    step_budget: u32,
}

impl<'a> Workflow<'a> {
    pub fn new(
        controller: Controller<'a>,
        specialists: Vec<&'a dyn Specialist>,
        gateway: Gateway<'a>,
        step_budget: u32,
    ) -> Result<Self> {
        if specialists.is_empty() {
            bail!("workflow needs at least one specialist");
        }
        let mut registry = BTreeMap::new();
        for specialist in specialists {
            if registry.insert(specialist.id().clone(), specialist).is_some() {
                bail!("duplicate specialist '{}'", specialist.id());
            }
        }
        Ok(Self {
            controller,
            specialists: registry,
            gateway,
            step_budget,
        })
    }

    pub fn controller(&self) -> &Controller<'a> {
        &self.controller
    }

    /// Lazily execute the loop for `request`, one node per item.
    pub fn steps(&self, request: &str) -> Steps<'_, 'a> {
        Steps {
            workflow: self,
            state: Some(WorkflowState::new(request)),
            next: Some(Node::Controller),
            budget: StepBudget::new(self.step_budget),
            budget_exhausted: false,
        }
    }

    /// Run the loop to a terminal state.
    #[instrument(skip_all)]
    pub fn run(&self, request: &str) -> WorkflowState {
        let mut last = WorkflowState::new(request);
        for transition in self.steps(request) {
            last = transition.state;
        }
        last
    }

    fn execute(&self, node: &Node, state: &WorkflowState) -> StateUpdate {
        match node {
            Node::Controller => StateUpdate::Controller(self.controller.step(state)),
            Node::Specialist(agent) => match self.specialists.get(agent) {
                Some(specialist) => {
                    let step = state
                        .current_step
                        .as_ref()
                        .map(|step| step.description.as_str())
                        .unwrap_or_default();
                    let workspace = state.workspace.as_ref().and_then(|path| path.to_str());
                    let ctx = StepContext {
                        step,
                        snapshot: state.snapshot_listing().unwrap_or_default(),
                        errors: &state.errors,
                        workspace,
                    };
                    StateUpdate::Worker(specialist.generate(&ctx))
                }
                None => StateUpdate::Controller(ControllerUpdate::Fatal {
                    error: WorkflowError::UnknownAgent(agent.to_string()),
                }),
            },
            Node::Executor => StateUpdate::Execution(self.gateway.dispatch(state)),
            Node::BudgetExhausted => StateUpdate::Controller(ControllerUpdate::Fatal {
                error: WorkflowError::StepBudgetExhausted {
                    budget: self.step_budget,
                },
            }),
        }
    }
}

/// Iterator over the transitions of one run.
pub struct Steps<'w, 'a> {
    workflow: &'w Workflow<'a>,
    state: Option<WorkflowState>,
    next: Option<Node>,
    budget: StepBudget,
    budget_exhausted: bool,
}

impl Steps<'_, '_> {
    /// True when the run stopped because the step budget ran out.
    pub fn budget_exhausted(&self) -> bool {
        self.budget_exhausted
    }

    pub fn budget(&self) -> StepBudget {
        self.budget
    }
}

impl Iterator for Steps<'_, '_> {
    type Item = Transition;

    fn next(&mut self) -> Option<Transition> {
        let mut node = self.next.take()?;
        let state = self.state.take()?;

        if !self.budget.try_consume() {
            error!(budget = self.budget.limit(), refused = %node, "step budget exhausted");
            node = Node::BudgetExhausted;
            self.budget_exhausted = true;
        }

        debug!(%node, used = self.budget.used(), "running node");
        let update = self.workflow.execute(&node, &state);
        let mut state = apply_update(state, update);

        let violations = validate_invariants(&state, self.workflow.controller.limits().max_retries);
        if !violations.is_empty() {
            error!(violations = ?violations, "state invariants violated");
            state = apply_update(
                state,
                StateUpdate::Controller(ControllerUpdate::Fatal {
                    error: WorkflowError::InvariantViolation(violations.join("; ")),
                }),
            );
        }

        self.next = next_node(&node, &state);
        if self.next.is_none() {
            info!(
                success = state.final_answer.is_some(),
                transitions = self.budget.used(),
                "run finished"
            );
        }
        self.state = Some(state.clone());
        Some(Transition { node, state })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::planned_state;

    #[test]
    fn router_follows_next_agent_from_controller() {
        let state = planned_state(&[("1. create", "obitools")]);
        assert_eq!(
            next_node(&Node::Controller, &state),
            Some(Node::Specialist(AgentId::new("obitools")))
        );
        assert_eq!(
            next_node(&Node::Specialist(AgentId::new("obitools")), &state),
            Some(Node::Executor)
        );
        assert_eq!(next_node(&Node::Executor, &state), Some(Node::Controller));
    }

    #[test]
    fn router_stops_on_terminal_state() {
        let mut state = planned_state(&[("1. create", "obitools")]);
        state.final_answer = Some("done".to_string());
        assert_eq!(next_node(&Node::Controller, &state), None);
        assert_eq!(next_node(&Node::Executor, &state), None);
    }

    #[test]
    fn node_display_names() {
        assert_eq!(Node::Specialist(AgentId::new("qiime")).to_string(), "specialist:qiime");
        assert_eq!(Node::BudgetExhausted.to_string(), "budget_exhausted");
    }
}
