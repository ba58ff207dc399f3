//! Planner agent: turns a request and a resource snapshot into a tagged plan.

use std::collections::HashSet;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::error::WorkflowError;
use crate::core::routing::RoutingTable;
use crate::core::script::unwrap_fenced;
use crate::core::types::{AgentId, PlanStep};
use crate::io::llm::TextGenerator;
use crate::io::prompt::{PromptEngine, WorkerSummary};

const PLAN_OUTPUT_SCHEMA: &str = include_str!("../../schemas/plan_output.schema.json");

/// A parsed plan whose steps all carry an agent tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerOutput {
    pub plan: Vec<PlanStep>,
    pub first_agent: AgentId,
}

pub trait Planner {
    /// Produce a plan for `request`.
    ///
    /// A malformed reply is reported as [`WorkflowError::PlanningParse`]
    /// inside the `anyhow::Error`; anything else is a collaborator failure.
    fn plan(&self, request: &str, snapshot: &str) -> Result<PlannerOutput>;
}

/// Planner backed by a text generator.
pub struct LlmPlanner<'a> {
    generator: &'a dyn TextGenerator,
    prompts: &'a PromptEngine,
    routes: &'a RoutingTable,
    workers: Vec<WorkerSummary>,
}

impl<'a> LlmPlanner<'a> {
    pub fn new(
        generator: &'a dyn TextGenerator,
        prompts: &'a PromptEngine,
        routes: &'a RoutingTable,
        workers: Vec<WorkerSummary>,
    ) -> Self {
        Self {
            generator,
            prompts,
            routes,
            workers,
        }
    }
}

impl Planner for LlmPlanner<'_> {
    #[instrument(skip_all, fields(snapshot_chars = snapshot.chars().count()))]
    fn plan(&self, request: &str, snapshot: &str) -> Result<PlannerOutput> {
        let messages = self
            .prompts
            .planner_messages(request, snapshot, &self.workers)
            .context("render planner prompt")?;
        let reply = self
            .generator
            .complete(&messages)
            .context("request plan")?;
        let output = parse_plan(&reply, self.routes)?;
        info!(
            steps = output.plan.len(),
            first_agent = %output.first_agent,
            "plan synthesized"
        );
        Ok(output)
    }
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    plan: Vec<RawStep>,
    #[serde(default)]
    current_step: Option<String>,
    #[serde(default)]
    next_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStep {
    Text(String),
    Tagged {
        step: String,
        #[serde(default)]
        agent: Option<String>,
    },
}

/// Parse a planner reply into tagged steps.
///
/// Untagged steps are classified by keyword once, here. The first step takes
/// the reply's `next_agent` unless it carries its own tag.
pub fn parse_plan(reply: &str, routes: &RoutingTable) -> Result<PlannerOutput, WorkflowError> {
    let body = unwrap_fenced(reply);
    let value: Value = serde_json::from_str(body)
        .map_err(|err| WorkflowError::PlanningParse(format!("reply is not JSON: {err}")))?;
    validate_schema(&value).map_err(|err| WorkflowError::PlanningParse(err.to_string()))?;
    let raw: RawPlan = serde_json::from_value(value)
        .map_err(|err| WorkflowError::PlanningParse(format!("unexpected plan shape: {err}")))?;

    let suggested_first = raw.next_agent.as_deref().and_then(|name| {
        let agent = routes.resolve(name);
        if agent.is_none() {
            warn!(agent = name, "planner named an unknown agent");
        }
        agent
    });

    let mut seen = HashSet::new();
    let mut plan = Vec::with_capacity(raw.plan.len());
    for (idx, entry) in raw.plan.into_iter().enumerate() {
        let (description, explicit) = match entry {
            RawStep::Text(text) => (text, None),
            RawStep::Tagged { step, agent } => (step, agent),
        };
        let description = description.trim().to_string();
        if description.is_empty() {
            return Err(WorkflowError::PlanningParse(format!(
                "plan step {} is blank",
                idx + 1
            )));
        }
        if !seen.insert(description.clone()) {
            return Err(WorkflowError::PlanningParse(format!(
                "duplicate plan step '{description}'"
            )));
        }

        let tagged = explicit.as_deref().and_then(|name| routes.resolve(name));
        let agent = match (tagged, idx) {
            (Some(agent), _) => agent,
            (None, 0) => suggested_first
                .clone()
                .unwrap_or_else(|| routes.classify_step(&description)),
            (None, _) => routes.classify_step(&description),
        };
        plan.push(PlanStep::new(description, agent));
    }

    if let Some(current) = raw.current_step.as_deref()
        && current.trim() != plan[0].description
    {
        debug!(current, "planner current_step differs from first step; using first step");
    }

    let first_agent = plan[0].agent.clone();
    Ok(PlannerOutput { plan, first_agent })
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(PLAN_OUTPUT_SCHEMA).context("parse plan schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "plan schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
