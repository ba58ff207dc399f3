//! Test-only helpers: state builders and scripted collaborators.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};

use crate::agents::path_extractor::PathExtractor;
use crate::agents::planner::{Planner, PlannerOutput};
use crate::agents::specialist::{Specialist, StepContext};
use crate::core::error::WorkflowError;
use crate::core::routing::RoutingTable;
use crate::core::state_update::WorkerUpdate;
use crate::core::types::{
    AgentId, ExecutionResult, Message, PlanStep, ResourceSnapshot, Route, WorkflowState,
};
use crate::io::config::LabflowConfig;
use crate::io::executor::{ExecRequest, RemoteExecutor};
use crate::io::llm::TextGenerator;
use crate::io::observability::{CallRecord, ObservabilityEvent, ObservabilitySink};
use crate::io::resources::{Listing, ResourceLister};
use crate::io::retriever::KnowledgeRetriever;

/// Build a plan from `(description, agent)` pairs.
pub fn plan(steps: &[(&str, &str)]) -> Vec<PlanStep> {
    steps
        .iter()
        .map(|(description, agent)| PlanStep::new(*description, AgentId::new(*agent)))
        .collect()
}

/// State right after planning: first step dispatched, nothing executed yet.
pub fn planned_state(steps: &[(&str, &str)]) -> WorkflowState {
    let mut state = WorkflowState::new("process /data/raw");
    state.plan = plan(steps);
    state.current_step = state.plan.first().cloned();
    state.next_agent = state
        .plan
        .first()
        .map(|step| Route::Specialist(step.agent.clone()));
    state.resource_snapshot = Some(ResourceSnapshot {
        root: Some(PathBuf::from("/data/raw")),
        listing: "reads_R1.fastq\nreads_R2.fastq".to_string(),
        truncated: false,
    });
    state.step_pending = true;
    state
}

pub fn succeeded(stdout: &str) -> ExecutionResult {
    ExecutionResult {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_status: 0,
    }
}

pub fn failed(stderr: &str) -> ExecutionResult {
    ExecutionResult {
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_status: 1,
    }
}

/// Routing table of the default config (`obitools` first, then `qiime`).
pub fn default_routes() -> RoutingTable {
    LabflowConfig::default()
        .routing_table()
        .expect("default config has specialists")
}

/// Sink keeping every event in memory.
#[derive(Default)]
pub struct RecordingSink {
    events: RefCell<Vec<ObservabilityEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ObservabilityEvent> {
        self.events.borrow().clone()
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                ObservabilityEvent::Call(call) => Some(call.clone()),
                ObservabilityEvent::Progress(_) => None,
            })
            .collect()
    }
}

impl ObservabilitySink for RecordingSink {
    fn record(&self, event: &ObservabilityEvent) -> Result<()> {
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }
}

/// Executor returning queued results; `Err` entries simulate transport failures.
pub struct ScriptedExecutor {
    results: RefCell<VecDeque<Result<ExecutionResult, String>>>,
    requests: RefCell<Vec<ExecRequest>>,
}

impl ScriptedExecutor {
    pub fn new(results: Vec<Result<ExecutionResult, String>>) -> Self {
        Self {
            results: RefCell::new(results.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ExecRequest> {
        self.requests.borrow().clone()
    }
}

impl RemoteExecutor for ScriptedExecutor {
    fn execute(&self, request: &ExecRequest) -> Result<ExecutionResult> {
        self.requests.borrow_mut().push(request.clone());
        match self.results.borrow_mut().pop_front() {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted execution result left")),
        }
    }
}

/// Text generator returning queued replies and recording every prompt.
pub struct ScriptedGenerator {
    replies: RefCell<VecDeque<String>>,
    prompts: RefCell<Vec<Vec<Message>>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.borrow().clone()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn complete(&self, messages: &[Message]) -> Result<String> {
        self.prompts.borrow_mut().push(messages.to_vec());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted reply left"))
    }
}

/// Retriever returning fixed snippets and recording queries.
pub struct StaticRetriever {
    snippets: Vec<String>,
    queries: RefCell<Vec<(String, usize)>>,
}

impl StaticRetriever {
    pub fn new(snippets: Vec<String>) -> Self {
        Self {
            snippets,
            queries: RefCell::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.borrow().clone()
    }
}

impl KnowledgeRetriever for StaticRetriever {
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>> {
        self.queries.borrow_mut().push((query.to_string(), k));
        Ok(self.snippets.iter().take(k).cloned().collect())
    }
}

/// Planner returning one fixed outcome and recording the snapshots it saw.
pub struct ScriptedPlanner {
    outcome: Result<PlannerOutput, WorkflowError>,
    snapshots: RefCell<Vec<String>>,
}

impl ScriptedPlanner {
    pub fn new(outcome: Result<PlannerOutput, WorkflowError>) -> Self {
        Self {
            outcome,
            snapshots: RefCell::new(Vec::new()),
        }
    }

    /// Planner whose plan tags each step with the given agent.
    pub fn with_steps(steps: &[(&str, &str)]) -> Self {
        let plan = plan(steps);
        let first_agent = plan
            .first()
            .map(|step| step.agent.clone())
            .unwrap_or_else(|| AgentId::new("obitools"));
        Self::new(Ok(PlannerOutput { plan, first_agent }))
    }

    pub fn snapshots(&self) -> Vec<String> {
        self.snapshots.borrow().clone()
    }
}

impl Planner for ScriptedPlanner {
    fn plan(&self, _request: &str, snapshot: &str) -> Result<PlannerOutput> {
        self.snapshots.borrow_mut().push(snapshot.to_string());
        self.outcome.clone().map_err(anyhow::Error::from)
    }
}

/// Path extractor with a fixed answer.
pub struct StaticExtractor {
    outcome: Result<Option<PathBuf>, String>,
}

impl StaticExtractor {
    pub fn new(path: Option<&str>) -> Self {
        Self {
            outcome: Ok(path.map(PathBuf::from)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
        }
    }
}

impl PathExtractor for StaticExtractor {
    fn extract(&self, _request: &str) -> Result<Option<PathBuf>> {
        self.outcome.clone().map_err(|message| anyhow!(message))
    }
}

/// Lister with a fixed listing, recording requested paths.
pub struct StaticLister {
    listing: Listing,
    paths: RefCell<Vec<PathBuf>>,
}

impl StaticLister {
    pub fn new(text: &str, ok: bool) -> Self {
        Self {
            listing: Listing {
                text: text.to_string(),
                ok,
            },
            paths: RefCell::new(Vec::new()),
        }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.borrow().clone()
    }
}

impl ResourceLister for StaticLister {
    fn list(&self, path: &Path) -> Result<Listing> {
        self.paths.borrow_mut().push(path.to_path_buf());
        Ok(self.listing.clone())
    }
}

/// What a scripted specialist was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenStep {
    pub step: String,
    pub errors: Vec<String>,
    pub workspace: Option<String>,
}

/// Specialist emitting queued scripts (`None` simulates a generation failure).
pub struct ScriptedSpecialist {
    id: AgentId,
    scripts: RefCell<VecDeque<Option<String>>>,
    seen: RefCell<Vec<SeenStep>>,
}

impl ScriptedSpecialist {
    pub fn new(id: &str, scripts: &[&str]) -> Self {
        Self::with_outputs(id, scripts.iter().map(|s| Some(s.to_string())).collect())
    }

    pub fn with_outputs(id: &str, scripts: Vec<Option<String>>) -> Self {
        Self {
            id: AgentId::new(id),
            scripts: RefCell::new(scripts.into()),
            seen: RefCell::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<SeenStep> {
        self.seen.borrow().clone()
    }
}

impl Specialist for ScriptedSpecialist {
    fn id(&self) -> &AgentId {
        &self.id
    }

    fn generate(&self, ctx: &StepContext<'_>) -> WorkerUpdate {
        self.seen.borrow_mut().push(SeenStep {
            step: ctx.step.to_string(),
            errors: ctx.errors.to_vec(),
            workspace: ctx.workspace.map(str::to_string),
        });
        WorkerUpdate {
            script: self.scripts.borrow_mut().pop_front().flatten(),
        }
    }
}
