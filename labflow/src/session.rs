//! Wiring of configured collaborators into a runnable [`Workflow`].
//!
//! Collaborators are borrowed, never global: the caller owns the text
//! generator and the executor so tests can substitute scripted ones.

use anyhow::{Context, Result};
use tracing::info;

use crate::agents::path_extractor::{LlmPathExtractor, PathExtractor, RegexPathExtractor};
use crate::agents::planner::LlmPlanner;
use crate::agents::specialist::{LlmSpecialist, Specialist};
use crate::controller::{Controller, ControllerLimits};
use crate::gateway::Gateway;
use crate::graph::Workflow;
use crate::io::config::{ExecutorConfig, ExecutorKind, LabflowConfig, PathExtraction};
use crate::io::executor::{LocalExecutor, RemoteExecutor, SshExecutor};
use crate::io::llm::TextGenerator;
use crate::io::observability::{JsonlSink, NullSink, ObservabilitySink};
use crate::io::prompt::{PromptEngine, WorkerSummary};
use crate::io::resources::RemoteLister;
use crate::io::retriever::{DirectoryRetriever, KnowledgeRetriever, NullRetriever};

/// Open the JSONL call log, or a null sink when none is configured.
pub fn open_sink(config: &ExecutorConfig) -> Result<Box<dyn ObservabilitySink>> {
    match &config.log_path {
        Some(path) => {
            let sink = JsonlSink::open(path)?;
            info!(path = %sink.path().display(), "recording executor calls");
            Ok(Box::new(sink))
        }
        None => Ok(Box::new(NullSink)),
    }
}

pub fn build_executor<'a>(
    config: &ExecutorConfig,
    sink: &'a dyn ObservabilitySink,
) -> Box<dyn RemoteExecutor + 'a> {
    match config.kind {
        ExecutorKind::Ssh => Box::new(SshExecutor::new(config.clone(), sink)),
        ExecutorKind::Local => Box::new(LocalExecutor::new(config.clone(), sink)),
    }
}

pub fn load_retriever(config: &LabflowConfig) -> Result<Box<dyn KnowledgeRetriever>> {
    match &config.knowledge.dir {
        Some(dir) => {
            let retriever = DirectoryRetriever::load(dir)
                .with_context(|| format!("load knowledge from {}", dir.display()))?;
            info!(snippets = retriever.len(), "knowledge retriever ready");
            Ok(Box::new(retriever))
        }
        None => Ok(Box::new(NullRetriever)),
    }
}

/// Build the workflow from `config` and hand it to `f`.
///
/// `step_budget` overrides `config.control.step_budget` when set.
pub fn with_workflow<R>(
    config: &LabflowConfig,
    generator: &dyn TextGenerator,
    retriever: &dyn KnowledgeRetriever,
    executor: &dyn RemoteExecutor,
    step_budget: Option<u32>,
    f: impl FnOnce(&Workflow<'_>) -> R,
) -> Result<R> {
    config.validate()?;
    let routes = config.routing_table()?;
    let prompts = PromptEngine::new();

    let workers = config
        .specialists
        .iter()
        .map(|specialist| WorkerSummary {
            id: specialist.id.clone(),
            description: specialist.description.clone(),
        })
        .collect();
    let planner = LlmPlanner::new(generator, &prompts, &routes, workers);
    let llm_extractor = LlmPathExtractor::new(generator, &prompts);
    let extractor: &dyn PathExtractor = match config.llm.path_extraction {
        PathExtraction::Llm => &llm_extractor,
        PathExtraction::Regex => &RegexPathExtractor,
    };
    let lister = RemoteLister::new(executor, routes.default_environment());
    let controller = Controller::new(
        &planner,
        extractor,
        &lister,
        ControllerLimits {
            max_retries: config.control.max_retries,
            snapshot_limit_chars: config.control.snapshot_limit_chars,
        },
    );

    let specialists: Vec<LlmSpecialist<'_>> = config
        .specialists
        .iter()
        .cloned()
        .map(|specialist| LlmSpecialist::new(specialist, generator, retriever, &prompts))
        .collect();
    let registered: Vec<&dyn Specialist> = specialists
        .iter()
        .map(|specialist| specialist as &dyn Specialist)
        .collect();

    let gateway = Gateway::new(executor, &routes);
    let budget = step_budget.unwrap_or(config.control.step_budget);
    let workflow = Workflow::new(controller, registered, gateway, budget)?;
    Ok(f(&workflow))
}
