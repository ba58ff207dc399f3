//! Controller node: plan synthesis on first entry, step progression after.
//!
//! The controller never writes state directly. It returns a
//! [`ControllerUpdate`] that [`crate::core::state_update::apply_update`] folds in.

use std::path::PathBuf;

use tracing::{info, instrument, warn};

use crate::agents::path_extractor::PathExtractor;
use crate::agents::planner::Planner;
use crate::core::error::WorkflowError;
use crate::core::progression::progress;
use crate::core::snapshot::{NO_RESOURCES, truncate_listing};
use crate::core::state_update::ControllerUpdate;
use crate::core::types::{ResourceSnapshot, WorkflowState};
use crate::io::resources::ResourceLister;

/// Retry and snapshot limits the controller enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerLimits {
    pub max_retries: u32,
    pub snapshot_limit_chars: usize,
}

pub struct Controller<'a> {
    planner: &'a dyn Planner,
    extractor: &'a dyn PathExtractor,
    lister: &'a dyn ResourceLister,
    limits: ControllerLimits,
}

impl<'a> Controller<'a> {
    pub fn new(
        planner: &'a dyn Planner,
        extractor: &'a dyn PathExtractor,
        lister: &'a dyn ResourceLister,
        limits: ControllerLimits,
    ) -> Self {
        Self {
            planner,
            extractor,
            lister,
            limits,
        }
    }

    pub fn limits(&self) -> ControllerLimits {
        self.limits
    }

    /// Decide the next move: synthesize a plan when there is none, otherwise
    /// advance, retry, or stop.
    pub fn step(&self, state: &WorkflowState) -> ControllerUpdate {
        if state.plan.is_empty() {
            return self.synthesize(state);
        }
        let update = progress(state, self.limits.max_retries);
        match &update {
            ControllerUpdate::Advance { step } => {
                info!(step = %step.description, agent = %step.agent, "advancing");
            }
            ControllerUpdate::Retry { agent, retry_count } => {
                warn!(%agent, retry_count, "retrying step on the same agent");
            }
            ControllerUpdate::Fatal { error } => warn!(%error, "run failed"),
            ControllerUpdate::Complete { .. } => info!("all steps completed"),
            ControllerUpdate::Planned { .. } | ControllerUpdate::Unchanged => {}
        }
        update
    }

    #[instrument(skip_all)]
    fn synthesize(&self, state: &WorkflowState) -> ControllerUpdate {
        let Some(request) = state.active_request().filter(|r| !r.trim().is_empty()) else {
            return fatal(WorkflowError::Planning("no user request to plan".to_string()));
        };

        let target = match self.extractor.extract(request) {
            Ok(target) => target,
            Err(err) => return fatal(WorkflowError::Planning(format!("{err:#}"))),
        };
        let snapshot = self.snapshot(target);

        match self.planner.plan(request, &snapshot.listing) {
            Ok(output) => {
                info!(steps = output.plan.len(), first_agent = %output.first_agent, "planned");
                ControllerUpdate::Planned {
                    plan: output.plan,
                    snapshot,
                    first_agent: output.first_agent,
                }
            }
            Err(err) => match err.downcast_ref::<WorkflowError>() {
                Some(kind) => fatal(kind.clone()),
                None => fatal(WorkflowError::Planning(format!("{err:#}"))),
            },
        }
    }

    fn snapshot(&self, target: Option<PathBuf>) -> ResourceSnapshot {
        let Some(root) = target else {
            info!("no target directory in request");
            return ResourceSnapshot {
                root: None,
                listing: NO_RESOURCES.to_string(),
                truncated: false,
            };
        };

        let raw = match self.lister.list(&root) {
            Ok(listing) => {
                if !listing.ok {
                    warn!(root = %root.display(), "resource listing failed");
                }
                listing.text
            }
            Err(err) => format!("Error scanning directory: {err:#}"),
        };
        let (listing, truncated) = truncate_listing(&raw, self.limits.snapshot_limit_chars);
        info!(root = %root.display(), truncated, "resource snapshot captured");
        ResourceSnapshot {
            root: Some(root),
            listing,
            truncated,
        }
    }
}

fn fatal(error: WorkflowError) -> ControllerUpdate {
    ControllerUpdate::Fatal { error }
}
