//! Specialist workers: one plan step in, one cleaned script out.

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::script::clean_script;
use crate::core::snapshot::clip;
use crate::core::state_update::WorkerUpdate;
use crate::core::types::AgentId;
use crate::io::config::{ErrorWindow, SpecialistConfig};
use crate::io::llm::TextGenerator;
use crate::io::prompt::{PromptEngine, SpecialistPrompt, join_reference};
use crate::io::retriever::KnowledgeRetriever;

/// Read-only view of the state a specialist works from.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub step: &'a str,
    pub snapshot: &'a str,
    pub errors: &'a [String],
    pub workspace: Option<&'a str>,
}

pub trait Specialist {
    fn id(&self) -> &AgentId;

    /// Generate a script for `ctx.step`.
    ///
    /// Never fails: a generation error yields `script: None`, which the
    /// gateway records as a failed execution.
    fn generate(&self, ctx: &StepContext<'_>) -> WorkerUpdate;
}

/// Specialist backed by a text generator and a knowledge retriever.
pub struct LlmSpecialist<'a> {
    id: AgentId,
    config: SpecialistConfig,
    generator: &'a dyn TextGenerator,
    retriever: &'a dyn KnowledgeRetriever,
    prompts: &'a PromptEngine,
}

impl<'a> LlmSpecialist<'a> {
    pub fn new(
        config: SpecialistConfig,
        generator: &'a dyn TextGenerator,
        retriever: &'a dyn KnowledgeRetriever,
        prompts: &'a PromptEngine,
    ) -> Self {
        Self {
            id: config.agent_id(),
            config,
            generator,
            retriever,
            prompts,
        }
    }

    fn reference(&self, step: &str) -> String {
        let query = format!("{} {}", self.config.retrieval_prefix, step);
        match self.retriever.retrieve(query.trim(), self.config.retrieval_k) {
            Ok(snippets) => join_reference(&snippets, self.config.context_limit_chars),
            Err(err) => {
                warn!(err = %err, "knowledge retrieval failed; continuing without reference");
                String::new()
            }
        }
    }

    fn request_script(&self, ctx: &StepContext<'_>) -> Result<String> {
        let errors = match self.config.errors {
            ErrorWindow::All => ctx.errors,
            ErrorWindow::Last => {
                let start = ctx.errors.len().saturating_sub(1);
                &ctx.errors[start..]
            }
        };
        let reference = self.reference(ctx.step);
        let prompt = SpecialistPrompt {
            id: self.id.as_str(),
            description: &self.config.description,
            environment: &self.config.environment,
            instructions: &self.config.instructions,
            step: ctx.step,
            workspace: ctx.workspace,
            snapshot: clip(ctx.snapshot, self.config.snapshot_limit_chars),
            errors,
            reference: &reference,
        };
        let messages = self.prompts.specialist_messages(&prompt)?;
        self.generator.complete(&messages)
    }
}

impl Specialist for LlmSpecialist<'_> {
    fn id(&self) -> &AgentId {
        &self.id
    }

    #[instrument(skip_all, fields(agent = %self.id, errors = ctx.errors.len()))]
    fn generate(&self, ctx: &StepContext<'_>) -> WorkerUpdate {
        let script = match self.request_script(ctx) {
            Ok(raw) => {
                let cleaned = clean_script(&raw);
                if cleaned.is_empty() {
                    warn!("generator reply contained no script");
                    None
                } else {
                    debug!(script_bytes = cleaned.len(), "script generated");
                    Some(cleaned)
                }
            }
            Err(err) => {
                warn!(err = ?err, "script generation failed");
                None
            }
        };
        info!(step = ctx.step, generated = script.is_some(), "specialist finished");
        WorkerUpdate { script }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::LabflowConfig;
    use crate::io::retriever::NullRetriever;
    use crate::test_support::{ScriptedGenerator, StaticRetriever};

    fn config(id: &str) -> SpecialistConfig {
        LabflowConfig::default()
            .specialists
            .into_iter()
            .find(|s| s.id == id)
            .expect("default specialist")
    }

    fn ctx<'a>(errors: &'a [String]) -> StepContext<'a> {
        StepContext {
            step: "2. Import reads",
            snapshot: "reads_R1.fastq\nreads_R2.fastq",
            errors,
            workspace: Some("/data/run1"),
        }
    }

    #[test]
    fn cleans_fenced_reply() {
        let prompts = PromptEngine::new();
        let generator =
            ScriptedGenerator::new(vec!["Sure.\n```bash\nLet me start\nobi import reads\n```".to_string()]);
        let specialist = LlmSpecialist::new(config("obitools"), &generator, &NullRetriever, &prompts);

        let update = specialist.generate(&ctx(&[]));
        assert_eq!(update.script.as_deref(), Some("obi import reads"));
        assert_eq!(specialist.id().as_str(), "obitools");
    }

    #[test]
    fn last_error_window_shows_only_latest_error() {
        let prompts = PromptEngine::new();
        let generator = ScriptedGenerator::new(vec!["qiime tools import".to_string()]);
        let specialist = LlmSpecialist::new(config("qiime"), &generator, &NullRetriever, &prompts);
        let errors = vec!["first failure".to_string(), "second failure".to_string()];

        specialist.generate(&ctx(&errors));

        let system = &generator.prompts()[0][0].content;
        assert!(system.contains("second failure"));
        assert!(!system.contains("first failure"));
    }

    #[test]
    fn all_error_window_shows_every_error() {
        let prompts = PromptEngine::new();
        let generator = ScriptedGenerator::new(vec!["obi ls".to_string()]);
        let specialist = LlmSpecialist::new(config("obitools"), &generator, &NullRetriever, &prompts);
        let errors = vec!["first failure".to_string(), "second failure".to_string()];

        specialist.generate(&ctx(&errors));

        let system = &generator.prompts()[0][0].content;
        assert!(system.contains("first failure"));
        assert!(system.contains("second failure"));
    }

    #[test]
    fn retrieval_uses_prefix_and_clips_reference() {
        let prompts = PromptEngine::new();
        let generator = ScriptedGenerator::new(vec!["qiime tools import".to_string()]);
        let retriever = StaticRetriever::new(vec!["x".repeat(800)]);
        let specialist = LlmSpecialist::new(config("qiime"), &generator, &retriever, &prompts);

        specialist.generate(&ctx(&[]));

        assert_eq!(
            retriever.queries(),
            vec![("QIIME2 2. Import reads".to_string(), 2)]
        );
        let system = &generator.prompts()[0][0].content;
        assert!(system.contains(&"x".repeat(500)));
        assert!(!system.contains(&"x".repeat(501)));
    }

    #[test]
    fn generator_failure_yields_no_script() {
        let prompts = PromptEngine::new();
        let generator = ScriptedGenerator::new(Vec::new());
        let specialist = LlmSpecialist::new(config("obitools"), &generator, &NullRetriever, &prompts);
        assert_eq!(specialist.generate(&ctx(&[])).script, None);
    }

    #[test]
    fn commentary_only_reply_yields_no_script() {
        let prompts = PromptEngine::new();
        let generator = ScriptedGenerator::new(vec!["Let me think about it.".to_string()]);
        let specialist = LlmSpecialist::new(config("obitools"), &generator, &NullRetriever, &prompts);
        assert_eq!(specialist.generate(&ctx(&[])).script, None);
    }
}
