//! Prompt rendering for the planner, the path extractor, and the specialists.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::snapshot::clip;
use crate::core::types::Message;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const PATH_EXTRACTOR_TEMPLATE: &str = include_str!("prompts/path_extractor.md");
const SPECIALIST_TEMPLATE: &str = include_str!("prompts/specialist.md");

/// Worker entry listed in the planner prompt.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSummary {
    pub id: String,
    pub description: String,
}

/// Everything a specialist shows its generator for one step.
#[derive(Debug, Clone)]
pub struct SpecialistPrompt<'a> {
    pub id: &'a str,
    pub description: &'a str,
    pub environment: &'a str,
    pub instructions: &'a str,
    pub step: &'a str,
    pub workspace: Option<&'a str>,
    pub snapshot: &'a str,
    pub errors: &'a [String],
    pub reference: &'a str,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .expect("planner template should be valid");
        env.add_template("path_extractor", PATH_EXTRACTOR_TEMPLATE)
            .expect("path extractor template should be valid");
        env.add_template("specialist", SPECIALIST_TEMPLATE)
            .expect("specialist template should be valid");
        Self { env }
    }

    /// System + user messages asking for a JSON plan.
    pub fn planner_messages(
        &self,
        request: &str,
        snapshot: &str,
        workers: &[WorkerSummary],
    ) -> Result<Vec<Message>> {
        let system = self.env.get_template("planner")?.render(context! {
            snapshot => snapshot.trim(),
            workers => workers,
        })?;
        Ok(vec![Message::system(system), Message::user(request.trim())])
    }

    pub fn path_extractor_messages(&self, request: &str) -> Result<Vec<Message>> {
        let system = self.env.get_template("path_extractor")?.render(context! {})?;
        Ok(vec![Message::system(system), Message::user(request.trim())])
    }

    /// System + user messages asking for one executable script.
    pub fn specialist_messages(&self, input: &SpecialistPrompt<'_>) -> Result<Vec<Message>> {
        let system = self.env.get_template("specialist")?.render(context! {
            id => input.id,
            description => input.description.trim(),
            environment => input.environment,
            instructions => input.instructions.trim(),
            workspace => input.workspace.unwrap_or("."),
            snapshot => input.snapshot.trim(),
            errors => input.errors,
            reference => (!input.reference.trim().is_empty()).then(|| input.reference.trim()),
        })?;
        let user = format!("Current task: {}", input.step.trim());
        Ok(vec![Message::system(system), Message::user(user)])
    }
}

/// Join retrieved snippets and clip them to `limit` characters.
pub fn join_reference(snippets: &[String], limit: usize) -> String {
    let joined = snippets.join("\n\n");
    clip(&joined, limit).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Role;

    fn workers() -> Vec<WorkerSummary> {
        vec![
            WorkerSummary {
                id: "obitools".to_string(),
                description: "sequence merging".to_string(),
            },
            WorkerSummary {
                id: "qiime".to_string(),
                description: "denoising".to_string(),
            },
        ]
    }

    #[test]
    fn planner_prompt_lists_workers_and_snapshot() {
        let engine = PromptEngine::new();
        let messages = engine
            .planner_messages("  analyse /data/raw  ", "reads_R1.fastq\nmap.txt", &workers())
            .expect("render");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        let system = &messages[0].content;
        assert!(system.contains("reads_R1.fastq"));
        assert!(system.contains("- `obitools`: sequence merging"));
        assert!(system.contains("- `qiime`: denoising"));
        assert!(system.contains(r#""next_agent": "obitools""#));
        assert_eq!(messages[1].content, "analyse /data/raw");
    }

    #[test]
    fn specialist_prompt_includes_errors_only_when_present() {
        let engine = PromptEngine::new();
        let errors = vec!["manifest: duplicate sample id".to_string()];
        let mut input = SpecialistPrompt {
            id: "qiime",
            description: "QIIME2 expert.",
            environment: "qiime2-amplicon-2024.2",
            instructions: "Output only bash.",
            step: "2. Import reads",
            workspace: Some("/data/run1"),
            snapshot: "reads_R1.fastq",
            errors: &errors,
            reference: "",
        };

        let with_errors = engine.specialist_messages(&input).expect("render");
        let system = &with_errors[0].content;
        assert!(system.contains("Workspace: /data/run1"));
        assert!(system.contains("- manifest: duplicate sample id"));
        assert!(!system.contains("## Reference"));
        assert_eq!(with_errors[1].content, "Current task: 2. Import reads");

        input.errors = &[];
        input.workspace = None;
        input.reference = "qiime tools import --type ...";
        let clean = engine.specialist_messages(&input).expect("render");
        let system = &clean[0].content;
        assert!(!system.contains("Previous errors"));
        assert!(system.contains("Workspace: ."));
        assert!(system.contains("## Reference"));
    }

    #[test]
    fn path_extractor_prompt_asks_for_none() {
        let messages = PromptEngine::new()
            .path_extractor_messages("process /data/raw please")
            .expect("render");
        assert!(messages[0].content.contains("return `None`"));
        assert_eq!(messages[1].content, "process /data/raw please");
    }

    #[test]
    fn join_reference_clips_to_limit() {
        let snippets = vec!["abcdef".to_string(), "ghij".to_string()];
        assert_eq!(join_reference(&snippets, 100), "abcdef\n\nghij");
        assert_eq!(join_reference(&snippets, 4), "abcd");
    }
}
