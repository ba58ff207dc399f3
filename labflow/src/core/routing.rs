//! Routing heuristics: step-to-agent classification at planning time,
//! script-to-environment inference, and workspace detection.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::AgentId;

/// Routing facts for one specialist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub agent: AgentId,
    /// Case-insensitive substrings of step text that select this agent.
    pub step_keywords: Vec<String>,
    /// Case-sensitive substrings of a script that select `environment`.
    pub script_markers: Vec<String>,
    pub environment: String,
}

/// Ordered rule set. The first rule is the fallback agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    rules: Vec<RouteRule>,
    default_environment: String,
}

impl RoutingTable {
    /// Build a table; returns `None` when `rules` is empty.
    pub fn new(rules: Vec<RouteRule>, default_environment: impl Into<String>) -> Option<Self> {
        if rules.is_empty() {
            return None;
        }
        Some(Self {
            rules,
            default_environment: default_environment.into(),
        })
    }

    pub fn fallback(&self) -> &AgentId {
        &self.rules[0].agent
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentId> {
        self.rules.iter().map(|rule| &rule.agent)
    }

    pub fn default_environment(&self) -> &str {
        &self.default_environment
    }

    /// Resolve a planner-supplied agent name to a registered id.
    pub fn resolve(&self, name: &str) -> Option<AgentId> {
        let name = name.trim();
        self.rules
            .iter()
            .find(|rule| rule.agent.as_str().eq_ignore_ascii_case(name))
            .map(|rule| rule.agent.clone())
    }

    /// Pick the agent for a step description by keyword match.
    pub fn classify_step(&self, step: &str) -> AgentId {
        let lowered = step.to_lowercase();
        self.rules
            .iter()
            .find(|rule| {
                rule.step_keywords
                    .iter()
                    .any(|keyword| lowered.contains(&keyword.to_lowercase()))
            })
            .map(|rule| rule.agent.clone())
            .unwrap_or_else(|| self.fallback().clone())
    }

    /// Pick the execution environment from script content; first matching rule wins.
    pub fn environment_for_script(&self, script: &str) -> &str {
        self.rules
            .iter()
            .find(|rule| {
                rule.script_markers
                    .iter()
                    .any(|marker| script.contains(marker.as_str()))
            })
            .map(|rule| rule.environment.as_str())
            .unwrap_or(&self.default_environment)
    }
}

static MKDIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"mkdir\s+(?:-p\s+)?(?:"([^"]+)"|'([^']+)'|([^\s;&|'"]+))"#)
        .expect("mkdir pattern should be valid")
});

/// Target of the first `mkdir` of an absolute path in `script`, if any.
///
/// Relative `mkdir`s create subdirectories inside the current workspace and
/// are ignored. The script runs outside any workspace when this returns
/// `Some`, since the directory does not exist yet.
pub fn detect_workspace(script: &str) -> Option<PathBuf> {
    if !script.contains("mkdir") {
        return None;
    }
    MKDIR_RE
        .captures_iter(script)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str())
        .find(|raw| raw.starts_with('/'))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::default_routes;

    #[test]
    fn classify_defaults_to_first_rule() {
        let routes = default_routes();
        assert_eq!(routes.classify_step("1. Create workspace").as_str(), "obitools");
        assert_eq!(routes.classify_step("3. Merge paired reads").as_str(), "obitools");
    }

    #[test]
    fn classify_matches_keywords_case_insensitively() {
        let routes = default_routes();
        assert_eq!(routes.classify_step("4. Denoise with DADA2").as_str(), "qiime");
        assert_eq!(routes.classify_step("5. Alpha Diversity").as_str(), "qiime");
        assert_eq!(routes.classify_step("Import into QIIME").as_str(), "qiime");
    }

    #[test]
    fn environment_follows_script_markers_in_rule_order() {
        let routes = default_routes();
        assert_eq!(routes.environment_for_script("obi import --quality x"), "obi3");
        assert_eq!(
            routes.environment_for_script("qiime tools import --type x"),
            "qiime2-amplicon-2024.2"
        );
        assert_eq!(routes.environment_for_script("obi export | qiime tools"), "obi3");
        assert_eq!(routes.environment_for_script("ls -la"), "base");
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let routes = default_routes();
        assert_eq!(routes.resolve(" QIIME "), Some(AgentId::new("qiime")));
        assert_eq!(routes.resolve("executor"), None);
    }

    #[test]
    fn detect_workspace_extracts_mkdir_target() {
        assert_eq!(
            detect_workspace("mkdir -p /data/run1\ncd /data/run1"),
            Some(PathBuf::from("/data/run1"))
        );
        assert_eq!(
            detect_workspace("mkdir \"/data/run3\" && ls"),
            Some(PathBuf::from("/data/run3"))
        );
        assert_eq!(
            detect_workspace("mkdir -p /data/run4;echo ok"),
            Some(PathBuf::from("/data/run4"))
        );
    }

    #[test]
    fn detect_workspace_keeps_quoted_targets_with_spaces() {
        assert_eq!(
            detect_workspace("mkdir -p \"/data/my run\"\ncd \"/data/my run\""),
            Some(PathBuf::from("/data/my run"))
        );
        assert_eq!(
            detect_workspace("mkdir '/media/lab/run 2' && ls"),
            Some(PathBuf::from("/media/lab/run 2"))
        );
    }

    #[test]
    fn detect_workspace_ignores_scripts_without_mkdir() {
        assert_eq!(detect_workspace("obi import reads.fastq"), None);
    }

    #[test]
    fn detect_workspace_skips_relative_targets() {
        assert_eq!(detect_workspace("mkdir -p results\nobi export > results/out.fa"), None);
        assert_eq!(
            detect_workspace("mkdir -p tmp && mkdir -p /data/run5"),
            Some(PathBuf::from("/data/run5"))
        );
    }

    #[test]
    fn empty_rules_are_rejected() {
        assert!(RoutingTable::new(Vec::new(), "base").is_none());
    }
}
