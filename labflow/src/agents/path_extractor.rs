//! Best-effort extraction of the target directory from a request.

use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, instrument};

use crate::io::llm::TextGenerator;
use crate::io::prompt::PromptEngine;

static ABSOLUTE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s(])(/[^\s'"`,;()]+)"#).expect("path pattern should be valid")
});

pub trait PathExtractor {
    /// `Ok(None)` means the request names no resource location.
    fn extract(&self, request: &str) -> Result<Option<PathBuf>>;
}

/// Asks the text generator for the path.
pub struct LlmPathExtractor<'a> {
    generator: &'a dyn TextGenerator,
    prompts: &'a PromptEngine,
}

impl<'a> LlmPathExtractor<'a> {
    pub fn new(generator: &'a dyn TextGenerator, prompts: &'a PromptEngine) -> Self {
        Self { generator, prompts }
    }
}

impl PathExtractor for LlmPathExtractor<'_> {
    #[instrument(skip_all)]
    fn extract(&self, request: &str) -> Result<Option<PathBuf>> {
        let messages = self
            .prompts
            .path_extractor_messages(request)
            .context("render path extractor prompt")?;
        let reply = self.generator.complete(&messages).context("extract path")?;
        let path = parse_extracted_path(&reply);
        debug!(?path, "path extracted");
        Ok(path)
    }
}

/// Takes the first absolute path token in the request.
pub struct RegexPathExtractor;

impl PathExtractor for RegexPathExtractor {
    fn extract(&self, request: &str) -> Result<Option<PathBuf>> {
        Ok(ABSOLUTE_PATH_RE
            .captures(request)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end_matches(['.', ':']))
            .filter(|path| path.len() > 1)
            .map(PathBuf::from))
    }
}

/// Interpret a generator reply: `None`, blank, or relative replies mean no path.
pub fn parse_extracted_path(reply: &str) -> Option<PathBuf> {
    let cleaned = reply
        .trim()
        .trim_matches(|c| matches!(c, '`' | '"' | '\''))
        .trim();
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("none") || !cleaned.starts_with('/') {
        return None;
    }
    if cleaned.lines().count() > 1 {
        return None;
    }
    Some(PathBuf::from(cleaned))
}
