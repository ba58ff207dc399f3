//! Knowledge snippet retrieval for specialist prompts.
//!
//! Snippets are paragraphs of `.md`/`.txt` files under a knowledge directory,
//! ranked by how many distinct query terms they contain.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument};
use walkdir::WalkDir;

pub trait KnowledgeRetriever {
    /// Up to `k` snippets most relevant to `query`, best first.
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>>;
}

/// Retriever used when no knowledge directory is configured.
pub struct NullRetriever;

impl KnowledgeRetriever for NullRetriever {
    fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Snippet {
    text: String,
    terms: HashSet<String>,
}

/// In-memory index over a directory of text snippets, loaded once.
#[derive(Debug, Clone)]
pub struct DirectoryRetriever {
    snippets: Vec<Snippet>,
}

impl DirectoryRetriever {
    #[instrument(skip_all, fields(dir = %dir.display()))]
    pub fn load(dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.with_context(|| format!("walk {}", dir.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_text = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| matches!(ext, "md" | "txt"));
            if is_text {
                files.push(entry.into_path());
            }
        }
        files.sort();

        let mut snippets = Vec::new();
        for path in &files {
            let contents =
                fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
            snippets.extend(split_paragraphs(&contents).map(|text| Snippet {
                terms: terms(&text),
                text,
            }));
        }
        debug!(files = files.len(), snippets = snippets.len(), "knowledge loaded");
        Ok(Self { snippets })
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

impl KnowledgeRetriever for DirectoryRetriever {
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>> {
        let query_terms = terms(query);
        let mut scored: Vec<(usize, usize)> = self
            .snippets
            .iter()
            .enumerate()
            .map(|(idx, snippet)| (snippet.terms.intersection(&query_terms).count(), idx))
            .filter(|(score, _)| *score > 0)
            .collect();
        // Stable: equal scores keep file order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, idx)| self.snippets[idx].text.clone())
            .collect())
    }
}

fn split_paragraphs(contents: &str) -> impl Iterator<Item = String> + '_ {
    contents
        .split("\n\n")
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .map(str::to_string)
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
        .filter(|term| term.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knowledge_dir() -> tempfile::TempDir {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("qiime")).expect("mkdir");
        fs::write(
            temp.path().join("obitools.md"),
            "# OBITools\n\nUse obi import to load fastq reads.\n\nobi grep filters by score.",
        )
        .expect("write");
        fs::write(
            temp.path().join("qiime/denoise.txt"),
            "QIIME2 dada2 denoise-paired trims reads.\n\nignored binary",
        )
        .expect("write");
        fs::write(temp.path().join("notes.bin"), "obi import fastq").expect("write");
        temp
    }

    #[test]
    fn loads_paragraphs_from_text_files_only() {
        let temp = knowledge_dir();
        let retriever = DirectoryRetriever::load(temp.path()).expect("load");
        assert_eq!(retriever.len(), 5);
    }

    #[test]
    fn ranks_by_term_overlap_and_caps_at_k() {
        let temp = knowledge_dir();
        let retriever = DirectoryRetriever::load(temp.path()).expect("load");

        let hits = retriever
            .retrieve("OBITools import fastq reads", 2)
            .expect("retrieve");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0], "Use obi import to load fastq reads.");

        let hits = retriever.retrieve("QIIME2 dada2", 3).expect("retrieve");
        assert_eq!(hits, vec!["QIIME2 dada2 denoise-paired trims reads.".to_string()]);
    }

    #[test]
    fn unrelated_query_returns_nothing() {
        let temp = knowledge_dir();
        let retriever = DirectoryRetriever::load(temp.path()).expect("load");
        assert!(retriever.retrieve("zzz", 3).expect("retrieve").is_empty());
        assert!(NullRetriever.retrieve("obi", 3).expect("retrieve").is_empty());
    }
}
