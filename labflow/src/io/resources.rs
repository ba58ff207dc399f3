//! Resource listing for the planning snapshot.

use std::path::Path;

use anyhow::Result;
use tracing::{instrument, warn};

use crate::io::executor::{ExecRequest, RemoteExecutor, shell_quote};

/// Raw listing of a directory tree, before any truncation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub text: String,
    pub ok: bool,
}

pub trait ResourceLister {
    fn list(&self, path: &Path) -> Result<Listing>;
}

/// Lists resources with `ls -R` through the remote executor.
pub struct RemoteLister<'a> {
    executor: &'a dyn RemoteExecutor,
    environment: String,
}

impl<'a> RemoteLister<'a> {
    pub fn new(executor: &'a dyn RemoteExecutor, environment: impl Into<String>) -> Self {
        Self {
            executor,
            environment: environment.into(),
        }
    }
}

impl ResourceLister for RemoteLister<'_> {
    #[instrument(skip_all, fields(path = %path.display()))]
    fn list(&self, path: &Path) -> Result<Listing> {
        let request = ExecRequest {
            script: format!("ls -R {}", shell_quote(&path.to_string_lossy())),
            cwd: None,
            environment: self.environment.clone(),
        };
        let listing = match self.executor.execute(&request) {
            Ok(result) if result.success() => Listing {
                text: result.stdout,
                ok: true,
            },
            Ok(result) => Listing {
                text: format!("Error scanning directory: {}", result.stderr.trim()),
                ok: false,
            },
            Err(err) => {
                warn!(err = %err, "resource listing failed");
                Listing {
                    text: format!("Error scanning directory: {err:#}"),
                    ok: false,
                }
            }
        };
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedExecutor, failed, succeeded};

    #[test]
    fn lists_with_quoted_path_in_default_env() {
        let executor = ScriptedExecutor::new(vec![Ok(succeeded("reads_R1.fastq\nmap.txt"))]);
        let lister = RemoteLister::new(&executor, "base");

        let listing = lister.list(Path::new("/data/my run")).expect("list");

        assert_eq!(
            listing,
            Listing {
                text: "reads_R1.fastq\nmap.txt".to_string(),
                ok: true
            }
        );
        let requests = executor.requests();
        assert_eq!(requests[0].script, "ls -R '/data/my run'");
        assert_eq!(requests[0].cwd, None);
        assert_eq!(requests[0].environment, "base");
    }

    #[test]
    fn failed_listing_carries_stderr() {
        let executor = ScriptedExecutor::new(vec![Ok(failed("ls: cannot access '/nope'"))]);
        let listing = RemoteLister::new(&executor, "base")
            .list(Path::new("/nope"))
            .expect("list");
        assert!(!listing.ok);
        assert_eq!(listing.text, "Error scanning directory: ls: cannot access '/nope'");
    }

    #[test]
    fn transport_error_becomes_failed_listing() {
        let executor = ScriptedExecutor::new(vec![Err("connection refused".to_string())]);
        let listing = RemoteLister::new(&executor, "base")
            .list(Path::new("/data"))
            .expect("list");
        assert!(!listing.ok);
        assert!(listing.text.contains("connection refused"));
    }
}
