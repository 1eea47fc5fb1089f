//! SCM-backed retrieval via the system git client
//!
//! A symbolic version (branch or tag) is resolved against the remote at
//! use time with `git ls-remote`, then materialized with a shallow clone.
//! The clone runs with a cleared environment so repository-level config
//! cannot inject command execution, and with prompts disabled so missing
//! credentials fail fast instead of hanging.

use crate::error::{ShelfError, ShelfResult};
use crate::retrieve::{validate_version, Retriever};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Timeout for git operations
const GIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Retriever backed by a git remote
#[derive(Debug, Clone)]
pub struct ScmRetriever {
    remote: String,
}

impl ScmRetriever {
    /// Create a retriever for the given remote URL
    pub fn new(remote: String) -> Self {
        Self { remote }
    }

    /// The remote this retriever fetches from
    pub fn remote(&self) -> &str {
        &self.remote
    }

    fn git_command(&self) -> Command {
        let mut cmd = Command::new("git");

        // Clear inherited environment so GIT_PROXY_COMMAND, core.hooksPath
        // and similar config vectors cannot run arbitrary commands.
        cmd.env_clear();
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }
        if let Ok(home) = std::env::var("HOME") {
            cmd.env("HOME", home);
        }
        cmd.env("GIT_CONFIG_NOSYSTEM", "1");
        cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.env("GIT_SSH_COMMAND", "ssh -o BatchMode=yes");
        cmd.stdin(std::process::Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run_git(&self, args: &[&str]) -> ShelfResult<std::process::Output> {
        let mut cmd = self.git_command();
        cmd.args(args);

        let cmd_display = format!("git {}", args.join(" "));
        debug!("Running: {}", cmd_display);

        let output = tokio::time::timeout(GIT_TIMEOUT, cmd.output())
            .await
            .map_err(|_| {
                ShelfError::command_exec(
                    cmd_display.clone(),
                    format!("timed out after {}s", GIT_TIMEOUT.as_secs()),
                )
            })?
            .map_err(|e| ShelfError::command_failed(cmd_display.clone(), e))?;

        Ok(output)
    }
}

#[async_trait]
impl Retriever for ScmRetriever {
    fn kind(&self) -> &'static str {
        "scm"
    }

    async fn resolve_version(&self, name: &str, requested: Option<&str>) -> ShelfResult<String> {
        let version = requested.ok_or_else(|| ShelfError::NoVersionSpecified(name.to_string()))?;
        validate_version(version)?;

        // Match both branch and tag refs for the symbolic name.
        let output = self
            .run_git(&["ls-remote", "--heads", "--tags", &self.remote, version])
            .await
            .map_err(|e| ShelfError::retrieval(name, version, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ShelfError::retrieval(name, version, stderr.trim()));
        }

        if output.stdout.is_empty() {
            return Err(ShelfError::VersionNotFound {
                name: name.to_string(),
                version: version.to_string(),
                remote: self.remote.clone(),
            });
        }

        // The symbolic name is the recorded version; branch heads may move
        // between sessions, the cache refresh policy handles that.
        Ok(version.to_string())
    }

    async fn materialize(&self, name: &str, version: &str, target: &Path) -> ShelfResult<()> {
        validate_version(version)?;

        let target_str = target.to_string_lossy().to_string();
        let output = self
            .run_git(&[
                "clone",
                "--depth=1",
                "--branch",
                version,
                &self.remote,
                &target_str,
            ])
            .await
            .map_err(|e| ShelfError::retrieval(name, version, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ShelfError::retrieval(name, version, stderr.trim()));
        }

        // The checkout is a source tree, not a working repository.
        let git_dir = target.join(".git");
        if git_dir.exists() {
            tokio::fs::remove_dir_all(&git_dir)
                .await
                .map_err(|e| ShelfError::io(format!("removing {}", git_dir.display()), e))?;
        }

        debug!("Materialized {}@{} from {}", name, version, self.remote);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_version() {
        let retriever = ScmRetriever::new("https://git.example.net/stuff.git".to_string());
        assert!(retriever.requires_version());
        assert_eq!(retriever.kind(), "scm");
    }

    #[tokio::test]
    async fn resolve_without_version_fails() {
        let retriever = ScmRetriever::new("https://git.example.net/stuff.git".to_string());
        let err = retriever.resolve_version("stuff", None).await.unwrap_err();
        assert!(matches!(err, ShelfError::NoVersionSpecified(_)));
    }

    #[tokio::test]
    async fn resolve_rejects_flag_injection() {
        let retriever = ScmRetriever::new("https://git.example.net/stuff.git".to_string());
        let err = retriever
            .resolve_version("stuff", Some("--upload-pack=touch x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShelfError::InvalidVersion { .. }));
    }

    #[tokio::test]
    async fn resolve_against_local_repo() {
        // Local git repos work as remotes; skip when git is unavailable.
        if std::process::Command::new("git").arg("--version").output().is_err() {
            return;
        }

        let repo = tempfile::TempDir::new().unwrap();
        let run = |args: &[&str]| {
            let status = std::process::Command::new("git")
                .args(args)
                .current_dir(repo.path())
                .env("GIT_AUTHOR_NAME", "t")
                .env("GIT_AUTHOR_EMAIL", "t@t")
                .env("GIT_COMMITTER_NAME", "t")
                .env("GIT_COMMITTER_EMAIL", "t@t")
                .status()
                .unwrap();
            assert!(status.success(), "git {:?} failed", args);
        };
        run(&["init", "-q", "-b", "master"]);
        std::fs::create_dir(repo.path().join("vars")).unwrap();
        std::fs::write(repo.path().join("vars").join("x.src"), "call").unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "init"]);

        let retriever = ScmRetriever::new(repo.path().to_string_lossy().to_string());

        let resolved = retriever
            .resolve_version("stuff", Some("master"))
            .await
            .unwrap();
        assert_eq!(resolved, "master");

        let missing = retriever
            .resolve_version("stuff", Some("no-such-branch"))
            .await
            .unwrap_err();
        assert!(matches!(missing, ShelfError::VersionNotFound { .. }));

        let target = tempfile::TempDir::new().unwrap();
        let tree = target.path().join("tree");
        std::fs::create_dir(&tree).unwrap();
        retriever
            .materialize("stuff", "master", &tree)
            .await
            .unwrap();

        assert!(tree.join("vars").join("x.src").is_file());
        assert!(!tree.join(".git").exists());
    }
}
