//! Git adapter for the publish pipeline.
//!
//! The worker commits and force-pushes deterministically, so we keep a small,
//! explicit wrapper around `git` subprocess calls. Failures carry the
//! captured stderr because it is forwarded verbatim to the callback
//! receiver's error channel.

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::Duration;

use tracing::{debug, instrument};

use crate::io::process::run_command_with_timeout;

/// A failed git invocation with the stderr it produced.
#[derive(Debug, Clone)]
pub struct GitError {
    /// The git subcommand that failed (e.g. `push --force -u origin main`).
    pub command: String,
    /// Trimmed stderr captured from the child, or the spawn error text.
    pub stderr: String,
    pub timed_out: bool,
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timed_out {
            write!(f, "git {} timed out", self.command)
        } else {
            write!(f, "git {} failed: {}", self.command, self.stderr)
        }
    }
}

impl std::error::Error for GitError {}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Create an empty repository in the working directory.
    pub fn init(&self) -> Result<(), GitError> {
        self.run_checked(&["init"])?;
        Ok(())
    }

    /// Set the commit author identity for this repository.
    pub fn config_user(&self, name: &str, email: &str) -> Result<(), GitError> {
        self.run_checked(&["config", "user.name", name])?;
        self.run_checked(&["config", "user.email", email])?;
        Ok(())
    }

    /// Rename the current branch (works on an unborn branch too).
    #[instrument(skip_all, fields(branch))]
    pub fn rename_branch(&self, branch: &str) -> Result<(), GitError> {
        debug!(branch, "renaming current branch");
        self.run_checked(&["branch", "-M", branch])?;
        Ok(())
    }

    /// Register a remote by name.
    pub fn add_remote(&self, name: &str, url: &str) -> Result<(), GitError> {
        self.run_checked(&["remote", "add", name, url])?;
        Ok(())
    }

    /// Stage all changes including deletions (respects .gitignore).
    pub fn add_all(&self) -> Result<(), GitError> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Commit with a message, recording a commit even when nothing is
    /// staged. The empty commit is the per-step audit marker: one commit
    /// exists per step regardless of whether the agent touched files.
    #[instrument(skip_all)]
    pub fn commit_allow_empty(&self, message: &str) -> Result<(), GitError> {
        debug!("committing (allow-empty)");
        self.run_checked(&["commit", "-m", message, "--allow-empty"])?;
        Ok(())
    }

    /// Force-push the branch to `origin`, overwriting any prior history on
    /// that ref. Bounded by `timeout`; a hung push must not stall the job
    /// past its budget.
    #[instrument(skip_all, fields(branch, timeout_secs = timeout.as_secs()))]
    pub fn force_push(
        &self,
        branch: &str,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<(), GitError> {
        let args = ["push", "--force", "-u", "origin", branch];
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.workdir);

        let output = run_command_with_timeout(cmd, timeout, output_limit_bytes)
            .map_err(|err| spawn_error(&args, &err))?;
        if output.timed_out {
            return Err(GitError {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                timed_out: true,
            });
        }
        if !output.status.success() {
            return Err(GitError {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                timed_out: false,
            });
        }
        debug!(branch, "push complete");
        Ok(())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output, GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|err| spawn_error(args, &err))?;
        if !output.status.success() {
            return Err(GitError {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                timed_out: false,
            });
        }
        Ok(output)
    }
}

fn spawn_error(args: &[&str], err: &dyn fmt::Display) -> GitError {
    GitError {
        command: args.join(" "),
        stderr: format!("spawn failed: {err}"),
        timed_out: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn log_count(repo: &Path, branch: &str) -> usize {
        let out = Command::new("git")
            .args(["rev-list", "--count", branch])
            .current_dir(repo)
            .output()
            .expect("rev-list");
        String::from_utf8_lossy(&out.stdout)
            .trim()
            .parse()
            .expect("count")
    }

    #[test]
    fn init_commit_and_push_to_bare_remote() {
        let temp = tempfile::tempdir().expect("tempdir");
        let work = temp.path().join("work");
        let remote = temp.path().join("remote.git");
        fs::create_dir_all(&work).expect("mkdir");
        let status = Command::new("git")
            .args(["init", "--bare", remote.to_str().expect("utf8 path")])
            .status()
            .expect("git init --bare");
        assert!(status.success());

        let git = Git::new(&work);
        git.init().expect("init");
        git.config_user("Test", "test@example.com").expect("config");
        git.rename_branch("main").expect("rename");
        git.add_remote("origin", remote.to_str().expect("utf8 path"))
            .expect("remote");

        fs::write(work.join("a.txt"), "one").expect("write");
        git.add_all().expect("add");
        git.commit_allow_empty("Step 0: Scaffold").expect("commit");
        // Nothing staged for the second commit; allow-empty still records it.
        git.commit_allow_empty("Step 1: Add API").expect("commit");
        git.force_push("main", Duration::from_secs(30), 10_000)
            .expect("push");

        assert_eq!(log_count(&remote, "main"), 2);
    }

    #[test]
    fn failed_command_captures_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        // add -A outside a repository fails.
        let err = git.add_all().unwrap_err();
        assert!(err.command.starts_with("add"));
        assert!(!err.stderr.is_empty());
        assert!(!err.timed_out);
    }

    #[test]
    fn push_to_missing_remote_reports_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        git.init().expect("init");
        git.config_user("Test", "test@example.com").expect("config");
        git.rename_branch("main").expect("rename");
        git.add_remote("origin", "/nonexistent/remote.git")
            .expect("remote");
        git.commit_allow_empty("Step 0: Scaffold").expect("commit");

        let err = git
            .force_push("main", Duration::from_secs(30), 10_000)
            .unwrap_err();
        assert!(err.command.contains("push"));
        assert!(!err.stderr.is_empty());
    }
}
