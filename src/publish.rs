//! Publish actuator: stage, commit, force-push one step.
//!
//! Each job owns its branch exclusively, so every push force-replaces the
//! remote tip; the branch is an append-only build log, not a collaborative
//! history. All failures here are non-fatal to the job: the driver reports
//! them on the error channel and moves on to the next step.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::core::event::PublishPhase;
use crate::io::git::{Git, GitError};

/// A publish failure, tagged with the phase observers see in error events.
#[derive(Debug, Clone)]
pub struct PublishError {
    pub phase: PublishPhase,
    pub message: String,
    /// Stderr captured from the failing git command.
    pub stderr: String,
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.phase.as_str())
    }
}

impl std::error::Error for PublishError {}

/// Publisher settings independent of the remote target.
#[derive(Debug, Clone)]
pub struct PublishLimits {
    /// Commit subjects keep this many characters of the step summary.
    pub commit_subject_chars: usize,
    pub push_timeout: Duration,
    pub git_output_limit_bytes: usize,
}

#[derive(Debug)]
struct PushTarget {
    git: Git,
    branch: String,
}

/// Per-job publish actuator.
///
/// Disabled publishers (no remote configured, or init failed) make every
/// [`Publisher::publish`] call a silent no-op; the job still runs the agent
/// and reports progress without ever touching git.
#[derive(Debug)]
pub struct Publisher {
    target: Option<PushTarget>,
    limits: PublishLimits,
}

impl Publisher {
    /// A publisher that performs zero git operations.
    pub fn disabled(limits: PublishLimits) -> Self {
        Self {
            target: None,
            limits,
        }
    }

    /// Initialize the working tree as a repository wired to `push_url`.
    ///
    /// On failure the caller should report the error and fall back to
    /// [`Publisher::disabled`]; a failed init degrades the job to
    /// "agent runs, nothing published" rather than aborting it.
    #[instrument(skip_all, fields(branch))]
    pub fn init(
        workdir: &Path,
        branch: &str,
        push_url: &str,
        user_name: &str,
        user_email: &str,
        limits: PublishLimits,
    ) -> Result<Self, PublishError> {
        let git = Git::new(workdir);
        let init = || -> Result<(), GitError> {
            git.init()?;
            git.config_user(user_name, user_email)?;
            git.rename_branch(branch)?;
            git.add_remote("origin", push_url)?;
            Ok(())
        };
        init().map_err(|err| PublishError {
            phase: PublishPhase::GitInit,
            message: format!("git init failed: {err}"),
            stderr: err.stderr,
        })?;
        info!(workdir = %workdir.display(), branch, "publish target initialized");
        Ok(Self {
            target: Some(PushTarget {
                git,
                branch: branch.to_string(),
            }),
            limits,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Stage everything, commit (allow-empty), force-push.
    ///
    /// Returns `Ok(true)` after a successful push, `Ok(false)` when
    /// publishing is disabled. No retries; the next step supersedes this one
    /// anyway.
    #[instrument(skip_all, fields(step_index))]
    pub fn publish(&self, step_index: usize, summary: &str) -> Result<bool, PublishError> {
        let Some(target) = &self.target else {
            debug!("publishing disabled, skipping");
            return Ok(false);
        };

        let subject: String = summary.chars().take(self.limits.commit_subject_chars).collect();
        let message = format!("Step {step_index}: {subject}");

        let push = || -> Result<(), GitError> {
            target.git.add_all()?;
            target.git.commit_allow_empty(&message)?;
            target.git.force_push(
                &target.branch,
                self.limits.push_timeout,
                self.limits.git_output_limit_bytes,
            )?;
            Ok(())
        };
        push().map_err(|err| PublishError {
            phase: PublishPhase::GitPush,
            message: format!("git push failed at step {step_index}: {err}"),
            stderr: err.stderr,
        })?;
        info!(step_index, "pushed step");
        Ok(true)
    }
}
