//! Progress events reported to the callback receiver.
//!
//! Events are immutable records; delivery is fire-and-forget. Serialized
//! bodies use camelCase keys to match the receiver's log API, and each event
//! is posted to its own endpoint derived from [`ProgressEvent::kind`].

use serde::Serialize;

/// Pipeline phase attached to `error` events so observers can tell a failed
/// repository initialization from a failed per-step push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPhase {
    GitInit,
    GitPush,
}

impl PublishPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishPhase::GitInit => "git_init",
            PublishPhase::GitPush => "git_push",
        }
    }
}

/// One progress notification for an observer.
///
/// The job id is not carried here; the notifier injects it into every
/// serialized payload so event construction stays free of job plumbing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum ProgressEvent {
    /// Emitted exactly once, immediately after the plan is captured.
    Start {
        idea: String,
        temperature: u32,
        risk: u32,
        branch: String,
        total_steps: usize,
        plan_steps: Vec<String>,
    },
    /// One recognized step, including the synthetic completion step
    /// (`done = true`).
    Step {
        step_index: usize,
        total_steps: usize,
        done: bool,
        summary: String,
    },
    /// A successful force-push for a step.
    Push {
        step_index: usize,
        branch: String,
        summary: String,
    },
    /// A deployment was triggered and returned a URL.
    Deployment { url: String },
    /// A publish failure; the job continues.
    Error {
        error: String,
        stderr: String,
        phase: PublishPhase,
    },
    /// Terminal event for a run that reached completion.
    Done {
        repo_url: String,
        idea: String,
        pitch: String,
        success: bool,
        error: Option<String>,
        branch: String,
    },
}

impl ProgressEvent {
    /// Endpoint suffix for this event (`/v1.0/log/<kind>`).
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::Start { .. } => "start",
            ProgressEvent::Step { .. } => "step",
            ProgressEvent::Push { .. } => "push",
            ProgressEvent::Deployment { .. } => "deployment",
            ProgressEvent::Error { .. } => "error",
            ProgressEvent::Done { .. } => "done",
        }
    }
}
