//! Job driver: the end-to-end state machine for one run.
//!
//! INIT (publish target) → STREAMING (one blocking pull per
//! agent message, classify → notify → publish before the next pull) →
//! COMPLETING (the terminal result signal is dispatched through the same
//! path as any other step) → FINISHED (pitch + terminal done event).
//!
//! Steps are processed strictly sequentially because git operations are
//! stateful and order-dependent: staging reflects cumulative file writes,
//! and each force-push must reflect the current step's view of the tree.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::classifier::classify;
use crate::core::event::ProgressEvent;
use crate::core::plan::{Plan, parse_plan};
use crate::io::agent::{AgentMessage, AgentStream};
use crate::io::config::WorkerConfig;
use crate::io::deploy::DeployTrigger;
use crate::io::notifier::EventSink;
use crate::io::pitch::{PitchRequest, generate_pitch};
use crate::io::request::JobRequest;
use crate::publish::{PublishLimits, Publisher};

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    /// Steps dispatched through publish+notify, including the synthetic
    /// completion step.
    pub steps_dispatched: usize,
    /// Step total fixed at plan-parse time (0 if no plan message arrived).
    pub total_steps: usize,
    /// Whether a publish target was configured and initialized.
    pub published: bool,
    /// The success flag reported on the done event.
    pub success: bool,
}

/// Run one job to completion.
///
/// The working tree must already exist and be fully prepared (gitignore,
/// template) before the agent is spawned: the agent starts editing files the
/// moment it receives its prompt, so any later template copy would race it.
/// The binary orders prepare → spawn → `run_job`.
///
/// The only fatal condition is the agent stream itself failing: that error
/// propagates and no done event is emitted, which observers must treat as
/// job-failed-silently. Publish and notify failures are reported and
/// skipped.
#[instrument(skip_all, fields(job_id = %request.job_id, branch = %request.branch))]
pub fn run_job<A: AgentStream, S: EventSink>(
    workdir: &Path,
    request: &JobRequest,
    config: &WorkerConfig,
    agent: &mut A,
    sink: &mut S,
) -> Result<JobOutcome> {
    // INIT
    let limits = PublishLimits {
        commit_subject_chars: config.commit_subject_chars,
        push_timeout: Duration::from_secs(config.push_timeout_secs),
        git_output_limit_bytes: config.git_output_limit_bytes,
    };
    let publisher = match request.push_url() {
        None => Publisher::disabled(limits),
        Some(push_url) => Publisher::init(
            workdir,
            &request.branch,
            &push_url,
            &request.git_user_name,
            &request.git_user_email,
            limits.clone(),
        )
        .unwrap_or_else(|err| {
            warn!(err = %err, "git init failed, publishing disabled for this job");
            sink.emit(&ProgressEvent::Error {
                error: err.message.clone(),
                stderr: err.stderr.clone(),
                phase: err.phase,
            });
            Publisher::disabled(limits)
        }),
    };
    let deploy = DeployTrigger::new(
        &config.deploy_api_base,
        request.vercel_token.as_deref(),
        request.repo_url.as_deref(),
        &request.branch,
        Duration::from_secs(config.deploy_timeout_secs),
    );

    info!("job started");

    // STREAMING / COMPLETING
    let mut plan: Option<Plan> = None;
    let mut cursor: usize = 0;
    let mut steps_dispatched = 0;

    while let Some(message) = agent.next_message().context("agent stream")? {
        match message {
            AgentMessage::Assistant { text } => match plan.as_ref() {
                // The very first message is always the plan, even if it
                // carries a step header.
                None => {
                    let parsed = parse_plan(&text);
                    info!(total_steps = parsed.total, "plan captured");
                    sink.emit(&ProgressEvent::Start {
                        idea: request.idea.clone(),
                        temperature: request.temperature,
                        risk: request.risk,
                        branch: request.branch.clone(),
                        total_steps: parsed.total,
                        plan_steps: parsed.labels.clone(),
                    });
                    plan = Some(parsed);
                }
                Some(current) => {
                    let summary = classify(&text, cursor, current);
                    dispatch_step(
                        cursor,
                        current.total,
                        false,
                        &summary,
                        request,
                        &publisher,
                        &deploy,
                        sink,
                    );
                    cursor += 1;
                    steps_dispatched += 1;
                }
            },
            AgentMessage::Result { is_error } => {
                if is_error {
                    warn!("agent reported an error result");
                }
                let total = plan.as_ref().map_or(0, |plan| plan.total);
                dispatch_step(
                    cursor,
                    total,
                    true,
                    "Build complete",
                    request,
                    &publisher,
                    &deploy,
                    sink,
                );
                steps_dispatched += 1;
                break;
            }
        }
    }

    // FINISHED
    let plan_labels = plan.as_ref().map(|plan| plan.labels.clone()).unwrap_or_default();
    let pitch = generate_pitch(&PitchRequest {
        api_base: &config.pitch_api_base,
        api_key: request.openrouter_api_key.as_deref(),
        model: &config.pitch_model,
        idea: &request.idea,
        plan_labels: &plan_labels,
        timeout: Duration::from_secs(config.pitch_timeout_secs),
    });

    // Policy carried over from the original product: a run with no remote
    // configured still counts as successful.
    let success = request.repo_url.is_some() || request.github_token.is_none();
    sink.emit(&ProgressEvent::Done {
        repo_url: request.repo_url.clone().unwrap_or_default(),
        idea: request.idea.clone(),
        pitch,
        success,
        error: None,
        branch: request.branch.clone(),
    });

    let outcome = JobOutcome {
        steps_dispatched,
        total_steps: plan.as_ref().map_or(0, |plan| plan.total),
        published: publisher.is_enabled(),
        success,
    };
    info!(
        steps = outcome.steps_dispatched,
        total = outcome.total_steps,
        published = outcome.published,
        "job finished"
    );
    Ok(outcome)
}

/// One step through the publish+notify path: step event, then publish, then
/// push event and deploy trigger on success, or an error event on failure.
#[allow(clippy::too_many_arguments)]
fn dispatch_step<S: EventSink>(
    step_index: usize,
    total_steps: usize,
    done: bool,
    summary: &str,
    request: &JobRequest,
    publisher: &Publisher,
    deploy: &DeployTrigger,
    sink: &mut S,
) {
    info!(step_index, done, summary, "step recognized");
    sink.emit(&ProgressEvent::Step {
        step_index,
        total_steps,
        done,
        summary: summary.to_string(),
    });
    match publisher.publish(step_index, summary) {
        Ok(false) => {}
        Ok(true) => {
            sink.emit(&ProgressEvent::Push {
                step_index,
                branch: request.branch.clone(),
                summary: summary.to_string(),
            });
            deploy.trigger(sink);
        }
        Err(err) => {
            warn!(step_index, err = %err, "publish failed, continuing");
            sink.emit(&ProgressEvent::Error {
                error: err.message,
                stderr: err.stderr,
                phase: err.phase,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingAgentStream, RecordingSink, ScriptedAgentStream};

    fn request() -> JobRequest {
        JobRequest {
            job_id: "j1".to_string(),
            idea: "todo list app".to_string(),
            ..JobRequest::default()
        }
    }

    fn headless_run(messages: Vec<AgentMessage>) -> (Vec<ProgressEvent>, JobOutcome) {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut agent = ScriptedAgentStream::new(messages);
        let mut sink = RecordingSink::default();
        let outcome = run_job(
            temp.path(),
            &request(),
            &WorkerConfig::default(),
            &mut agent,
            &mut sink,
        )
        .expect("run");
        (sink.events, outcome)
    }

    fn assistant(text: &str) -> AgentMessage {
        AgentMessage::Assistant {
            text: text.to_string(),
        }
    }

    #[test]
    fn cursor_increases_by_one_per_message_with_no_gaps() {
        let (events, outcome) = headless_run(vec![
            assistant("1. Scaffold\n2. Add API\n3. Build UI"),
            assistant("[STEP 1/3] Scaffold"),
            assistant("working on the api"),
            assistant("ui time"),
            assistant("extra step beyond the plan"),
            AgentMessage::Result { is_error: false },
        ]);

        let indices: Vec<usize> = events
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::Step { step_index, .. } => Some(*step_index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(outcome.steps_dispatched, 5);
        assert_eq!(outcome.total_steps, 3);
    }

    #[test]
    fn start_event_is_emitted_once_with_plan() {
        let (events, _) = headless_run(vec![
            assistant("1. Scaffold\n2. Add API"),
            assistant("step one"),
            AgentMessage::Result { is_error: false },
        ]);

        let starts: Vec<&ProgressEvent> = events
            .iter()
            .filter(|event| matches!(event, ProgressEvent::Start { .. }))
            .collect();
        assert_eq!(starts.len(), 1);
        let ProgressEvent::Start {
            total_steps,
            plan_steps,
            ..
        } = starts[0]
        else {
            panic!("expected start event");
        };
        assert_eq!(*total_steps, 2);
        assert_eq!(plan_steps, &vec!["Scaffold".to_string(), "Add API".to_string()]);
    }

    #[test]
    fn first_message_is_plan_even_with_step_header() {
        let (events, _) = headless_run(vec![
            assistant("[STEP 1/4] Scaffold"),
            AgentMessage::Result { is_error: false },
        ]);

        // The header message became the plan (fallback extraction), not a
        // step; the only step is the synthetic completion.
        assert!(matches!(events[0], ProgressEvent::Start { .. }));
        let ProgressEvent::Step { done, summary, .. } = &events[1] else {
            panic!("expected step event");
        };
        assert!(*done);
        assert_eq!(summary, "Build complete");
    }

    #[test]
    fn malformed_header_keeps_cursor_authority() {
        let (events, _) = headless_run(vec![
            assistant("1. Scaffold\n2. Add API"),
            assistant("[STEP 99/99] Weird"),
            AgentMessage::Result { is_error: false },
        ]);

        let ProgressEvent::Step {
            step_index,
            summary,
            done,
            ..
        } = &events[1]
        else {
            panic!("expected step event");
        };
        assert_eq!(*step_index, 0);
        assert_eq!(summary, "Weird");
        assert!(!*done);
    }

    #[test]
    fn completion_goes_through_the_step_path() {
        let (events, _) = headless_run(vec![
            assistant("1. Scaffold"),
            assistant("doing it"),
            AgentMessage::Result { is_error: false },
        ]);

        let ProgressEvent::Step {
            step_index,
            total_steps,
            done,
            summary,
        } = &events[2]
        else {
            panic!("expected completion step");
        };
        assert_eq!(*step_index, 1);
        assert_eq!(*total_steps, 1);
        assert!(*done);
        assert_eq!(summary, "Build complete");
    }

    #[test]
    fn headless_job_emits_no_push_events_and_succeeds() {
        let (events, outcome) = headless_run(vec![
            assistant("1. Scaffold"),
            assistant("doing it"),
            AgentMessage::Result { is_error: false },
        ]);

        assert!(
            events
                .iter()
                .all(|event| !matches!(event, ProgressEvent::Push { .. }))
        );
        assert!(!outcome.published);
        assert!(outcome.success);
        let ProgressEvent::Done { success, pitch, .. } = events.last().expect("done") else {
            panic!("expected done event");
        };
        assert!(*success);
        assert!(pitch.starts_with("We built a production-ready app"));
    }

    #[test]
    fn agent_stream_failure_is_fatal_and_emits_nothing_terminal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut agent = FailingAgentStream;
        let mut sink = RecordingSink::default();
        let result = run_job(
            temp.path(),
            &request(),
            &WorkerConfig::default(),
            &mut agent,
            &mut sink,
        );

        assert!(result.is_err());
        assert!(
            sink.events
                .iter()
                .all(|event| !matches!(event, ProgressEvent::Done { .. }))
        );
    }

    #[test]
    fn stream_ending_without_result_still_emits_done() {
        let (events, outcome) = headless_run(vec![
            assistant("1. Scaffold"),
            assistant("doing it"),
        ]);

        assert!(matches!(events.last(), Some(ProgressEvent::Done { .. })));
        // No synthetic completion step without the terminal signal.
        assert_eq!(outcome.steps_dispatched, 1);
    }
}
