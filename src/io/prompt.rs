//! Prompt rendering for the agent invocation.
//!
//! The system prompt imposes the two output contracts the pipeline relies
//! on: a numbered plan as the first message, and a `[STEP n/t]` header on
//! each subsequent step. Both are advisory; plan parsing and classification
//! tolerate an agent that ignores them.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::io::request::JobRequest;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const TASK_TEMPLATE: &str = include_str!("prompts/task.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        env.add_template("task", TASK_TEMPLATE)
            .expect("task template should be valid");
        Self { env }
    }

    /// Render the system prompt from the job's idea and parameters.
    pub fn render_system(&self, request: &JobRequest) -> Result<String> {
        let template = self.env.get_template("system")?;
        let rendered = template
            .render(context! {
                idea => request.idea,
                worker_profile => request.worker_profile,
                risk => request.risk,
                temperature => request.temperature,
            })
            .context("render system prompt")?;
        Ok(rendered)
    }

    /// Render the task prompt fed to the agent's stdin.
    pub fn render_task(&self, request: &JobRequest) -> Result<String> {
        let template = self.env.get_template("task")?;
        let rendered = template
            .render(context! { idea => request.idea })
            .context("render task prompt")?;
        Ok(rendered)
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}
