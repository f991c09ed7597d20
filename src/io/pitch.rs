//! Promotional pitch generation for the terminal `done` event.
//!
//! Best-effort external call: one chat-completion request built from the
//! idea and the plan labels. Any failure, missing credential, or empty
//! completion yields a fixed fallback sentence so the done event always
//! carries a pitch.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

const PITCH_SYSTEM_PROMPT: &str = "You are a world-class startup pitch writer for hackathon \
demos. Write a short, punchy, compelling elevator pitch (3-5 sentences) that would convince \
judges to pick this project as the winner. Focus on: the real-world problem it solves, what \
makes it unique, the technical impressiveness of shipping it live in minutes, and why users \
would love it. Be confident and specific. Output ONLY the pitch text, nothing else.";

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: CompletionMessage,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: String,
}

/// Settings for one pitch request.
pub struct PitchRequest<'a> {
    pub api_base: &'a str,
    pub api_key: Option<&'a str>,
    pub model: &'a str,
    pub idea: &'a str,
    pub plan_labels: &'a [String],
    pub timeout: Duration,
}

/// Generate a pitch, falling back to a fixed sentence on any failure.
pub fn generate_pitch(request: &PitchRequest<'_>) -> String {
    if let Some(api_key) = request.api_key {
        match fetch_pitch(request, api_key) {
            Ok(pitch) if !pitch.is_empty() => {
                info!(chars = pitch.len(), "pitch generated");
                return pitch;
            }
            Ok(_) => warn!("pitch generation returned empty content"),
            Err(err) => warn!(err = %err, "pitch generation failed"),
        }
    }
    fallback_pitch(request.idea)
}

fn fetch_pitch(request: &PitchRequest<'_>, api_key: &str) -> anyhow::Result<String> {
    let plan_summary = if request.plan_labels.is_empty() {
        "- Full-stack web application".to_string()
    } else {
        request
            .plan_labels
            .iter()
            .map(|label| format!("- {label}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let user_prompt = format!(
        "Idea: {}\n\nWhat was built (plan steps):\n{}\n\nThis app was built from scratch, \
         deployed live, and is accessible right now. Write the pitch.",
        request.idea, plan_summary
    );
    let body = json!({
        "model": request.model,
        "messages": [
            {"role": "system", "content": PITCH_SYSTEM_PROMPT},
            {"role": "user", "content": user_prompt},
        ],
        "max_tokens": 300,
        "temperature": 0.8,
    });

    let client = reqwest::blocking::Client::builder()
        .timeout(request.timeout)
        .build()
        .unwrap_or_else(|_| reqwest::blocking::Client::new());
    let url = format!(
        "{}/v1/chat/completions",
        request.api_base.trim_end_matches('/')
    );
    let response = client
        .post(&url)
        .bearer_auth(api_key)
        .json(&body)
        .send()?
        .error_for_status()?;
    let parsed: CompletionResponse = response.json()?;
    let pitch = parsed
        .choices
        .first()
        .map(|choice| choice.message.content.trim().to_string())
        .unwrap_or_default();
    Ok(pitch)
}

/// Fixed pitch used when generation is unavailable: the idea truncated to
/// 200 characters with any trailing period trimmed.
fn fallback_pitch(idea: &str) -> String {
    let truncated: String = idea.chars().take(200).collect();
    format!(
        "We built a production-ready app that {} — deployed live and ready to demo.",
        truncated.trim_end_matches('.')
    )
}
