//! Agent stream abstraction.
//!
//! The [`AgentStream`] trait decouples the job driver from the actual agent
//! backend (currently a spawned agent CLI emitting JSONL on stdout). Tests
//! use scripted streams that replay predetermined messages without spawning
//! processes.
//!
//! The stream is a blocking pull: the driver suspends in
//! [`AgentStream::next_message`] until the agent produces the next message,
//! then runs classification, publish, and notify before pulling again.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdout, Command, Stdio};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::io::config::AgentConfig;

/// One message pulled from the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentMessage {
    /// Free text from the agent; pattern-matched by the plan parser and
    /// step classifier.
    Assistant { text: String },
    /// The agent's terminal result signal.
    Result { is_error: bool },
}

/// Abstraction over agent message sources.
pub trait AgentStream {
    /// Pull the next message, blocking until one arrives. `Ok(None)` means
    /// the stream ended.
    fn next_message(&mut self) -> Result<Option<AgentMessage>>;
}

// ── JSONL wire shapes (only the fields we consume) ──

#[derive(Debug, Deserialize)]
struct StreamLine {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    is_error: bool,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Vec<WireBlock>,
}

#[derive(Debug, Deserialize)]
struct WireBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Parse one JSONL line from the agent CLI into zero or more messages.
///
/// An assistant message may carry several text blocks; each non-empty block
/// becomes its own [`AgentMessage::Assistant`] so every block flows through
/// classification independently. Unknown line types, tool-use blocks, and
/// unparseable lines are skipped.
pub fn parse_stream_line(line: &str) -> Vec<AgentMessage> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }
    let parsed: StreamLine = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!(err = %err, "skipping unparseable stream line");
            return Vec::new();
        }
    };
    match parsed.kind.as_str() {
        "assistant" => parsed
            .message
            .map(|message| message.content)
            .unwrap_or_default()
            .into_iter()
            .filter(|block| block.kind == "text" && !block.text.trim().is_empty())
            .map(|block| AgentMessage::Assistant {
                text: block.text.trim().to_string(),
            })
            .collect(),
        "result" => vec![AgentMessage::Result {
            is_error: parsed.is_error,
        }],
        _ => Vec::new(),
    }
}

/// Agent stream backed by a spawned agent CLI.
///
/// The task prompt goes to the child's stdin; the system prompt is passed as
/// a `--system-prompt` argument. Stdout is consumed line by line as JSONL;
/// stderr is inherited so agent diagnostics surface in the worker log.
pub struct CliAgentStream {
    child: Child,
    stdout: BufReader<ChildStdout>,
    pending: VecDeque<AgentMessage>,
}

impl CliAgentStream {
    #[instrument(skip_all)]
    pub fn spawn(
        config: &AgentConfig,
        workdir: &std::path::Path,
        system_prompt: &str,
        task_prompt: &str,
    ) -> Result<Self> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("agent.command is empty"))?;

        info!(program = %program, workdir = %workdir.display(), "spawning agent");
        let mut child = Command::new(program)
            .args(args)
            .arg("--system-prompt")
            .arg(system_prompt)
            .current_dir(workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("spawn agent '{program}'"))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("agent stdin was not piped"))?;
        stdin
            .write_all(task_prompt.as_bytes())
            .context("write task prompt to agent stdin")?;
        drop(stdin);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("agent stdout was not piped"))?;

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            pending: VecDeque::new(),
        })
    }
}

impl AgentStream for CliAgentStream {
    fn next_message(&mut self) -> Result<Option<AgentMessage>> {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return Ok(Some(message));
            }
            let mut raw = Vec::new();
            let n = self
                .stdout
                .read_until(b'\n', &mut raw)
                .context("read agent stdout")?;
            if n == 0 {
                return Ok(None);
            }
            let line = String::from_utf8_lossy(&raw);
            self.pending.extend(parse_stream_line(&line));
        }
    }
}

impl Drop for CliAgentStream {
    fn drop(&mut self) {
        // The child normally exits on its own after the result message; kill
        // covers early driver exits.
        if let Err(err) = self.child.kill() {
            debug!(err = %err, "agent child already exited");
        }
        if let Err(err) = self.child.wait() {
            warn!(err = %err, "failed to reap agent child");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assistant_text_block() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"[STEP 1/3] Scaffold"}]}}"#;
        assert_eq!(
            parse_stream_line(line),
            vec![AgentMessage::Assistant {
                text: "[STEP 1/3] Scaffold".to_string()
            }]
        );
    }

    #[test]
    fn multiple_text_blocks_yield_multiple_messages() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"text","text":"first"},
            {"type":"tool_use","text":""},
            {"type":"text","text":"second"}]}}"#;
        let messages = parse_stream_line(line);
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[1],
            AgentMessage::Assistant {
                text: "second".to_string()
            }
        );
    }

    #[test]
    fn blank_text_blocks_are_skipped() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"  \n"}]}}"#;
        assert!(parse_stream_line(line).is_empty());
    }

    #[test]
    fn parses_result_line() {
        assert_eq!(
            parse_stream_line(r#"{"type":"result","is_error":false,"result":"done"}"#),
            vec![AgentMessage::Result { is_error: false }]
        );
    }

    #[test]
    fn skips_other_line_types_and_junk() {
        assert!(parse_stream_line(r#"{"type":"system","subtype":"init"}"#).is_empty());
        assert!(parse_stream_line("not json at all").is_empty());
        assert!(parse_stream_line("").is_empty());
    }

    #[test]
    fn spawn_requires_a_prepared_workdir() {
        use crate::io::workspace::prepare_working_tree;

        let temp = tempfile::tempdir().expect("tempdir");
        let workdir = temp.path().join("build");
        let config = AgentConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "cat >/dev/null".to_string(),
            ],
        };

        // Spawning before the working tree exists fails outright, so the
        // caller has to prepare the tree first.
        assert!(CliAgentStream::spawn(&config, &workdir, "sys", "task").is_err());

        prepare_working_tree(&workdir, None).expect("prepare");
        let stream = CliAgentStream::spawn(&config, &workdir, "sys", "task");
        assert!(stream.is_ok());
    }
}
