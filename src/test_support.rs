//! Test-only scripted collaborators.
//!
//! Scripted streams and sinks let driver and publisher tests run the full
//! pipeline without spawning an agent or a callback receiver; [`TestRemote`]
//! provides a real temporary repository with a bare remote for push tests.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};

use crate::core::event::ProgressEvent;
use crate::io::agent::{AgentMessage, AgentStream};
use crate::io::notifier::EventSink;

/// Agent stream that replays a fixed message sequence.
pub struct ScriptedAgentStream {
    messages: VecDeque<AgentMessage>,
}

impl ScriptedAgentStream {
    pub fn new(messages: Vec<AgentMessage>) -> Self {
        Self {
            messages: messages.into(),
        }
    }
}

impl AgentStream for ScriptedAgentStream {
    fn next_message(&mut self) -> Result<Option<AgentMessage>> {
        Ok(self.messages.pop_front())
    }
}

/// Agent stream that fails on the first pull, for fatal-path tests.
pub struct FailingAgentStream;

impl AgentStream for FailingAgentStream {
    fn next_message(&mut self) -> Result<Option<AgentMessage>> {
        Err(anyhow!("agent process died"))
    }
}

/// Event sink that records every emitted event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<ProgressEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &ProgressEvent) {
        self.events.push(event.clone());
    }
}

/// A temporary working tree plus a bare remote to push to.
pub struct TestRemote {
    _temp: tempfile::TempDir,
    workdir: std::path::PathBuf,
    push_url: String,
}

impl TestRemote {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        let workdir = temp.path().join("work");
        std::fs::create_dir_all(&workdir).context("create workdir")?;
        let remote = temp.path().join("remote.git");
        let push_url = remote
            .to_str()
            .ok_or_else(|| anyhow!("non-utf8 temp path"))?
            .to_string();
        run_git(temp.path(), &["init", "--bare", &push_url])?;
        Ok(Self {
            _temp: temp,
            workdir,
            push_url,
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn push_url(&self) -> &str {
        &self.push_url
    }

    /// Number of commits on a branch of the bare remote.
    pub fn commit_count(&self, branch: &str) -> usize {
        let out = git_stdout(
            Path::new(&self.push_url),
            &["rev-list", "--count", branch],
        );
        out.trim().parse().unwrap_or(0)
    }

    /// Commit subjects on a branch of the bare remote, newest first.
    pub fn commit_subjects(&self, branch: &str) -> Vec<String> {
        git_stdout(Path::new(&self.push_url), &["log", "--format=%s", branch])
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn run_git(cwd: &Path, args: &[&str]) -> Result<()> {
    let status = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .status()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !status.success() {
        return Err(anyhow!("git {} failed", args.join(" ")));
    }
    Ok(())
}

fn git_stdout(cwd: &Path, args: &[&str]) -> String {
    Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).to_string())
        .unwrap_or_default()
}

/// Minimal one-shot HTTP receiver for notifier tests.
pub mod http_sink {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc::{Receiver, channel};
    use std::thread;

    /// Bind an ephemeral port, accept exactly one request, and hand its raw
    /// text (request line, headers, body) to the returned channel. The
    /// connection is answered with an empty 200.
    pub fn serve_one() -> (String, Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        let (tx, rx) = channel();

        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut raw = Vec::new();
            let mut chunk = [0u8; 4096];
            // Read headers, then exactly content-length body bytes.
            let body_len = loop {
                let Ok(n) = stream.read(&mut chunk) else {
                    return;
                };
                if n == 0 {
                    break 0;
                }
                raw.extend_from_slice(&chunk[..n]);
                if let Some(headers_end) = find_headers_end(&raw) {
                    let text = String::from_utf8_lossy(&raw[..headers_end]).to_string();
                    let have = raw.len() - headers_end;
                    break content_length(&text).saturating_sub(have);
                }
            };
            let mut remaining = body_len;
            while remaining > 0 {
                let Ok(n) = stream.read(&mut chunk) else {
                    break;
                };
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&chunk[..n]);
                remaining = remaining.saturating_sub(n);
            }
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n");
            let _ = tx.send(String::from_utf8_lossy(&raw).to_string());
        });

        (base, rx)
    }

    fn find_headers_end(raw: &[u8]) -> Option<usize> {
        raw.windows(4)
            .position(|window| window == b"\r\n\r\n")
            .map(|pos| pos + 4)
    }

    fn content_length(headers: &str) -> usize {
        headers
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse().ok())?
            })
            .unwrap_or(0)
    }
}
