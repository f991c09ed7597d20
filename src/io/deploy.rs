//! Deployment trigger, fired after each successful push.
//!
//! The deployment project already exists (created by the orchestrator before
//! the job starts), so a redeploy is one POST referencing the branch as the
//! source. Launch-and-forget: no polling for completion, and failures are
//! logged only; they never reach the job's error channel.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::core::event::ProgressEvent;
use crate::io::notifier::EventSink;

/// Matches `https://<host>/<org>/<name>[.git]`.
static REPO_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https://[^/]+/([^/]+)/([^/]+?)(?:\.git)?$").unwrap());

/// Organization and repository name parsed from a repository URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoords {
    pub org: String,
    pub name: String,
}

/// Parse org/name out of a repository URL. Returns `None` for anything that
/// does not look like `https://<host>/<org>/<name>[.git]`.
pub fn parse_repo_url(url: &str) -> Option<RepoCoords> {
    let caps = REPO_URL_RE.captures(url.trim())?;
    Some(RepoCoords {
        org: caps.get(1)?.as_str().to_string(),
        name: caps.get(2)?.as_str().to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct DeploymentResponse {
    #[serde(default)]
    url: String,
}

/// Fire-and-forget redeploy trigger for one job.
pub struct DeployTrigger {
    client: reqwest::blocking::Client,
    api_base: String,
    token: Option<String>,
    repo_url: Option<String>,
    branch: String,
}

impl DeployTrigger {
    pub fn new(
        api_base: &str,
        token: Option<&str>,
        repo_url: Option<&str>,
        branch: &str,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.map(str::to_string),
            repo_url: repo_url.map(str::to_string),
            branch: branch.to_string(),
        }
    }

    /// Issue one deployment-creation request. Emits a Deployment event with
    /// the normalized URL on success; every failure path logs and returns.
    pub fn trigger(&self, sink: &mut dyn EventSink) {
        let (Some(token), Some(repo_url)) = (self.token.as_deref(), self.repo_url.as_deref())
        else {
            return;
        };
        let Some(coords) = parse_repo_url(repo_url) else {
            warn!(repo_url, "cannot parse repo url for deployment");
            return;
        };

        let body = json!({
            "name": coords.name,
            "target": "production",
            "gitSource": {
                "type": "github",
                "org": coords.org,
                "repo": coords.name,
                "ref": self.branch,
            },
        });
        let url = format!("{}/v13/deployments", self.api_base);
        let response = match self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
        {
            Ok(response) => response,
            Err(err) => {
                warn!(err = %err, "deploy trigger failed");
                return;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "deploy trigger rejected");
            return;
        }
        let parsed: DeploymentResponse = match response.json() {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(err = %err, "deploy response unparseable");
                return;
            }
        };
        let deployment_url = normalize_url(&parsed.url);
        info!(url = %deployment_url, "deployment triggered");
        sink.emit(&ProgressEvent::Deployment {
            url: deployment_url,
        });
    }
}

/// Prefix a scheme when the API returns a bare host.
fn normalize_url(raw: &str) -> String {
    if raw.is_empty() || raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingSink;

    #[test]
    fn parses_repo_url_with_git_suffix() {
        let coords = parse_repo_url("https://github.com/acme/demo.git").expect("coords");
        assert_eq!(coords.org, "acme");
        assert_eq!(coords.name, "demo");
    }

    #[test]
    fn parses_repo_url_without_suffix_on_any_host() {
        let coords = parse_repo_url("https://git.example.dev/team/app").expect("coords");
        assert_eq!(coords.org, "team");
        assert_eq!(coords.name, "app");
    }

    #[test]
    fn rejects_urls_with_wrong_shape() {
        assert_eq!(parse_repo_url("https://github.com/acme"), None);
        assert_eq!(parse_repo_url("git@github.com:acme/demo.git"), None);
        assert_eq!(parse_repo_url("https://github.com/a/b/c"), None);
    }

    #[test]
    fn normalizes_bare_host_urls() {
        assert_eq!(normalize_url("demo.vercel.app"), "https://demo.vercel.app");
        assert_eq!(normalize_url("https://demo.vercel.app"), "https://demo.vercel.app");
    }

    #[test]
    fn missing_token_is_a_no_op() {
        let trigger = DeployTrigger::new(
            "https://api.example.com",
            None,
            Some("https://github.com/acme/demo"),
            "main",
            Duration::from_secs(1),
        );
        let mut sink = RecordingSink::default();
        trigger.trigger(&mut sink);
        assert!(sink.events.is_empty());
    }

    #[test]
    fn unparseable_repo_url_is_skipped() {
        let trigger = DeployTrigger::new(
            "https://api.example.com",
            Some("tok"),
            Some("not a url"),
            "main",
            Duration::from_secs(1),
        );
        let mut sink = RecordingSink::default();
        trigger.trigger(&mut sink);
        assert!(sink.events.is_empty());
    }
}
