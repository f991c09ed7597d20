//! Progress callbacks to the external observer.
//!
//! Delivery is best-effort and at-most-once: each event is one independent
//! POST, there is no queue, no retry, and no delivery confirmation. Emitting
//! never fails; every transport problem is logged and swallowed so a dead
//! receiver cannot take the job down with it.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::core::event::ProgressEvent;

/// Sink for progress events. The job driver is generic over this so tests
/// can record events instead of posting them.
pub trait EventSink {
    fn emit(&mut self, event: &ProgressEvent);
}

/// HTTP notifier posting each event to `<base>/v1.0/log/<kind>`.
///
/// If the callback base is absent or not an http/https URL, every call is a
/// silent no-op; this lets the pipeline run headless (e.g. in tests) without
/// a live receiver.
pub struct HttpNotifier {
    client: reqwest::blocking::Client,
    base: Option<String>,
    job_id: String,
}

impl HttpNotifier {
    pub fn new(callback_base_url: &str, job_id: &str, timeout: Duration) -> Self {
        let base = normalize_base(callback_base_url);
        if base.is_none() && !callback_base_url.trim().is_empty() {
            warn!(
                callback_base_url,
                "callback base is not an http(s) URL, notifications disabled"
            );
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            client,
            base,
            job_id: job_id.to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.base.is_some()
    }
}

impl EventSink for HttpNotifier {
    fn emit(&mut self, event: &ProgressEvent) {
        let Some(base) = self.base.as_deref() else {
            return;
        };
        let url = format!("{base}/v1.0/log/{}", event.kind());
        let body = match payload(event, &self.job_id) {
            Ok(body) => body,
            Err(err) => {
                warn!(kind = event.kind(), err = %err, "failed to serialize event");
                return;
            }
        };
        match self.client.post(&url).json(&body).send() {
            Ok(response) if response.status().is_success() => {
                debug!(kind = event.kind(), "callback delivered");
            }
            Ok(response) => {
                warn!(kind = event.kind(), status = %response.status(), "callback rejected");
            }
            Err(err) => {
                warn!(kind = event.kind(), err = %err, "callback failed");
            }
        }
    }
}

/// Serialize an event and inject the job id into its payload.
fn payload(event: &ProgressEvent, job_id: &str) -> serde_json::Result<Value> {
    let mut body = serde_json::to_value(event)?;
    if let Value::Object(map) = &mut body {
        map.insert("jobId".to_string(), Value::String(job_id.to_string()));
    }
    Ok(body)
}

/// Trim trailing slashes and require an http(s) scheme.
fn normalize_base(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Some(trimmed.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::ProgressEvent;
    use crate::test_support::http_sink;

    #[test]
    fn missing_base_disables_notifier() {
        let notifier = HttpNotifier::new("", "j1", Duration::from_secs(1));
        assert!(!notifier.is_enabled());
    }

    #[test]
    fn non_http_base_disables_notifier() {
        let notifier = HttpNotifier::new("ftp://example.com", "j1", Duration::from_secs(1));
        assert!(!notifier.is_enabled());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        assert_eq!(
            normalize_base("https://cb.example.com/").as_deref(),
            Some("https://cb.example.com")
        );
    }

    #[test]
    fn payload_carries_job_id() {
        let event = ProgressEvent::Deployment {
            url: "https://demo.example".to_string(),
        };
        let body = payload(&event, "j42").expect("payload");
        assert_eq!(body["jobId"], "j42");
        assert_eq!(body["url"], "https://demo.example");
    }

    #[test]
    fn emit_posts_to_kind_endpoint() {
        let (base, received) = http_sink::serve_one();
        let mut notifier = HttpNotifier::new(&base, "j7", Duration::from_secs(5));
        notifier.emit(&ProgressEvent::Step {
            step_index: 1,
            total_steps: 3,
            done: false,
            summary: "Add API".to_string(),
        });

        let request = received.recv_timeout(Duration::from_secs(5)).expect("request");
        assert!(request.starts_with("POST /v1.0/log/step"));
        assert!(request.contains(r#""jobId":"j7""#));
        assert!(request.contains(r#""stepIndex":1"#));
    }

    #[test]
    fn emit_survives_unreachable_receiver() {
        // Port 9 (discard) is almost certainly closed; emit must not panic
        // or error.
        let mut notifier =
            HttpNotifier::new("http://127.0.0.1:9", "j1", Duration::from_millis(200));
        notifier.emit(&ProgressEvent::Deployment {
            url: "x".to_string(),
        });
    }
}
