//! Idea-to-live-app implementation worker.
//!
//! This crate drives an autonomous coding agent through one job: it feeds the
//! agent a product idea, reconstructs a structured plan and numbered steps
//! from the agent's free-text message stream, and publishes every recognized
//! step (commit, force-push, redeploy trigger) while narrating progress to an
//! external callback receiver. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (plan extraction, step
//!   classification, the progress-event model). No I/O, fully testable in
//!   isolation.
//! - **[`io`]**: Side-effecting adapters (git, agent process, HTTP callbacks,
//!   deployment trigger, filesystem). Isolated behind narrow traits to enable
//!   scripting in tests.
//!
//! Orchestration modules ([`driver`], [`publish`]) coordinate core logic with
//! I/O to run a job end to end.

pub mod core;
pub mod driver;
pub mod io;
pub mod logging;
pub mod publish;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
