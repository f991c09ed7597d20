//! Side-effecting adapters: filesystem, git, process spawning, HTTP.

pub mod agent;
pub mod config;
pub mod deploy;
pub mod git;
pub mod notifier;
pub mod pitch;
pub mod process;
pub mod prompt;
pub mod request;
pub mod workspace;
