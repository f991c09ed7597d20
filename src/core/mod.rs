//! Pure, deterministic logic for the worker.
//!
//! Nothing in this module performs I/O. Plan extraction and step
//! classification are plain functions over text so their heuristics can be
//! revised without touching the publish/notify pipeline.

pub mod classifier;
pub mod event;
pub mod plan;
