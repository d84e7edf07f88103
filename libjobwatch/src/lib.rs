#![forbid(unsafe_code)]

//! # jobwatch
//!
//! The shared code for jobwatch. Encapsulates abstractions for things like:
//!
//! - Decoding playbook job events into a closed set of event kinds
//! - Folding those events into live play, task and host status
//! - Queueing and draining events on a poll-drain-reschedule loop
//! - Rendering the derived state into a serialisable snapshot
//! - Logging and tracing

pub mod aggregate;
pub mod config;
pub mod event;
pub mod log;
pub mod queue;
pub mod view;
