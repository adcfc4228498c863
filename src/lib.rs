//! Multi-stage background pipeline engine with a polling status protocol.
//!
//! A job is submitted, a detached runner walks it through a fixed list of
//! stages with randomized timing and failure, and clients follow along by
//! polling status until the job completes, fails or is cancelled.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod poller;
pub mod registry;
pub mod runner;
pub mod server;
pub mod service;
pub mod ui;

pub use error::{PipelineError, Result};
pub use service::JobService;
