//! `stockade-listeners` — job lifecycle event fan-out.
//!
//! The scheduler calls a [`JobEventBroadcaster`] once per job run; the
//! broadcaster forwards the event, synchronously and in registration order,
//! to every listener whose job-name or job-group filter matches.

pub mod engine;
pub mod error;
pub mod types;

pub use engine::JobEventBroadcaster;
pub use error::{ListenerError, Result};
pub use types::{JobExecutionContext, JobKey, JobListener, JobOutcome, DEFAULT_GROUP};
