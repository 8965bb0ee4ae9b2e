use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{ListenerError, Result};
use crate::types::{JobExecutionContext, JobKey, JobListener, JobOutcome};

/// Ordered, filtered fan-out of job lifecycle events.
///
/// With no patterns registered every event is forwarded. Otherwise an event
/// is forwarded when any job-name pattern matches the job's name or any
/// job-group pattern matches its group. Patterns must match the whole value.
///
/// The broadcaster is itself a [`JobListener`], so broadcasters can nest.
pub struct JobEventBroadcaster {
    name: String,
    /// Registration order is dispatch order.
    listeners: RwLock<Vec<Arc<dyn JobListener>>>,
    name_patterns: RwLock<Vec<Regex>>,
    group_patterns: RwLock<Vec<Regex>>,
}

impl JobEventBroadcaster {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listeners: RwLock::new(Vec::new()),
            name_patterns: RwLock::new(Vec::new()),
            group_patterns: RwLock::new(Vec::new()),
        }
    }

    /// Append a listener; it runs after every listener already registered.
    pub fn add_listener(&self, listener: Arc<dyn JobListener>) {
        debug!(broadcaster = %self.name, listener = listener.name(), "listener registered");
        write(&self.listeners).push(listener);
    }

    /// Remove this exact listener instance. Returns false if it was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn JobListener>) -> bool {
        let mut listeners = write(&self.listeners);
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() < before
    }

    /// Remove every listener called `name`. Returns false if none matched.
    pub fn remove_listener_by_name(&self, name: &str) -> bool {
        let mut listeners = write(&self.listeners);
        let before = listeners.len();
        listeners.retain(|l| l.name() != name);
        if listeners.len() < before {
            debug!(broadcaster = %self.name, listener = name, "listener unregistered");
            true
        } else {
            false
        }
    }

    /// Snapshot of the registered listeners, in dispatch order.
    pub fn listeners(&self) -> Vec<Arc<dyn JobListener>> {
        read(&self.listeners).clone()
    }

    pub fn add_job_name_pattern(&self, pattern: &str) -> Result<()> {
        write(&self.name_patterns).push(compile(pattern)?);
        Ok(())
    }

    pub fn add_job_group_pattern(&self, pattern: &str) -> Result<()> {
        write(&self.group_patterns).push(compile(pattern)?);
        Ok(())
    }

    /// Whether an event for `job_key` passes the filters.
    pub fn should_dispatch(&self, job_key: &JobKey) -> bool {
        let names = read(&self.name_patterns);
        let groups = read(&self.group_patterns);

        if names.is_empty() && groups.is_empty() {
            return true;
        }
        groups.iter().any(|p| p.is_match(&job_key.group))
            || names.iter().any(|p| p.is_match(&job_key.name))
    }

    /// Call `f` on each listener in order, stopping at the first error.
    ///
    /// Works on a snapshot so listeners may (un)register during dispatch.
    fn dispatch<F>(&self, event: &'static str, ctx: &JobExecutionContext, f: F) -> Result<()>
    where
        F: Fn(&dyn JobListener) -> Result<()>,
    {
        if !self.should_dispatch(&ctx.job_key) {
            return Ok(());
        }

        for listener in self.listeners() {
            let t = Instant::now();
            let result = f(listener.as_ref());
            let elapsed_ms = t.elapsed().as_millis() as u64;

            if let Err(ref e) = result {
                warn!(
                    broadcaster = %self.name,
                    listener = listener.name(),
                    job = %ctx.job_key,
                    event,
                    "listener failed: {e}"
                );
            } else {
                debug!(
                    listener = listener.name(),
                    job = %ctx.job_key,
                    event,
                    duration_ms = elapsed_ms,
                    "listener notified"
                );
            }
            result?;
        }
        Ok(())
    }
}

impl JobListener for JobEventBroadcaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn job_to_be_executed(&self, ctx: &JobExecutionContext) -> Result<()> {
        self.dispatch("job_to_be_executed", ctx, |l| l.job_to_be_executed(ctx))
    }

    fn job_execution_vetoed(&self, ctx: &JobExecutionContext) -> Result<()> {
        self.dispatch("job_execution_vetoed", ctx, |l| l.job_execution_vetoed(ctx))
    }

    fn job_was_executed(&self, ctx: &JobExecutionContext, outcome: &JobOutcome) -> Result<()> {
        self.dispatch("job_was_executed", ctx, |l| l.job_was_executed(ctx, outcome))
    }
}

/// Anchor `pattern` so it has to match the whole name or group.
fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| ListenerError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

// A panicking listener must not disable event delivery for the whole process.
fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
