//! AND / OR / retry-until composites
//!
//! Combinators are pure compositions: they route control flow between
//! the wrapped commands and never introduce failure modes of their own.
//! Sink registration and the announce flag are forwarded to every child
//! so composed executions stay observable.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::command::{BoxCommand, Command, Sink};
use crate::outcome::Outcome;

/// Decides when a [`RetryCommand`] stops retrying a failed outcome.
#[async_trait]
pub trait StopPredicate: Send + Sync {
    async fn should_stop(&self, outcome: &Outcome) -> bool;
}

struct FnStop<F>(F);

#[async_trait]
impl<F> StopPredicate for FnStop<F>
where
    F: Fn(&Outcome) -> bool + Send + Sync,
{
    async fn should_stop(&self, outcome: &Outcome) -> bool {
        (self.0)(outcome)
    }
}

/// Stop predicate from a synchronous closure.
pub fn stop_when<F>(f: F) -> Arc<dyn StopPredicate>
where
    F: Fn(&Outcome) -> bool + Send + Sync + 'static,
{
    Arc::new(FnStop(f))
}

/// Sequence-if-success: `a` then `b`, short-circuiting on `a`'s failure.
pub struct AndCommand {
    a: BoxCommand,
    b: BoxCommand,
}

impl AndCommand {
    pub fn new(a: BoxCommand, b: BoxCommand) -> Self {
        Self { a, b }
    }
}

#[async_trait]
impl Command for AndCommand {
    async fn execute(&self) -> Outcome {
        let first = self.a.execute().await;
        if first.is_failed() {
            debug!(command = %self.a.description(), "AND short-circuit on failure");
            return first;
        }
        self.b.execute().await
    }

    fn description(&self) -> String {
        format!("{} && {}", self.a.description(), self.b.description())
    }

    fn add_stdout_sink(&self, sink: Sink) {
        self.a.add_stdout_sink(sink.clone());
        self.b.add_stdout_sink(sink);
    }

    fn add_stderr_sink(&self, sink: Sink) {
        self.a.add_stderr_sink(sink.clone());
        self.b.add_stderr_sink(sink);
    }

    fn set_announce(&self, announce: bool) {
        self.a.set_announce(announce);
        self.b.set_announce(announce);
    }
}

/// Sequence-if-failure: `a`, falling back to `b` only when `a` failed.
pub struct OrCommand {
    a: BoxCommand,
    b: BoxCommand,
}

impl OrCommand {
    pub fn new(a: BoxCommand, b: BoxCommand) -> Self {
        Self { a, b }
    }
}

#[async_trait]
impl Command for OrCommand {
    async fn execute(&self) -> Outcome {
        let first = self.a.execute().await;
        if !first.is_failed() {
            return first;
        }
        debug!(command = %self.a.description(), "OR falling back after failure");
        self.b.execute().await
    }

    fn description(&self) -> String {
        format!("{} || {}", self.a.description(), self.b.description())
    }

    fn add_stdout_sink(&self, sink: Sink) {
        self.a.add_stdout_sink(sink.clone());
        self.b.add_stdout_sink(sink);
    }

    fn add_stderr_sink(&self, sink: Sink) {
        self.a.add_stderr_sink(sink.clone());
        self.b.add_stderr_sink(sink);
    }

    fn set_announce(&self, announce: bool) {
        self.a.set_announce(announce);
        self.b.set_announce(announce);
    }
}

/// Re-runs the wrapped command while it fails and the stop predicate
/// declines to stop. Yields the first outcome that is successful or
/// stop-approved. Retries are bounded only by the predicate; an
/// unbounded predicate (e.g. a user-interaction gate) is the caller's
/// responsibility.
pub struct RetryCommand {
    inner: BoxCommand,
    stop: Arc<dyn StopPredicate>,
}

impl RetryCommand {
    pub fn new(inner: BoxCommand, stop: Arc<dyn StopPredicate>) -> Self {
        Self { inner, stop }
    }
}

#[async_trait]
impl Command for RetryCommand {
    async fn execute(&self) -> Outcome {
        loop {
            let outcome = self.inner.execute().await;
            if !outcome.is_failed() {
                return outcome;
            }
            if self.stop.should_stop(&outcome).await {
                debug!(command = %self.inner.description(), "retry stopped by predicate");
                return outcome;
            }
            debug!(command = %self.inner.description(), "retrying failed command");
        }
    }

    fn description(&self) -> String {
        self.inner.description()
    }

    fn add_stdout_sink(&self, sink: Sink) {
        self.inner.add_stdout_sink(sink);
    }

    fn add_stderr_sink(&self, sink: Sink) {
        self.inner.add_stderr_sink(sink);
    }

    fn set_announce(&self, announce: bool) {
        self.inner.set_announce(announce);
    }
}
