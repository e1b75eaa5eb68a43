//! Commands backed by in-process async closures

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::debug;

use crate::command::{BoxCommand, Command, Sink, SinkSet};
use crate::outcome::Outcome;

type Callable = Box<dyn Fn() -> BoxFuture<'static, Outcome> + Send + Sync>;

/// Wraps an in-process unit of work that builds its own [`Outcome`].
///
/// Used for filesystem cleanup, hook installation, and local status
/// checks that do not need a subprocess.
pub struct CallableCommand {
    display: String,
    call: Callable,
    sinks: SinkSet,
}

impl CallableCommand {
    pub fn new<F, Fut>(display: impl Into<String>, call: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Outcome> + Send + 'static,
    {
        Self {
            display: display.into(),
            call: Box::new(move || Box::pin(call())),
            sinks: SinkSet::default(),
        }
    }

    pub fn boxed(self) -> BoxCommand {
        Box::new(self)
    }
}

#[async_trait]
impl Command for CallableCommand {
    async fn execute(&self) -> Outcome {
        debug!(command = %self.display, "executing callable command");
        if self.sinks.announce() {
            self.sinks.stdout_line(&self.display);
        }
        (self.call)().await
    }

    fn description(&self) -> String {
        self.display.clone()
    }

    fn add_stdout_sink(&self, sink: Sink) {
        self.sinks.add_stdout(sink);
    }

    fn add_stderr_sink(&self, sink: Sink) {
        self.sinks.add_stderr(sink);
    }

    fn set_announce(&self, announce: bool) {
        self.sinks.set_announce(announce);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_callable_builds_its_own_outcome() {
        let cmd = CallableCommand::new("check", || async { Outcome::failure("check", "not clean") });
        let outcome = cmd.execute().await;
        assert!(outcome.is_failed());
        assert_eq!(outcome.error_message(), Some("not clean"));
    }

    #[tokio::test]
    async fn test_callable_runs_fresh_each_execution() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let cmd = CallableCommand::new("count", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Outcome::success("count")
            }
        });
        cmd.execute().await;
        cmd.execute().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
