//! Always-succeed and always-fail commands

use async_trait::async_trait;

use crate::command::{BoxCommand, Command, Sink, SinkSet};
use crate::outcome::Outcome;

/// Always succeeds. Used as a sequence seed or a pure informational step;
/// the optional message is written to the stdout sinks on every
/// execution.
pub struct NoOpCommand {
    display: String,
    message: Option<String>,
    sinks: SinkSet,
}

impl NoOpCommand {
    pub fn new(display: impl Into<String>) -> Self {
        Self {
            display: display.into(),
            message: None,
            sinks: SinkSet::default(),
        }
    }

    /// Informational no-op that explains itself to the stdout sinks.
    pub fn with_message(display: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            display: display.into(),
            message: Some(message.into()),
            sinks: SinkSet::default(),
        }
    }

    pub fn boxed(self) -> BoxCommand {
        Box::new(self)
    }
}

#[async_trait]
impl Command for NoOpCommand {
    async fn execute(&self) -> Outcome {
        if self.sinks.announce() {
            self.sinks.stdout_line(&self.display);
        }
        if let Some(message) = &self.message {
            self.sinks.stdout_line(message);
        }
        Outcome::success(self.display.clone())
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

/// Always fails with a fixed message. Terminates an OR-chain with a clear
/// terminal failure once recovery attempts are exhausted.
pub struct FailCommand {
    display: String,
    message: String,
    sinks: SinkSet,
}

impl FailCommand {
    pub fn new(display: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            display: display.into(),
            message: message.into(),
            sinks: SinkSet::default(),
        }
    }

    pub fn boxed(self) -> BoxCommand {
        Box::new(self)
    }
}

#[async_trait]
impl Command for FailCommand {
    async fn execute(&self) -> Outcome {
        if self.sinks.announce() {
            self.sinks.stdout_line(&self.display);
        }
        Outcome::failure(self.display.clone(), self.message.clone())
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
    use crate::command::MemorySink;

    #[tokio::test]
    async fn test_noop_always_succeeds() {
        let cmd = NoOpCommand::new("nothing");
        for _ in 0..5 {
            assert!(!cmd.execute().await.is_failed());
        }
    }

    #[tokio::test]
    async fn test_noop_message_reaches_sinks() {
        let cmd = NoOpCommand::with_message("skip", "pull skipped: branch only exists locally");
        let sink = MemorySink::new();
        cmd.add_stdout_sink(sink.clone());
        cmd.execute().await;
        assert_eq!(sink.lines(), vec!["pull skipped: branch only exists locally"]);
    }

    #[tokio::test]
    async fn test_fail_always_fails_with_fixed_message() {
        let cmd = FailCommand::new("terminal", "ABORTED MERGE");
        let outcome = cmd.execute().await;
        assert!(outcome.is_failed());
        assert_eq!(outcome.error_message(), Some("ABORTED MERGE"));
    }
}
