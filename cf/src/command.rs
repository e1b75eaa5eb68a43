//! The Command trait, output sinks, and fluent combinator extension

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::combinator::{AndCommand, OrCommand, RetryCommand, StopPredicate};
use crate::outcome::Outcome;

/// Receives output lines from command executions.
///
/// Sinks are registered before `execute()` and receive all output from
/// every execution of the command they are attached to.
pub trait OutputSink: Send + Sync {
    fn line(&self, line: &str);
}

/// Shared handle to an output sink.
pub type Sink = Arc<dyn OutputSink>;

/// Sink that writes to the process stdout or stderr.
pub struct StdioSink {
    prefix: String,
    to_stderr: bool,
}

impl StdioSink {
    pub fn stdout(prefix: impl Into<String>) -> Sink {
        Arc::new(Self {
            prefix: prefix.into(),
            to_stderr: false,
        })
    }

    pub fn stderr(prefix: impl Into<String>) -> Sink {
        Arc::new(Self {
            prefix: prefix.into(),
            to_stderr: true,
        })
    }
}

impl OutputSink for StdioSink {
    fn line(&self, line: &str) {
        if self.to_stderr {
            eprintln!("{}{}", self.prefix, line);
        } else {
            println!("{}{}", self.prefix, line);
        }
    }
}

/// Sink collecting lines into memory. Mostly useful in tests and for
/// front-ends that render output after the fact.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("sink mutex poisoned").clone()
    }
}

impl OutputSink for MemorySink {
    fn line(&self, line: &str) {
        self.lines.lock().expect("sink mutex poisoned").push(line.to_string());
    }
}

/// One unit of work: a subprocess invocation or an in-process callable.
///
/// Executing a command is asynchronous and non-blocking; each call to
/// [`Command::execute`] starts a fresh run and yields exactly one
/// [`Outcome`]. Commands are re-executable.
#[async_trait]
pub trait Command: Send + Sync {
    /// Run the command once and resolve its outcome.
    async fn execute(&self) -> Outcome;

    /// Human-readable description, also used to tie outcomes back to the
    /// command that produced them.
    fn description(&self) -> String;

    /// Register a sink receiving stdout lines from every execution.
    fn add_stdout_sink(&self, sink: Sink);

    /// Register a sink receiving stderr lines from every execution.
    fn add_stderr_sink(&self, sink: Sink);

    /// Toggle whether the command announces its description to its stdout
    /// sinks before running. Composites propagate the flag to their
    /// children.
    fn set_announce(&self, announce: bool);
}

/// Boxed command, the unit launchers hand to front-ends.
pub type BoxCommand = Box<dyn Command>;

/// Fluent combinator surface over boxed commands.
pub trait CommandExt: Sized {
    /// Sequence-if-success: run `self`, then `next` only if `self` did not
    /// fail; yields the last-run command's outcome.
    fn and(self, next: BoxCommand) -> BoxCommand;

    /// Sequence-if-failure: run `self`, then `fallback` only if `self`
    /// failed; yields the last-run command's outcome.
    fn or(self, fallback: BoxCommand) -> BoxCommand;

    /// Re-run `self` while it fails and the stop predicate declines to
    /// stop. Unbounded; termination is owned by the predicate.
    fn retry_until(self, stop: Arc<dyn StopPredicate>) -> BoxCommand;
}

impl CommandExt for BoxCommand {
    fn and(self, next: BoxCommand) -> BoxCommand {
        Box::new(AndCommand::new(self, next))
    }

    fn or(self, fallback: BoxCommand) -> BoxCommand {
        Box::new(OrCommand::new(self, fallback))
    }

    fn retry_until(self, stop: Arc<dyn StopPredicate>) -> BoxCommand {
        Box::new(RetryCommand::new(self, stop))
    }
}

/// Sink registrations plus the announce flag, shared by the leaf command
/// kinds. Composites do not own one; they delegate to their children.
#[derive(Default)]
pub(crate) struct SinkSet {
    stdout: Mutex<Vec<Sink>>,
    stderr: Mutex<Vec<Sink>>,
    announce: AtomicBool,
}

impl SinkSet {
    pub fn add_stdout(&self, sink: Sink) {
        self.stdout.lock().expect("sink mutex poisoned").push(sink);
    }

    pub fn add_stderr(&self, sink: Sink) {
        self.stderr.lock().expect("sink mutex poisoned").push(sink);
    }

    pub fn set_announce(&self, announce: bool) {
        self.announce.store(announce, Ordering::Relaxed);
    }

    pub fn announce(&self) -> bool {
        self.announce.load(Ordering::Relaxed)
    }

    /// Snapshot of the stdout sinks, safe to use across await points.
    pub fn stdout_sinks(&self) -> Vec<Sink> {
        self.stdout.lock().expect("sink mutex poisoned").clone()
    }

    pub fn stderr_sinks(&self) -> Vec<Sink> {
        self.stderr.lock().expect("sink mutex poisoned").clone()
    }

    pub fn stdout_line(&self, line: &str) {
        for sink in self.stdout_sinks() {
            sink.line(line);
        }
    }
}
