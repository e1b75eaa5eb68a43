//! cmdflow - composable command/result algebra
//!
//! Wraps external process invocations and in-process callables into
//! retryable, sequenceable units with asynchronous, non-blocking
//! semantics. A [`Command`] produces exactly one [`Outcome`] per
//! execution and may be executed any number of times; combinators
//! (`and`, `or`, `retry_until`) route control flow between commands
//! without introducing failure modes of their own.
//!
//! # Modules
//!
//! - [`command`] - the `Command` trait, output sinks, and the fluent
//!   combinator extension
//! - [`outcome`] - the pass/fail result type produced by every execution
//! - [`process`] - subprocess-backed commands
//! - [`callable`] - commands backed by in-process async closures
//! - [`simple`] - the always-succeed and always-fail commands
//! - [`combinator`] - AND / OR / retry-until composites

pub mod callable;
pub mod combinator;
pub mod command;
pub mod outcome;
pub mod process;
pub mod simple;

pub use callable::CallableCommand;
pub use combinator::{AndCommand, OrCommand, RetryCommand, StopPredicate, stop_when};
pub use command::{BoxCommand, Command, CommandExt, MemorySink, OutputSink, Sink, StdioSink};
pub use outcome::{ExitError, Failure, Outcome};
pub use process::{FailureRecast, ProcessCommand, SuccessHook};
pub use simple::{FailCommand, NoOpCommand};
