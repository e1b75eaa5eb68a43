//! Subprocess-backed commands

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::command::{BoxCommand, Command, Sink, SinkSet};
use crate::outcome::{ExitError, Failure, Outcome};

/// Hook run after a successful execution, before the outcome resolves.
/// Used by callers to keep derived state (e.g. branch caches) in step
/// with what the process just did.
pub type SuccessHook = Box<dyn Fn() + Send + Sync>;

/// Recasts the generic bad-exit failure of a process command into a
/// domain-specific one. The recast may inspect external state (it is
/// async) but must preserve the failure if it decides not to reclassify.
#[async_trait]
pub trait FailureRecast: Send + Sync {
    async fn recast(&self, failure: Failure) -> Failure;
}

/// Wraps one subprocess invocation in a working directory.
///
/// Output is streamed line-wise to the registered sinks; stderr is
/// additionally captured so a non-zero exit can embed it in the failure
/// message. Dropping the future returned by `execute()` kills the child
/// process and, on unix, its whole process group.
pub struct ProcessCommand {
    display: String,
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
    envs: Vec<(String, String)>,
    ignore_exit_status: bool,
    on_success: Vec<SuccessHook>,
    recast: Option<Arc<dyn FailureRecast>>,
    sinks: SinkSet,
}

impl ProcessCommand {
    pub fn new(display: impl Into<String>, program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            display: display.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            envs: Vec::new(),
            ignore_exit_status: false,
            on_success: Vec::new(),
            recast: None,
            sinks: SinkSet::default(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Treat any exit status as success. Success hooks still run.
    pub fn ignore_exit_status(mut self) -> Self {
        self.ignore_exit_status = true;
        self
    }

    /// Register a hook run after every successful execution.
    pub fn on_success(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_success.push(Box::new(hook));
        self
    }

    /// Install a failure recast, replacing any previous one.
    pub fn recast_failure(mut self, recast: Arc<dyn FailureRecast>) -> Self {
        self.recast = Some(recast);
        self
    }

    pub fn boxed(self) -> BoxCommand {
        Box::new(self)
    }
}

/// Kills the child's process group if the execution is dropped before
/// the process has exited.
#[cfg(unix)]
struct GroupKillGuard {
    pgid: Option<i32>,
}

#[cfg(unix)]
impl GroupKillGuard {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.map(|p| p as i32),
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

#[cfg(unix)]
impl Drop for GroupKillGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid {
            // The child was spawned as its own group leader, so this
            // reaches the child and all of its descendants.
            let _ = nix::sys::signal::killpg(nix::unistd::Pid::from_raw(pgid), nix::sys::signal::Signal::SIGKILL);
        }
    }
}

async fn forward_lines<R>(reader: R, sinks: Vec<Sink>, capture: bool) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut captured = String::new();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                for sink in &sinks {
                    sink.line(&line);
                }
                if capture {
                    captured.push_str(&line);
                    captured.push('\n');
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("failed to read process output: {}", e);
                break;
            }
        }
    }
    captured
}

#[async_trait]
impl Command for ProcessCommand {
    async fn execute(&self) -> Outcome {
        debug!(command = %self.display, "executing process command");
        if self.sinks.announce() {
            self.sinks.stdout_line(&self.display);
        }

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return Outcome::failure_with_cause(
                    self.display.clone(),
                    format!("failed to start '{}': {}", self.program, e),
                    Arc::new(e),
                );
            }
        };

        #[cfg(unix)]
        let mut guard = GroupKillGuard::new(child.id());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_sinks = self.sinks.stdout_sinks();
        let stderr_sinks = self.sinks.stderr_sinks();
        let stdout_task = async move {
            match stdout {
                Some(out) => forward_lines(out, stdout_sinks, false).await,
                None => String::new(),
            }
        };
        let stderr_task = async move {
            match stderr {
                Some(err) => forward_lines(err, stderr_sinks, true).await,
                None => String::new(),
            }
        };

        let (status, _, stderr) = tokio::join!(child.wait(), stdout_task, stderr_task);

        #[cfg(unix)]
        guard.disarm();

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                return Outcome::failure_with_cause(
                    self.display.clone(),
                    format!("failed to wait for '{}': {}", self.program, e),
                    Arc::new(e),
                );
            }
        };

        if status.success() || self.ignore_exit_status {
            for hook in &self.on_success {
                hook();
            }
            return Outcome::success(self.display.clone());
        }

        let code = status.code().unwrap_or(-1);
        let stderr = stderr.trim_end().to_string();
        debug!(command = %self.display, code, "process command failed");
        let mut failure = Failure::with_cause(
            if stderr.is_empty() {
                format!("'{}' exited with status {}", self.display, code)
            } else {
                format!("'{}' exited with status {}: {}", self.display, code, stderr)
            },
            Arc::new(ExitError { status: code, stderr }),
        );
        if let Some(recast) = &self.recast {
            failure = recast.recast(failure).await;
        }
        Outcome::from_failure(self.display.clone(), failure)
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
    async fn test_successful_process() {
        let cmd = ProcessCommand::new("echo hello", "sh", ".")
            .arg("-c")
            .arg("echo hello");
        let sink = MemorySink::new();
        cmd.add_stdout_sink(sink.clone());

        let outcome = cmd.execute().await;
        assert!(!outcome.is_failed());
        assert_eq!(sink.lines(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_failed_process_embeds_stderr() {
        let cmd = ProcessCommand::new("failing", "sh", ".")
            .arg("-c")
            .arg("echo oops >&2; exit 3");
        let outcome = cmd.execute().await;
        assert!(outcome.is_failed());
        let message = outcome.error_message().expect("failure message");
        assert!(message.contains("status 3"), "message: {}", message);
        assert!(message.contains("oops"), "message: {}", message);
        let exit = outcome.cause_as::<ExitError>().expect("exit cause");
        assert_eq!(exit.status, 3);
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let cmd = ProcessCommand::new("nope", "definitely-not-a-real-binary-9e3b", ".");
        let outcome = cmd.execute().await;
        assert!(outcome.is_failed());
    }

    #[tokio::test]
    async fn test_ignore_exit_status() {
        let called = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = called.clone();
        let cmd = ProcessCommand::new("tolerated", "sh", ".")
            .arg("-c")
            .arg("exit 1")
            .ignore_exit_status()
            .on_success(move || {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            });
        let outcome = cmd.execute().await;
        assert!(!outcome.is_failed());
        assert_eq!(called.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_success_hooks_do_not_run_on_failure() {
        let called = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = called.clone();
        let cmd = ProcessCommand::new("failing", "sh", ".")
            .arg("-c")
            .arg("exit 1")
            .on_success(move || {
                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            });
        let outcome = cmd.execute().await;
        assert!(outcome.is_failed());
        assert_eq!(called.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_announce_prints_description_first() {
        let cmd = ProcessCommand::new("echo hi", "sh", ".").arg("-c").arg("echo hi");
        cmd.set_announce(true);
        let sink = MemorySink::new();
        cmd.add_stdout_sink(sink.clone());

        cmd.execute().await;
        assert_eq!(sink.lines(), vec!["echo hi", "hi"]);
    }

    #[tokio::test]
    async fn test_reexecution_is_fresh() {
        let cmd = ProcessCommand::new("echo again", "sh", ".").arg("-c").arg("echo again");
        let sink = MemorySink::new();
        cmd.add_stdout_sink(sink.clone());

        cmd.execute().await;
        cmd.execute().await;
        assert_eq!(sink.lines(), vec!["again", "again"]);
    }

    struct AlwaysConflict;

    #[async_trait]
    impl FailureRecast for AlwaysConflict {
        async fn recast(&self, failure: Failure) -> Failure {
            failure.recast("conflict", Arc::new(std::io::Error::other("conflict")))
        }
    }

    #[tokio::test]
    async fn test_recast_replaces_generic_failure() {
        let cmd = ProcessCommand::new("failing", "sh", ".")
            .arg("-c")
            .arg("exit 1")
            .recast_failure(Arc::new(AlwaysConflict));
        let outcome = cmd.execute().await;
        assert!(outcome.is_failed());
        assert_eq!(outcome.error_message(), Some("conflict"));
        assert!(outcome.cause_as::<std::io::Error>().is_some());
    }
}
