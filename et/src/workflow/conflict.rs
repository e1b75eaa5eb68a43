//! Merge-conflict retry/abort policy
//!
//! A merge or pull attempt that fails with a conflict is recovered by
//! retrying the continue-merge command until it succeeds or the caller's
//! abort decision (scoped to the worktree) approves giving up. Aborting
//! runs abort-merge and then fails with the fixed message, so a consumer
//! can always tell an aborted merge from every other failure.

use std::sync::Arc;

use async_trait::async_trait;
use cmdflow::combinator::{RetryCommand, StopPredicate};
use cmdflow::{BoxCommand, Command, Outcome, Sink};
use tracing::debug;

use crate::repo::is_merge_conflict;

/// Fixed failure message of an aborted merge.
pub const ABORTED_MERGE: &str = "ABORTED MERGE";

/// Decides whether to abort conflict recovery for one worktree.
/// Typically a user-interaction gate; the decision may block for as
/// long as it likes.
#[async_trait]
pub trait AbortDecision: Send + Sync {
    async fn should_abort(&self, worktree: &str) -> bool;
}

/// Abort decision with a fixed answer, for non-interactive callers.
pub struct FixedAbortDecision(pub bool);

#[async_trait]
impl AbortDecision for FixedAbortDecision {
    async fn should_abort(&self, _worktree: &str) -> bool {
        self.0
    }
}

/// Stop predicate bridging the abort decision into the retry
/// combinator: non-conflict failures stop immediately (they are never
/// retried), conflicts stop when the decision says to give up.
struct AbortStop {
    decision: Arc<dyn AbortDecision>,
    worktree: String,
}

#[async_trait]
impl StopPredicate for AbortStop {
    async fn should_stop(&self, outcome: &Outcome) -> bool {
        if !is_merge_conflict(outcome) {
            return true;
        }
        self.decision.should_abort(&self.worktree).await
    }
}

/// Wraps a merge/pull attempt in the conflict retry/abort policy.
pub struct ConflictRetryCommand {
    attempt: BoxCommand,
    retry_continue: BoxCommand,
    abort_merge: BoxCommand,
    worktree: String,
}

impl ConflictRetryCommand {
    pub fn new(
        attempt: BoxCommand,
        continue_merge: BoxCommand,
        abort_merge: BoxCommand,
        decision: Arc<dyn AbortDecision>,
        worktree: impl Into<String>,
    ) -> Self {
        let worktree = worktree.into();
        let stop: Arc<dyn StopPredicate> = Arc::new(AbortStop {
            decision,
            worktree: worktree.clone(),
        });
        Self {
            attempt,
            retry_continue: Box::new(RetryCommand::new(continue_merge, stop)),
            abort_merge,
            worktree,
        }
    }
}

#[async_trait]
impl Command for ConflictRetryCommand {
    async fn execute(&self) -> Outcome {
        let outcome = self.attempt.execute().await;
        if !outcome.is_failed() || !is_merge_conflict(&outcome) {
            return outcome;
        }

        debug!(worktree = %self.worktree, "merge conflict, entering recovery");
        let recovered = self.retry_continue.execute().await;
        if !recovered.is_failed() {
            return recovered;
        }
        if !is_merge_conflict(&recovered) {
            // Some other failure surfaced during recovery; it is not
            // retried and not masked by an abort.
            return recovered;
        }

        debug!(worktree = %self.worktree, "recovery aborted");
        self.abort_merge.execute().await;
        Outcome::failure(self.description(), ABORTED_MERGE)
    }

    fn description(&self) -> String {
        self.attempt.description()
    }

    fn add_stdout_sink(&self, sink: Sink) {
        self.attempt.add_stdout_sink(sink.clone());
        self.retry_continue.add_stdout_sink(sink.clone());
        self.abort_merge.add_stdout_sink(sink);
    }

    fn add_stderr_sink(&self, sink: Sink) {
        self.attempt.add_stderr_sink(sink.clone());
        self.retry_continue.add_stderr_sink(sink.clone());
        self.abort_merge.add_stderr_sink(sink);
    }

    fn set_announce(&self, announce: bool) {
        self.attempt.set_announce(announce);
        self.retry_continue.set_announce(announce);
        self.abort_merge.set_announce(announce);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::RepoError;
    use cmdflow::{CallableCommand, NoOpCommand};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn conflict_outcome(desc: &str) -> Outcome {
        Outcome::failure_with_cause(
            desc,
            "merge conflict",
            Arc::new(RepoError::MergeConflict("wt".into())),
        )
    }

    fn conflicting_command(desc: &'static str, count: Arc<AtomicUsize>) -> BoxCommand {
        CallableCommand::new(desc, move || {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                conflict_outcome(desc)
            }
        })
        .boxed()
    }

    /// Continue command that conflicts `failures` times, then succeeds.
    fn eventually_succeeding(failures: usize, count: Arc<AtomicUsize>) -> BoxCommand {
        CallableCommand::new("continue", move || {
            let count = count.clone();
            async move {
                let n = count.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= failures {
                    conflict_outcome("continue")
                } else {
                    Outcome::success("continue")
                }
            }
        })
        .boxed()
    }

    #[tokio::test]
    async fn test_success_skips_recovery() {
        let continues = Arc::new(AtomicUsize::new(0));
        let command = ConflictRetryCommand::new(
            NoOpCommand::new("merge").boxed(),
            conflicting_command("continue", continues.clone()),
            NoOpCommand::new("abort").boxed(),
            Arc::new(FixedAbortDecision(false)),
            "wt",
        );
        assert!(!command.execute().await.is_failed());
        assert_eq!(continues.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_conflict_failure_is_not_retried() {
        let continues = Arc::new(AtomicUsize::new(0));
        let command = ConflictRetryCommand::new(
            cmdflow::FailCommand::new("merge", "network down").boxed(),
            conflicting_command("continue", continues.clone()),
            NoOpCommand::new("abort").boxed(),
            Arc::new(FixedAbortDecision(false)),
            "wt",
        );
        let outcome = command.execute().await;
        assert!(outcome.is_failed());
        assert_eq!(outcome.error_message(), Some("network down"));
        assert_eq!(continues.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_conflict_retries_continue_until_success() {
        let merges = Arc::new(AtomicUsize::new(0));
        let continues = Arc::new(AtomicUsize::new(0));
        let command = ConflictRetryCommand::new(
            conflicting_command("merge", merges.clone()),
            eventually_succeeding(2, continues.clone()),
            NoOpCommand::new("abort").boxed(),
            Arc::new(FixedAbortDecision(false)),
            "wt",
        );
        let outcome = command.execute().await;
        assert!(!outcome.is_failed());
        assert_eq!(merges.load(Ordering::SeqCst), 1);
        assert_eq!(continues.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_abort_runs_abort_merge_and_fails_fixed() {
        let aborts = Arc::new(AtomicUsize::new(0));
        let abort_counter = aborts.clone();
        let abort_cmd = CallableCommand::new("abort", move || {
            let abort_counter = abort_counter.clone();
            async move {
                abort_counter.fetch_add(1, Ordering::SeqCst);
                Outcome::success("abort")
            }
        })
        .boxed();

        let continues = Arc::new(AtomicUsize::new(0));
        let command = ConflictRetryCommand::new(
            conflicting_command("merge", Arc::new(AtomicUsize::new(0))),
            conflicting_command("continue", continues.clone()),
            abort_cmd,
            Arc::new(FixedAbortDecision(true)),
            "wt",
        );
        let outcome = command.execute().await;
        assert!(outcome.is_failed());
        assert_eq!(outcome.error_message(), Some(ABORTED_MERGE));
        assert_eq!(aborts.load(Ordering::SeqCst), 1);
        assert_eq!(continues.load(Ordering::SeqCst), 1, "continue ran once before the abort");
    }

    struct AbortAfter {
        asks: AtomicUsize,
        limit: usize,
    }

    #[async_trait]
    impl AbortDecision for AbortAfter {
        async fn should_abort(&self, _worktree: &str) -> bool {
            self.asks.fetch_add(1, Ordering::SeqCst) + 1 >= self.limit
        }
    }

    #[tokio::test]
    async fn test_decision_is_consulted_per_failed_continue() {
        let continues = Arc::new(AtomicUsize::new(0));
        let command = ConflictRetryCommand::new(
            conflicting_command("merge", Arc::new(AtomicUsize::new(0))),
            conflicting_command("continue", continues.clone()),
            NoOpCommand::new("abort").boxed(),
            Arc::new(AbortAfter {
                asks: AtomicUsize::new(0),
                limit: 3,
            }),
            "wt",
        );
        let outcome = command.execute().await;
        assert_eq!(outcome.error_message(), Some(ABORTED_MERGE));
        assert_eq!(continues.load(Ordering::SeqCst), 3);
    }
}
