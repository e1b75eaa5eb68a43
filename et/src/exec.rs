//! Command execution for the CLI front-end
//!
//! A launcher returns a list of independent commands; this runner
//! executes the list concurrently, one tokio task per entry, streaming
//! each command's output to the terminal with a per-command tag.
//! Sequencing within one entry is already expressed by the command
//! combinators, so nothing here imposes additional ordering.

use std::sync::Arc;

use async_trait::async_trait;
use cmdflow::{BoxCommand, Outcome, OutputSink};
use colored::Colorize;
use tokio::task::JoinSet;
use tracing::{error, warn};

use crate::workflow::AbortDecision;

/// Terminal sink tagging every line with the command it came from.
struct ConsoleSink {
    tag: String,
    to_stderr: bool,
}

impl OutputSink for ConsoleSink {
    fn line(&self, line: &str) {
        if self.to_stderr {
            eprintln!("{} {}", self.tag.red(), line);
        } else {
            println!("{} {}", self.tag.dimmed(), line);
        }
    }
}

/// Run the command list concurrently and return the outcomes in the
/// list's order.
pub async fn run_commands(commands: Vec<BoxCommand>) -> Vec<Outcome> {
    let total = commands.len();
    let mut set = JoinSet::new();
    for (idx, command) in commands.into_iter().enumerate() {
        let tag = format!("[{}/{}]", idx + 1, total);
        command.add_stdout_sink(Arc::new(ConsoleSink {
            tag: tag.clone(),
            to_stderr: false,
        }));
        command.add_stderr_sink(Arc::new(ConsoleSink {
            tag,
            to_stderr: true,
        }));
        command.set_announce(true);
        set.spawn(async move { (idx, command.execute().await) });
    }

    let mut outcomes: Vec<Option<Outcome>> = (0..total).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, outcome)) => outcomes[idx] = Some(outcome),
            Err(e) => error!("command task panicked: {}", e),
        }
    }
    outcomes.into_iter().flatten().collect()
}

/// Print a summary of the outcomes; true when every command succeeded.
pub fn report(outcomes: &[Outcome]) -> bool {
    let mut all_ok = true;
    for outcome in outcomes {
        if outcome.is_failed() {
            all_ok = false;
            let message = outcome.error_message().unwrap_or("unknown failure");
            eprintln!("{} {}", "FAILED".red().bold(), message);
        }
    }
    if all_ok && !outcomes.is_empty() {
        println!("{} {} command(s) finished", "ok".green(), outcomes.len());
    }
    all_ok
}

/// Interactive abort decision: asks on the terminal whether to give up
/// on a conflicted merge. Reading errors (e.g. closed stdin) abort.
pub struct PromptAbortDecision;

#[async_trait]
impl AbortDecision for PromptAbortDecision {
    async fn should_abort(&self, worktree: &str) -> bool {
        let prompt = format!(
            "Merge conflict in '{}'. Resolve it in another terminal, then answer: abort the merge? [y/N] ",
            worktree
        );
        let answer = tokio::task::spawn_blocking(move || {
            use std::io::Write;
            print!("{}", prompt);
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            match std::io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => true,
                Ok(_) => matches!(line.trim(), "y" | "Y" | "yes"),
            }
        })
        .await;
        match answer {
            Ok(abort) => abort,
            Err(e) => {
                warn!("abort prompt failed, aborting merge: {}", e);
                true
            }
        }
    }
}
