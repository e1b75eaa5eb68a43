//! envtree - multi-repository environment and worktree automation
//!
//! CLI entry point: resolves the environment, builds the requested
//! launcher, and runs its command list concurrently.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::info;

use envtree::cli::{Cli, Command, FeatureCommand};
use envtree::config::{Config, ConfigError};
use envtree::exec::{PromptAbortDecision, report, run_commands};
use envtree::repo::GitContext;
use envtree::scratch::ScratchDir;
use envtree::workflow::{
    AbortDecision, EnvironmentWorkflow, FixedAbortDecision, Launcher, ProviderRegistry,
    WorkflowError,
};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("envtree")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Level precedence: CLI --log-level > config file > INFO default
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let log_file = fs::File::create(log_dir.join("envtree.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn exit_for_config_error(e: &ConfigError) -> ExitCode {
    eprintln!("Error: {}", e);
    if e.is_fatal() {
        eprintln!("Fatal configuration error, ending session");
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

/// Build and run a launcher's command list; false on guard rejection or
/// any failed command.
async fn run_launcher(launcher: &dyn Launcher) -> bool {
    match launcher.launch().await {
        Ok(commands) if commands.is_empty() => {
            println!("{}: nothing to do", launcher.display_name());
            true
        }
        Ok(commands) => {
            info!(launcher = launcher.id(), count = commands.len(), "running launcher");
            let outcomes = run_commands(commands).await;
            report(&outcomes)
        }
        Err(WorkflowError::GuardFailed { reason, .. }) => {
            eprintln!("{} is not available: {}", launcher.display_name(), reason);
            false
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            false
        }
    }
}

async fn print_status(wf: &Arc<EnvironmentWorkflow>) -> Result<()> {
    let env = wf.environment();
    let state = if wf.is_obsolete() {
        "Obsolete"
    } else if wf.requires_clone() {
        "NeedsClone"
    } else if wf.requires_worktree_setup().await? {
        "NeedsWorktreeSetup"
    } else {
        "Ready"
    };
    println!("{}  state: {}", env.qualified_name(), state);
    for (repo, worktree) in wf.entries() {
        if !repo.is_cloned() {
            println!("  {}  not cloned", repo.id());
            continue;
        }
        if worktree.is_added().await? {
            println!("  {}  cloned  worktree on '{}'", repo.id(), worktree.branch().await?);
        } else {
            println!("  {}  cloned  worktree missing", repo.id());
        }
    }
    Ok(())
}

async fn run(cli: Cli, config: Config) -> Result<ExitCode> {
    let env_name = match &cli.command {
        Command::Status { env }
        | Command::Clone { env }
        | Command::Sync { env }
        | Command::Setup { env }
        | Command::Remove { env }
        | Command::Feature { env, .. } => env.clone(),
    };

    let env = match config.find_environment(&env_name) {
        Ok(env) => env.clone(),
        Err(e) => return Ok(exit_for_config_error(&e)),
    };

    let scratch = match ScratchDir::create(&config.storage.scratch_dir) {
        Ok(scratch) => scratch,
        Err(e) => return Ok(exit_for_config_error(&e)),
    };
    let hooks = match scratch.default_hooks() {
        Ok(hooks) => hooks,
        Err(e) => return Ok(exit_for_config_error(&e)),
    };

    let git = GitContext::new(&config.git.binary);
    let wf = Arc::new(EnvironmentWorkflow::new(env, git, &config.storage.clones_dir, hooks));

    let ok = match cli.command {
        Command::Status { .. } => {
            print_status(&wf).await?;
            true
        }
        Command::Clone { .. } => run_launcher(&wf.clone_launcher()).await,
        Command::Sync { .. } => run_launcher(&wf.synchronize_launcher()).await,
        Command::Setup { .. } => run_launcher(&wf.setup_worktree_launcher()).await,
        Command::Remove { .. } => run_launcher(&wf.remove_worktree_launcher()).await,
        Command::Feature { command, .. } => {
            let registry = ProviderRegistry::builtin();
            let (provider_name, name) = match &command {
                FeatureCommand::Checkout { name, provider } => (provider.clone(), name.clone()),
                FeatureCommand::Merge { name }
                | FeatureCommand::Pull { name }
                | FeatureCommand::Clean { name }
                | FeatureCommand::RemoveBranch { name } => ("manual".to_string(), name.clone()),
            };
            let Some(provider) = registry.get(&provider_name) else {
                eprintln!("Error: unknown feature branch provider '{}'", provider_name);
                return Ok(ExitCode::FAILURE);
            };
            let feature = provider.resolve(&name)?;

            let decision: Arc<dyn AbortDecision> = if cli.batch {
                Arc::new(FixedAbortDecision(true))
            } else {
                Arc::new(PromptAbortDecision)
            };

            let fb = match wf.feature_workflow(feature, decision).await {
                Ok(fb) => fb,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return Ok(ExitCode::FAILURE);
                }
            };
            match command {
                FeatureCommand::Checkout { .. } => run_launcher(&fb.checkout_launcher()).await,
                FeatureCommand::Merge { .. } => run_launcher(&fb.merge_launcher()).await,
                FeatureCommand::Pull { .. } => run_launcher(&fb.pull_launcher()).await,
                FeatureCommand::Clean { .. } => run_launcher(&fb.clean_launcher()).await,
                FeatureCommand::RemoveBranch { .. } => run_launcher(&fb.remove_branch_launcher()).await,
            }
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = match Config::load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => return Ok(exit_for_config_error(&e)),
    };

    run(cli, config).await
}
