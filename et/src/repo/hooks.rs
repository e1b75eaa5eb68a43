//! Hook installation
//!
//! Installs a dispatcher script per life-cycle scope into the
//! repository's hook directory, then copies each hook script into every
//! scope directory it declares. Worktrees share the repository's hook
//! directory, so installing once covers them all.

use std::path::Path;
use std::sync::Arc;

use cmdflow::{BoxCommand, CallableCommand, NoOpCommand, Outcome};
use tracing::debug;

use crate::domain::{Hook, HookScope};

use super::repository::Repository;
use super::RepoError;

/// Runs every executable installed in the scope's `<scope>.d` directory,
/// stopping at the first failure.
const DISPATCHER: &str = "#!/bin/sh
# envtree hook dispatcher
dir=\"$0.d\"
[ -d \"$dir\" ] || exit 0
for hook in \"$dir\"/*; do
    [ -x \"$hook\" ] || continue
    \"$hook\" \"$@\" || exit $?
done
exit 0
";

/// Callable command wiping and recreating the hook directory, writing
/// one dispatcher per scope and copying each hook's script into every
/// scope directory it declares. No-op when the hook list is empty.
pub fn build_install_hooks_command(repo: &Repository, hooks: &[Hook]) -> BoxCommand {
    let display = format!("{}: install hooks", repo.id());
    if hooks.is_empty() {
        return NoOpCommand::new(display).boxed();
    }

    let repo = repo.clone();
    let hooks = hooks.to_vec();
    CallableCommand::new(display.clone(), move || {
        let repo = repo.clone();
        let hooks = hooks.clone();
        let display = display.clone();
        async move {
            match install_hooks(&repo, &hooks) {
                Ok(()) => Outcome::success(display),
                Err(e) => {
                    let message = format!("failed to install hooks for '{}': {}", repo.id(), e);
                    Outcome::failure_with_cause(display, message, Arc::new(e))
                }
            }
        }
    })
    .boxed()
}

fn install_hooks(repo: &Repository, hooks: &[Hook]) -> Result<(), RepoError> {
    if !repo.is_cloned() {
        return Err(RepoError::NotCloned(repo.id().to_string()));
    }

    let hook_dir = repo.dest().join(".git").join("hooks");
    debug!(repo = %repo.id(), dir = %hook_dir.display(), "installing hooks");
    if hook_dir.exists() {
        std::fs::remove_dir_all(&hook_dir)?;
    }
    std::fs::create_dir_all(&hook_dir)?;

    for scope in HookScope::ALL {
        let dispatcher = hook_dir.join(scope.file_name());
        std::fs::write(&dispatcher, DISPATCHER)?;
        make_executable(&dispatcher)?;
    }

    for hook in hooks {
        let Some(file_name) = hook.file_name() else {
            return Err(RepoError::UnexpectedOutput(format!(
                "hook script '{}' has no file name",
                hook.script.display()
            )));
        };
        for scope in &hook.scopes {
            let scope_dir = hook_dir.join(format!("{}.d", scope.file_name()));
            std::fs::create_dir_all(&scope_dir)?;
            let installed = scope_dir.join(file_name);
            std::fs::copy(&hook.script, &installed)?;
            make_executable(&installed)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::GitContext;
    use cmdflow::Command;
    use tempfile::tempdir;

    async fn git(cwd: &Path, args: &[&str]) {
        let out = tokio::process::Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .unwrap();
        assert!(out.status.success(), "git {:?}: {}", args, String::from_utf8_lossy(&out.stderr));
    }

    async fn setup_git_repo(dir: &Path) {
        git(dir, &["init", "-b", "main"]).await;
        git(dir, &["config", "user.email", "test@test.com"]).await;
        git(dir, &["config", "user.name", "Test"]).await;
        git(dir, &["commit", "--allow-empty", "-m", "initial"]).await;
    }

    #[tokio::test]
    async fn test_empty_hook_list_is_a_noop() {
        let dir = tempdir().unwrap();
        let repo = Repository::new("core", "unused", dir.path().join("absent"), GitContext::default());
        let outcome = build_install_hooks_command(&repo, &[]).execute().await;
        assert!(!outcome.is_failed());
    }

    #[tokio::test]
    async fn test_install_writes_dispatchers_and_scripts() {
        let repo_dir = tempdir().unwrap();
        let script_dir = tempdir().unwrap();
        setup_git_repo(repo_dir.path()).await;

        let script = script_dir.path().join("guard.sh");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        let hooks = vec![Hook::new(&script, [HookScope::PrePush, HookScope::PreCommit])];

        let repo = Repository::new("core", "unused", repo_dir.path(), GitContext::default());
        let outcome = build_install_hooks_command(&repo, &hooks).execute().await;
        assert!(!outcome.is_failed(), "{:?}", outcome.error_message());

        let hook_dir = repo_dir.path().join(".git").join("hooks");
        for scope in HookScope::ALL {
            assert!(hook_dir.join(scope.file_name()).exists(), "missing {}", scope);
        }
        assert!(hook_dir.join("pre-push.d").join("guard.sh").exists());
        assert!(hook_dir.join("pre-commit.d").join("guard.sh").exists());
        assert!(!hook_dir.join("post-merge.d").exists());
    }

    #[tokio::test]
    async fn test_install_fails_on_uncloned_repository() {
        let script_dir = tempdir().unwrap();
        let script = script_dir.path().join("guard.sh");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        let hooks = vec![Hook::new(&script, [HookScope::PrePush])];

        let repo = Repository::new("core", "unused", script_dir.path().join("absent"), GitContext::default());
        let outcome = build_install_hooks_command(&repo, &hooks).execute().await;
        assert!(outcome.is_failed());
        assert!(matches!(outcome.cause_as::<RepoError>(), Some(RepoError::NotCloned(_))));
    }
}
