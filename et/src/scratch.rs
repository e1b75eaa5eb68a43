//! Session scratch directory
//!
//! Allocated once at startup under the configured root and torn down
//! when the handle is dropped. Failure to create it is fatal: nothing
//! downstream (default hook scripts, temp files) can work without it.

use std::path::Path;

use tempfile::TempDir;
use tracing::debug;

use crate::config::ConfigError;
use crate::domain::{Hook, HookScope};

/// Refuses to publish internal bookkeeping branches.
const PROTECT_INTERNAL_HOOK: &str = "#!/bin/sh
# refuse to publish internal bookkeeping branches
status=0
while read local_ref local_sha remote_ref remote_sha; do
    case \"$remote_ref\" in
        refs/heads/internal/*)
            echo \"refusing to push internal branch ${remote_ref#refs/heads/}\" >&2
            status=1
            ;;
    esac
done
exit $status
";

/// Scratch directory with scoped teardown: the directory and everything
/// in it is removed when this handle is dropped.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a fresh scratch directory under the given root.
    pub fn create(root: &Path) -> Result<Self, ConfigError> {
        let scratch_err = |source| ConfigError::Scratch {
            path: root.to_path_buf(),
            source,
        };
        std::fs::create_dir_all(root).map_err(scratch_err)?;
        let dir = tempfile::Builder::new()
            .prefix("session-")
            .tempdir_in(root)
            .map_err(scratch_err)?;
        debug!(path = %dir.path().display(), "created scratch directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Materialize the fixed default hook set into the scratch
    /// directory and return the descriptors.
    pub fn default_hooks(&self) -> Result<Vec<Hook>, ConfigError> {
        let scratch_err = |source| ConfigError::Scratch {
            path: self.dir.path().to_path_buf(),
            source,
        };
        let hooks_dir = self.dir.path().join("hooks");
        std::fs::create_dir_all(&hooks_dir).map_err(scratch_err)?;

        let script = hooks_dir.join("protect-internal.sh");
        std::fs::write(&script, PROTECT_INTERNAL_HOOK).map_err(scratch_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).map_err(scratch_err)?;
        }

        Ok(vec![Hook::new(script, [HookScope::PrePush])])
    }
}
