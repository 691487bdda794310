//! The step catalog: the opaque provisioning work, in contract order.
//!
//! Root phase order is fixed: user creation, then sudo grant, then SSH key,
//! then packages. Nothing here is reordered for speed.

pub mod root;
pub mod user;

use crate::command::CommandSpec;
use crate::error::{ProvisionError, Result};
use crate::step::{Phase, StepContext};
use crate::types::PhaseKind;
use std::path::{Path, PathBuf};

pub fn root_phase() -> Result<Phase> {
    Phase::new(PhaseKind::Root, root::steps())
}

pub fn user_phase() -> Result<Phase> {
    Phase::new(PhaseKind::User, user::steps())
}

pub fn phase(kind: PhaseKind) -> Result<Phase> {
    match kind {
        PhaseKind::Root => root_phase(),
        PhaseKind::User => user_phase(),
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Single-quote `s` for a POSIX shell.
pub fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Home directory of the run's target user, from the user database.
pub(crate) fn target_home(ctx: &StepContext<'_>) -> Result<PathBuf> {
    ctx.users
        .lookup_user(&ctx.params.user)?
        .map(|u| u.home)
        .ok_or_else(|| ProvisionError::UserNotFound(ctx.params.user.clone()))
}

/// A bash command with the user's toolchains (uv, nvm) on `PATH`.
///
/// Paths come from the execution context, not from `$HOME`.
pub(crate) fn user_shell(home: &Path, script: &str) -> CommandSpec {
    let nvm = home.join(".nvm/nvm.sh");
    let local_bin = home.join(".local/bin");
    let prelude = format!(
        "export PATH={}:\"$PATH\"; if [ -s {nvm} ]; then . {nvm}; fi",
        sh_quote(&local_bin.to_string_lossy()),
        nvm = sh_quote(&nvm.to_string_lossy()),
    );
    CommandSpec::shell(format!("{prelude}; {script}")).current_dir(home)
}
