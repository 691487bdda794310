//! Root Phase steps.

use super::target_home;
use crate::command::CommandSpec;
use crate::error::{ProvisionError, Result};
use crate::io;
use crate::step::{Step, StepAction, StepContext};
use crate::types::{Idempotency, RequiredIdentity};
use std::path::PathBuf;

pub(super) fn steps() -> Vec<Step> {
    use Idempotency::*;
    vec![
        step(
            "create-user",
            SkipIfPresent,
            "create the target user with a home directory",
            CreateUser,
        ),
        step(
            "grant-sudo",
            AlwaysSafeToRepeat,
            "add the user to sudo and install a sudoers drop-in",
            GrantSudo,
        ),
        step(
            "install-ssh-key",
            SkipIfPresent,
            "authorize the supplied SSH public key",
            InstallSshKey,
        ),
        step("apt-update", AlwaysSafeToRepeat, "refresh apt package lists", AptUpdate),
        step("install-packages", AlwaysSafeToRepeat, "install system packages", InstallPackages),
        step(
            "install-wkhtmltopdf",
            SkipIfPresent,
            "install the patched wkhtmltopdf build",
            InstallWkhtmltopdf,
        ),
        step(
            "configure-mariadb",
            AlwaysSafeToRepeat,
            "write the utf8mb4 MariaDB server config",
            ConfigureMariadb,
        ),
        step(
            "restart-mariadb",
            AlwaysSafeToRepeat,
            "restart MariaDB to load its config",
            RestartMariadb,
        ),
    ]
}

fn step(name: &str, class: Idempotency, summary: &str, action: impl StepAction + 'static) -> Step {
    Step::new(name, RequiredIdentity::Root, class, summary, action)
}

fn apt() -> CommandSpec {
    CommandSpec::new("apt-get").env("DEBIAN_FRONTEND", "noninteractive")
}

// ---------------------------------------------------------------------------
// User and access
// ---------------------------------------------------------------------------

struct CreateUser;

impl StepAction for CreateUser {
    fn already_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        ctx.users.user_exists(&ctx.params.user)
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        ctx.commands.run_checked(
            &CommandSpec::new("useradd").args(["-m", "-s", "/bin/bash", ctx.params.user.as_str()]),
        )?;
        Ok(())
    }
}

/// Fixed drop-in content for `user`.
pub fn sudoers_entry(user: &str) -> String {
    format!("{user} ALL=(ALL) NOPASSWD:ALL\n")
}

struct GrantSudo;

impl StepAction for GrantSudo {
    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let user = ctx.params.user.as_str();
        ctx.commands
            .run_checked(&CommandSpec::new("usermod").args(["-aG", "sudo", user]))?;

        let path = ctx.config.sudoers_dir.join(user);
        io::atomic_write_mode(&path, sudoers_entry(user).as_bytes(), 0o440)?;

        // Never leave an unparseable drop-in behind.
        let check = CommandSpec::new("visudo").arg("-cf").arg(path.to_string_lossy());
        let out = ctx.commands.run(&check)?;
        if !out.success() {
            std::fs::remove_file(&path)?;
            return Err(ProvisionError::CommandFailed {
                command: check.display(),
                code: out.code,
            });
        }
        Ok(())
    }
}

struct InstallSshKey;

impl InstallSshKey {
    fn ssh_dir(ctx: &StepContext<'_>) -> Result<PathBuf> {
        Ok(target_home(ctx)?.join(".ssh"))
    }
}

impl StepAction for InstallSshKey {
    fn applies(&self, ctx: &StepContext<'_>) -> bool {
        ctx.params.ssh_key.is_some()
    }

    fn already_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        match &ctx.params.ssh_key {
            Some(key) => io::contains_line(&Self::ssh_dir(ctx)?.join("authorized_keys"), key),
            None => Ok(true),
        }
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let Some(key) = &ctx.params.ssh_key else {
            return Ok(());
        };
        let ssh_dir = Self::ssh_dir(ctx)?;
        let keys = ssh_dir.join("authorized_keys");
        io::ensure_dir(&ssh_dir)?;
        io::ensure_line(&keys, key)?;
        io::set_mode(&ssh_dir, 0o700)?;
        io::set_mode(&keys, 0o600)?;

        let owner = format!("{0}:{0}", ctx.params.user);
        ctx.commands.run_checked(
            &CommandSpec::new("chown")
                .args(["-R", owner.as_str()])
                .arg(ssh_dir.to_string_lossy()),
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Packages
// ---------------------------------------------------------------------------

struct AptUpdate;

impl StepAction for AptUpdate {
    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        ctx.commands.run_checked(&apt().arg("update"))?;
        Ok(())
    }
}

struct InstallPackages;

impl StepAction for InstallPackages {
    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        if ctx.config.apt_packages.is_empty() {
            return Ok(());
        }
        ctx.commands.run_checked(
            &apt()
                .args(["install", "-y", "--no-install-recommends"])
                .args(ctx.config.apt_packages.iter().cloned()),
        )?;
        Ok(())
    }
}

struct InstallWkhtmltopdf;

impl StepAction for InstallWkhtmltopdf {
    fn already_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        Ok(ctx.commands.locate("wkhtmltopdf").is_some())
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let scratch = tempfile::Builder::new().prefix("wkhtmltox").tempdir()?;
        let deb = scratch
            .path()
            .join("wkhtmltox.deb")
            .to_string_lossy()
            .into_owned();
        ctx.commands.run_checked(
            &CommandSpec::new("curl")
                .args(["-fsSL", "-o", deb.as_str(), ctx.config.wkhtmltopdf_url.as_str()]),
        )?;
        ctx.commands
            .run_checked(&apt().args(["install", "-y", deb.as_str()]))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MariaDB
// ---------------------------------------------------------------------------

pub const MARIADB_SERVER_CONFIG: &str = "\
[mysqld]
character-set-client-handshake = FALSE
character-set-server = utf8mb4
collation-server = utf8mb4_unicode_ci

[mysql]
default-character-set = utf8mb4
";

struct ConfigureMariadb;

impl StepAction for ConfigureMariadb {
    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        io::atomic_write_mode(
            &ctx.config.mariadb_config_path,
            MARIADB_SERVER_CONFIG.as_bytes(),
            0o644,
        )
    }
}

struct RestartMariadb;

impl StepAction for RestartMariadb {
    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        ctx.commands
            .run_checked(&CommandSpec::new("systemctl").args(["restart", "mariadb"]))?;
        Ok(())
    }
}
