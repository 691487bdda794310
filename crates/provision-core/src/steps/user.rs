//! User Phase steps. Every path is derived from the execution context's home.

use super::{sh_quote, user_shell};
use crate::command::CommandSpec;
use crate::error::{ProvisionError, Result};
use crate::io;
use crate::step::{Step, StepAction, StepContext};
use crate::types::{Idempotency, RequiredIdentity};
use std::path::PathBuf;

pub(super) fn steps() -> Vec<Step> {
    use Idempotency::*;
    vec![
        step("install-uv", SkipIfPresent, "install the uv Python toolchain manager", InstallUv),
        step(
            "install-python",
            AlwaysSafeToRepeat,
            "install the configured Python via uv",
            InstallPython,
        ),
        step("install-nvm", SkipIfPresent, "install nvm", InstallNvm),
        step("install-node", AlwaysSafeToRepeat, "install Node.js and yarn via nvm", InstallNode),
        step(
            "configure-shell",
            NotIdempotent,
            "append toolchain setup to ~/.bashrc",
            ConfigureShell,
        ),
        step("install-bench", SkipIfPresent, "install the bench CLI", InstallBench),
        step(
            "secure-mariadb",
            AlwaysSafeToRepeat,
            "set the MariaDB root password and drop test data",
            SecureMariadb,
        ),
        step("init-bench", SkipIfPresent, "initialize the bench directory", InitBench),
        step("create-site", SkipIfPresent, "create the site", CreateSite),
        step(
            "set-developer-mode",
            AlwaysSafeToRepeat,
            "enable developer mode on the site",
            SetDeveloperMode,
        ),
    ]
}

fn step(name: &str, class: Idempotency, summary: &str, action: impl StepAction + 'static) -> Step {
    Step::new(name, RequiredIdentity::NamedUser, class, summary, action)
}

fn local_bin(ctx: &StepContext<'_>, program: &str) -> PathBuf {
    ctx.exec.home.join(".local/bin").join(program)
}

fn bench_path(ctx: &StepContext<'_>) -> PathBuf {
    ctx.config.bench_path(&ctx.exec.home)
}

fn site<'a>(ctx: &StepContext<'a>) -> Result<&'a str> {
    ctx.params
        .site
        .as_deref()
        .ok_or(ProvisionError::MissingParameter("site"))
}

/// Run `script` in the bench directory with the user's toolchains loaded.
fn in_bench(ctx: &StepContext<'_>, script: &str) -> CommandSpec {
    user_shell(&ctx.exec.home, script).current_dir(bench_path(ctx))
}

// ---------------------------------------------------------------------------
// Toolchains
// ---------------------------------------------------------------------------

const UV_INSTALLER: &str = "https://astral.sh/uv/install.sh";

struct InstallUv;

impl StepAction for InstallUv {
    fn already_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        Ok(local_bin(ctx, "uv").exists())
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let script = format!("curl -LsSf {UV_INSTALLER} | sh");
        ctx.commands.run_checked(&user_shell(&ctx.exec.home, &script))?;
        Ok(())
    }
}

struct InstallPython;

impl StepAction for InstallPython {
    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let script = format!("uv python install {}", sh_quote(&ctx.config.python_version));
        ctx.commands.run_checked(&user_shell(&ctx.exec.home, &script))?;
        Ok(())
    }
}

struct InstallNvm;

impl StepAction for InstallNvm {
    fn already_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        Ok(ctx.exec.home.join(".nvm/nvm.sh").exists())
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        // PROFILE=/dev/null: shell setup is configure-shell's job.
        let script = format!(
            "curl -fsSL https://raw.githubusercontent.com/nvm-sh/nvm/{}/install.sh | PROFILE=/dev/null bash",
            ctx.config.nvm_version
        );
        ctx.commands.run_checked(&user_shell(&ctx.exec.home, &script))?;
        Ok(())
    }
}

struct InstallNode;

impl StepAction for InstallNode {
    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let version = sh_quote(&ctx.config.node_version);
        let script = format!(
            "nvm install {version} && nvm alias default {version} && npm install -g yarn"
        );
        ctx.commands.run_checked(&user_shell(&ctx.exec.home, &script))?;
        Ok(())
    }
}

/// Appended to `~/.bashrc` on every run.
pub const BASHRC_BLOCK: &str = r#"
# frappe-provision
export NVM_DIR="$HOME/.nvm"
[ -s "$NVM_DIR/nvm.sh" ] && . "$NVM_DIR/nvm.sh"
export PATH="$HOME/.local/bin:$PATH"
"#;

struct ConfigureShell;

impl StepAction for ConfigureShell {
    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        io::append_text(&ctx.exec.home.join(".bashrc"), BASHRC_BLOCK)
    }
}

struct InstallBench;

impl StepAction for InstallBench {
    fn already_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        Ok(local_bin(ctx, "bench").exists())
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let script = format!(
            "uv tool install frappe-bench --python {}",
            sh_quote(&ctx.config.python_version)
        );
        ctx.commands.run_checked(&user_shell(&ctx.exec.home, &script))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Database and site
// ---------------------------------------------------------------------------

/// Escape a value for a single-quoted MariaDB string literal.
fn sql_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Hardening SQL. Keeps socket auth so repeat runs can still connect as root.
pub fn secure_mariadb_sql(db_password: &str) -> String {
    format!(
        "ALTER USER 'root'@'localhost' IDENTIFIED VIA unix_socket \
         OR mysql_native_password USING PASSWORD('{}');\n\
         DELETE FROM mysql.user WHERE User='';\n\
         DROP DATABASE IF EXISTS test;\n\
         DELETE FROM mysql.db WHERE Db='test' OR Db='test\\\\_%';\n\
         FLUSH PRIVILEGES;\n",
        sql_string(db_password)
    )
}

struct SecureMariadb;

impl StepAction for SecureMariadb {
    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let password = ctx
            .params
            .db_password
            .as_ref()
            .ok_or(ProvisionError::MissingParameter("db-password"))?;
        ctx.commands.run_checked(
            &CommandSpec::new("sudo")
                .args(["-n", "mysql", "-u", "root"])
                .stdin(secure_mariadb_sql(password.expose())),
        )?;
        Ok(())
    }
}

struct InitBench;

impl StepAction for InitBench {
    fn already_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        Ok(bench_path(ctx).is_dir())
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let script = format!(
            "bench init --frappe-branch {} {}",
            sh_quote(&ctx.config.frappe_branch),
            sh_quote(&bench_path(ctx).to_string_lossy())
        );
        ctx.commands.run_checked(&user_shell(&ctx.exec.home, &script))?;
        Ok(())
    }
}

struct CreateSite;

impl StepAction for CreateSite {
    fn already_satisfied(&self, ctx: &StepContext<'_>) -> Result<bool> {
        Ok(bench_path(ctx).join("sites").join(site(ctx)?).is_dir())
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let db = ctx
            .params
            .db_password
            .as_ref()
            .ok_or(ProvisionError::MissingParameter("db-password"))?;
        let admin = ctx
            .params
            .admin_password
            .as_ref()
            .ok_or(ProvisionError::MissingParameter("admin-password"))?;
        let script = format!(
            "bench new-site {} --db-root-password \"$DB_ROOT_PASSWORD\" --admin-password \"$ADMIN_PASSWORD\"",
            sh_quote(site(ctx)?)
        );
        ctx.commands.run_checked(
            &in_bench(ctx, &script)
                .env("DB_ROOT_PASSWORD", db.expose())
                .env("ADMIN_PASSWORD", admin.expose()),
        )?;
        Ok(())
    }
}

struct SetDeveloperMode;

impl StepAction for SetDeveloperMode {
    fn applies(&self, ctx: &StepContext<'_>) -> bool {
        ctx.params.developer_mode
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()> {
        let site = sh_quote(site(ctx)?);
        let script = format!(
            "bench --site {site} set-config developer_mode 1 && bench --site {site} clear-cache"
        );
        ctx.commands.run_checked(&in_bench(ctx, &script))?;
        Ok(())
    }
}
