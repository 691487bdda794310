//! Execution identity as an explicit value.
//!
//! Nothing downstream inspects the ambient process identity. The probe is
//! consulted once per entry point, and the resulting `ExecutionContext` is
//! threaded through every phase and step.

use crate::command::{CommandRunner, CommandSpec, SystemCommandRunner};
use crate::error::{ProvisionError, Result};
use crate::types::Identity;
use std::path::PathBuf;

/// Who is running, and where their home is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub identity: Identity,
    pub home: PathBuf,
}

/// A system account as reported by the user database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub uid: u32,
    pub home: PathBuf,
}

pub trait IdentityProbe {
    fn current(&self) -> Result<ExecutionContext>;

    fn lookup_user(&self, name: &str) -> Result<Option<UserRecord>>;

    fn user_exists(&self, name: &str) -> Result<bool> {
        Ok(self.lookup_user(name)?.is_some())
    }
}

/// Parse one `getent passwd` line: `name:pw:uid:gid:gecos:home:shell`.
pub fn parse_passwd_line(line: &str) -> Option<UserRecord> {
    let fields: Vec<&str> = line.trim_end().split(':').collect();
    if fields.len() < 7 || fields[0].is_empty() {
        return None;
    }
    let uid = fields[2].parse().ok()?;
    Some(UserRecord {
        name: fields[0].to_string(),
        uid,
        home: PathBuf::from(fields[5]),
    })
}

/// Reads identity from `id` and `getent` on the local host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIdentityProbe {
    runner: SystemCommandRunner,
}

impl SystemIdentityProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn id(&self, flag: &str) -> Result<String> {
        let out = self
            .runner
            .run(&CommandSpec::new("id").arg(flag).capture())
            .map_err(|e| ProvisionError::IdentityProbe(e.to_string()))?;
        if !out.success() {
            return Err(ProvisionError::IdentityProbe(format!(
                "'id {flag}' exited with {:?}",
                out.code
            )));
        }
        Ok(out.stdout.trim().to_string())
    }
}

impl IdentityProbe for SystemIdentityProbe {
    fn current(&self) -> Result<ExecutionContext> {
        let uid = self.id("-u")?;
        let identity = if uid == "0" {
            Identity::Root
        } else {
            Identity::User(self.id("-un")?)
        };
        let home = home::home_dir().ok_or_else(|| {
            ProvisionError::IdentityProbe("home directory not found: set HOME".to_string())
        })?;
        Ok(ExecutionContext { identity, home })
    }

    fn lookup_user(&self, name: &str) -> Result<Option<UserRecord>> {
        let out = self
            .runner
            .run(&CommandSpec::new("getent").args(["passwd", name]).capture())
            .map_err(|e| ProvisionError::IdentityProbe(e.to_string()))?;
        // getent exits 2 when the key is not in the database.
        match out.code {
            Some(0) => Ok(out.stdout.lines().find_map(parse_passwd_line)),
            Some(2) => Ok(None),
            code => Err(ProvisionError::IdentityProbe(format!(
                "'getent passwd {name}' exited with {code:?}"
            ))),
        }
    }
}
