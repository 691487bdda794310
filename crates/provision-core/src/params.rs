//! Run parameters: raw input as received, and the validated set every step sees.
//!
//! Validation happens once, before any step runs. What a run needs depends on
//! its scope: the root phase only needs the target user, the user phase needs
//! the database and site inputs too.

use crate::error::{ProvisionError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Secret
// ---------------------------------------------------------------------------

/// A credential. Formatting never reveals the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(********)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("********")
    }
}

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Which entry point the parameters are validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamScope {
    /// Full orchestrated run: everything either phase needs.
    Full,
    RootPhase,
    UserPhase,
}

impl ParamScope {
    fn needs_user_phase_inputs(self) -> bool {
        matches!(self, ParamScope::Full | ParamScope::UserPhase)
    }
}

// ---------------------------------------------------------------------------
// RawParameters
// ---------------------------------------------------------------------------

/// Parameters as they arrive from flags, environment or the switch channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawParameters {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub db_password: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
    #[serde(default)]
    pub developer_mode: Option<String>,
    #[serde(default)]
    pub ssh_key: Option<String>,
}

fn required(value: &Option<String>, name: &'static str) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ProvisionError::MissingParameter(name)),
    }
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl RawParameters {
    /// Check every field the scope requires, in declaration order, and build
    /// the validated set. The first problem found is returned.
    pub fn validate(&self, scope: ParamScope) -> Result<ProvisioningParameters> {
        let user = required(&self.user, "user")?;
        validate_username(&user)?;

        let (db_password, site, admin_password) = if scope.needs_user_phase_inputs() {
            let db = required(&self.db_password, "db-password")?;
            let site = required(&self.site, "site")?;
            validate_site(&site)?;
            let admin = required(&self.admin_password, "admin-password")?;
            (Some(Secret::new(db)), Some(site), Some(Secret::new(admin)))
        } else {
            (
                optional(&self.db_password).map(Secret::new),
                optional(&self.site),
                optional(&self.admin_password).map(Secret::new),
            )
        };

        let ssh_key = optional(&self.ssh_key);
        if let Some(key) = &ssh_key {
            validate_ssh_key(key)?;
        }

        Ok(ProvisioningParameters {
            user,
            db_password,
            site,
            admin_password,
            developer_mode: parse_flag(self.developer_mode.as_deref()),
            ssh_key,
        })
    }
}

/// Boolean-like flag: only a case-insensitive `true` enables it.
pub fn parse_flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

// ---------------------------------------------------------------------------
// ProvisioningParameters
// ---------------------------------------------------------------------------

/// The validated configuration for one run.
#[derive(Debug, Clone)]
pub struct ProvisioningParameters {
    pub user: String,
    pub db_password: Option<Secret>,
    pub site: Option<String>,
    pub admin_password: Option<Secret>,
    pub developer_mode: bool,
    pub ssh_key: Option<String>,
}

impl ProvisioningParameters {
    /// The enumerated parameter set handed across the identity boundary.
    ///
    /// The SSH key is a root-phase input and is not forwarded.
    pub fn forward(&self) -> RawParameters {
        RawParameters {
            user: Some(self.user.clone()),
            db_password: self.db_password.as_ref().map(|s| s.expose().to_string()),
            site: self.site.clone(),
            admin_password: self.admin_password.as_ref().map(|s| s.expose().to_string()),
            developer_mode: Some(self.developer_mode.to_string()),
            ssh_key: None,
        }
    }

    pub fn site_or_empty(&self) -> &str {
        self.site.as_deref().unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Field validation
// ---------------------------------------------------------------------------

static USERNAME_RE: OnceLock<Regex> = OnceLock::new();
static SITE_RE: OnceLock<Regex> = OnceLock::new();

fn username_re() -> &'static Regex {
    USERNAME_RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_-]*$").unwrap())
}

fn site_re() -> &'static Regex {
    SITE_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.-]*$").unwrap())
}

pub fn validate_username(name: &str) -> Result<()> {
    if name.len() > 32 || !username_re().is_match(name) {
        return Err(ProvisionError::InvalidParameter {
            name: "user",
            reason: format!(
                "'{name}' is not a valid POSIX user name (lowercase, digits, '_' or '-', at most 32 chars)"
            ),
        });
    }
    if name == "root" {
        return Err(ProvisionError::InvalidParameter {
            name: "user",
            reason: "the target user must not be root".to_string(),
        });
    }
    Ok(())
}

pub fn validate_site(site: &str) -> Result<()> {
    if site.len() > 253 || !site_re().is_match(site) {
        return Err(ProvisionError::InvalidParameter {
            name: "site",
            reason: format!("'{site}' is not a valid site name"),
        });
    }
    Ok(())
}

pub fn validate_ssh_key(key: &str) -> Result<()> {
    let mut fields = key.split_whitespace();
    let kind = fields.next().unwrap_or("");
    let known = kind.starts_with("ssh-") || kind.starts_with("ecdsa-") || kind.starts_with("sk-");
    if key.contains('\n') || !known || fields.next().is_none() {
        return Err(ProvisionError::InvalidParameter {
            name: "ssh-key",
            reason: "expected a single-line OpenSSH public key".to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
