pub mod config;
pub mod phase;
pub mod plan;
pub mod run;

use clap::Args;
use provision_core::params::RawParameters;

/// Run parameters as flags, each with an environment fallback.
#[derive(Args, Debug, Default)]
pub struct ParamArgs {
    /// Target user name
    #[arg(long, env = "FRAPPE_PROVISION_USER")]
    pub user: Option<String>,

    /// MariaDB root password
    #[arg(long, env = "FRAPPE_PROVISION_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// Site name, e.g. site1.local
    #[arg(long, env = "FRAPPE_PROVISION_SITE")]
    pub site: Option<String>,

    /// Administrator password for the new site
    #[arg(long, env = "FRAPPE_PROVISION_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Enable developer mode; only `true` (any case) enables it
    #[arg(
        long = "dev",
        env = "FRAPPE_PROVISION_DEV",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub developer_mode: Option<String>,

    /// SSH public key to authorize for the target user
    #[arg(long, env = "FRAPPE_PROVISION_SSH_KEY")]
    pub ssh_key: Option<String>,
}

impl ParamArgs {
    pub fn into_raw(self) -> RawParameters {
        RawParameters {
            user: self.user,
            db_password: self.db_password,
            site: self.site,
            admin_password: self.admin_password,
            developer_mode: self.developer_mode,
            ssh_key: self.ssh_key,
        }
    }
}
