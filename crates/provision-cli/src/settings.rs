use anyhow::Context;
use provision_core::config::{ProvisionConfig, DEFAULT_CONFIG_PATH};
use provision_core::identity::ExecutionContext;
use provision_core::runlog::RunLog;
use std::path::{Path, PathBuf};

/// Resolve the config file path.
///
/// Priority:
/// 1. `--config` flag / `FRAPPE_PROVISION_CONFIG` env var (passed in as `explicit`)
/// 2. `/etc/frappe-provision/config.yaml`
///
/// The file need not exist; a missing file means built-in defaults.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

/// Global options resolved once per invocation.
pub struct Settings {
    pub config_path: PathBuf,
    /// Set only when the path was given explicitly; forwarded across the
    /// identity switch.
    pub explicit_config: Option<PathBuf>,
    pub config: ProvisionConfig,
    pub log_dir: Option<PathBuf>,
    pub json: bool,
}

impl Settings {
    pub fn load(
        explicit: Option<&Path>,
        log_dir: Option<PathBuf>,
        json: bool,
    ) -> anyhow::Result<Self> {
        let config_path = resolve_config_path(explicit);
        let config = ProvisionConfig::load(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?;
        Ok(Self {
            config_path,
            explicit_config: explicit.map(Path::to_path_buf),
            config,
            log_dir,
            json,
        })
    }

    /// Run log directory: `--log-dir`, else the config's location for whoever
    /// is running.
    pub fn log_dir_for(&self, exec: &ExecutionContext) -> PathBuf {
        if let Some(dir) = &self.log_dir {
            return dir.clone();
        }
        if exec.identity.is_root() {
            self.config.log_dir.clone()
        } else {
            self.config.user_log_path(&exec.home)
        }
    }

    pub fn open_log(&self, exec: &ExecutionContext, script: &str) -> anyhow::Result<RunLog> {
        let dir = self.log_dir_for(exec);
        RunLog::open(&dir, script)
            .with_context(|| format!("failed to open run log in {}", dir.display()))
    }
}
