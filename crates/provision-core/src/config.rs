use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/frappe-provision/config.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ProvisionConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Run log directory for entry points started as root.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Run log directory for the user phase, relative to the user's home.
    #[serde(default = "default_user_log_dir")]
    pub user_log_dir: PathBuf,
    #[serde(default = "default_sudoers_dir")]
    pub sudoers_dir: PathBuf,
    #[serde(default = "default_mariadb_config_path")]
    pub mariadb_config_path: PathBuf,
    #[serde(default = "default_apt_packages")]
    pub apt_packages: Vec<String>,
    #[serde(default = "default_wkhtmltopdf_url")]
    pub wkhtmltopdf_url: String,
    #[serde(default = "default_nvm_version")]
    pub nvm_version: String,
    #[serde(default = "default_node_version")]
    pub node_version: String,
    #[serde(default = "default_python_version")]
    pub python_version: String,
    #[serde(default = "default_frappe_branch")]
    pub frappe_branch: String,
    /// Bench directory, relative to the user's home.
    #[serde(default = "default_bench_dir")]
    pub bench_dir: PathBuf,
    /// Program the identity switcher re-invokes as the target user.
    /// Defaults to the running executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_phase_program: Option<PathBuf>,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/frappe-provision")
}

fn default_user_log_dir() -> PathBuf {
    PathBuf::from(".local/state/frappe-provision")
}

fn default_sudoers_dir() -> PathBuf {
    PathBuf::from("/etc/sudoers.d")
}

fn default_mariadb_config_path() -> PathBuf {
    PathBuf::from("/etc/mysql/mariadb.conf.d/99-frappe.cnf")
}

fn default_apt_packages() -> Vec<String> {
    [
        "git",
        "curl",
        "build-essential",
        "python3-dev",
        "python3-venv",
        "software-properties-common",
        "mariadb-server",
        "mariadb-client",
        "libmysqlclient-dev",
        "redis-server",
        "xvfb",
        "libfontconfig",
        "cron",
        "pkg-config",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_wkhtmltopdf_url() -> String {
    "https://github.com/wkhtmltopdf/packaging/releases/download/0.12.6.1-3/wkhtmltox_0.12.6.1-3.jammy_amd64.deb"
        .to_string()
}

fn default_nvm_version() -> String {
    "v0.40.1".to_string()
}

fn default_node_version() -> String {
    "20".to_string()
}

fn default_python_version() -> String {
    "3.11".to_string()
}

fn default_frappe_branch() -> String {
    "version-15".to_string()
}

fn default_bench_dir() -> PathBuf {
    PathBuf::from("frappe-bench")
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            user_log_dir: default_user_log_dir(),
            sudoers_dir: default_sudoers_dir(),
            mariadb_config_path: default_mariadb_config_path(),
            apt_packages: default_apt_packages(),
            wkhtmltopdf_url: default_wkhtmltopdf_url(),
            nvm_version: default_nvm_version(),
            node_version: default_node_version(),
            python_version: default_python_version(),
            frappe_branch: default_frappe_branch(),
            bench_dir: default_bench_dir(),
            user_phase_program: None,
        }
    }
}

impl ProvisionConfig {
    /// Load from `path`. A missing file means built-in defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: ProvisionConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    pub fn bench_path(&self, home: &Path) -> PathBuf {
        home.join(&self.bench_dir)
    }

    pub fn user_log_path(&self, home: &Path) -> PathBuf {
        home.join(&self.user_log_dir)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.apt_packages.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "apt_packages is empty; install-packages will do nothing".to_string(),
            });
        }

        if self.log_dir.is_relative() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "log_dir must be absolute, got '{}'",
                    self.log_dir.display()
                ),
            });
        }

        for (field, path) in [
            ("bench_dir", &self.bench_dir),
            ("user_log_dir", &self.user_log_dir),
        ] {
            if path.is_absolute() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "{field} must be relative to the target user's home, got '{}'",
                        path.display()
                    ),
                });
            }
        }

        if !self.wkhtmltopdf_url.starts_with("https://") {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "wkhtmltopdf_url is not https: {}",
                    self.wkhtmltopdf_url
                ),
            });
        }

        for (field, value) in [
            ("node_version", &self.node_version),
            ("python_version", &self.python_version),
            ("frappe_branch", &self.frappe_branch),
        ] {
            if value.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{field} must not be empty"),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
