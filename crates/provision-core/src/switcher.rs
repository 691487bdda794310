//! Identity switching: hand the User Phase to a process running as the
//! target user.
//!
//! The boundary is an explicit message channel. Parameters go over the
//! child's stdin as JSON and the child's `PhaseReport` comes back as the last
//! line of its stdout. Nothing crosses through inherited environment.

use crate::command::{CommandRunner, CommandSpec};
use crate::error::{ProvisionError, Result};
use crate::identity::UserRecord;
use crate::params::RawParameters;
use crate::runner::PhaseReport;
use crate::types::PhaseKind;
use std::path::{Path, PathBuf};

pub trait IdentitySwitcher {
    /// Fail with `ElevationUnavailable` if a switch to `user` cannot be
    /// attempted at all.
    fn preflight(&self, user: &UserRecord) -> Result<()>;

    /// Run the User Phase as `user` and return its report.
    ///
    /// `Err` means the switch itself failed. A step failure inside the
    /// switched-to phase is an `Ok` report with a failed outcome.
    fn hand_off(&self, user: &UserRecord, params: &RawParameters) -> Result<PhaseReport>;
}

// ---------------------------------------------------------------------------
// SudoSwitcher
// ---------------------------------------------------------------------------

/// Re-invokes `program user-phase` through non-interactive `sudo`.
pub struct SudoSwitcher<'a> {
    runner: &'a dyn CommandRunner,
    program: PathBuf,
    config_path: Option<PathBuf>,
}

impl<'a> SudoSwitcher<'a> {
    pub fn new(runner: &'a dyn CommandRunner, program: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            program: program.into(),
            config_path: None,
        }
    }

    /// Forward an explicit config file to the child.
    pub fn with_config(mut self, path: &Path) -> Self {
        self.config_path = Some(path.to_path_buf());
        self
    }

    pub fn command(&self, user: &UserRecord, params: &RawParameters) -> Result<CommandSpec> {
        let mut spec = CommandSpec::new("sudo")
            .args(["-n", "-H", "-u", user.name.as_str(), "--"])
            .arg(self.program.to_string_lossy())
            .args(["user-phase", "--params-stdin", "--report-json"]);
        if let Some(path) = &self.config_path {
            spec = spec.arg("--config").arg(path.to_string_lossy());
        }
        Ok(spec.stdin(serde_json::to_string(params)?).capture())
    }
}

impl IdentitySwitcher for SudoSwitcher<'_> {
    fn preflight(&self, _user: &UserRecord) -> Result<()> {
        if self.runner.locate("sudo").is_none() {
            return Err(ProvisionError::ElevationUnavailable(
                "sudo not found on PATH".to_string(),
            ));
        }
        if !self.program.is_file() {
            return Err(ProvisionError::ElevationUnavailable(format!(
                "user-phase program not found: {}",
                self.program.display()
            )));
        }
        Ok(())
    }

    fn hand_off(&self, user: &UserRecord, params: &RawParameters) -> Result<PhaseReport> {
        let spec = self.command(user, params)?;
        let rejected = |reason: String| ProvisionError::ElevationRejected {
            user: user.name.clone(),
            reason,
        };
        let out = self.runner.run(&spec).map_err(|e| rejected(e.to_string()))?;
        parse_report(&out.stdout).ok_or_else(|| {
            rejected(match out.code {
                Some(c) => format!("no phase report from the user phase (exit status {c})"),
                None => "no phase report from the user phase (terminated by signal)".to_string(),
            })
        })
    }
}

/// The User Phase report on the last non-empty line of `stdout`, if any.
pub fn parse_report(stdout: &str) -> Option<PhaseReport> {
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    let report: PhaseReport = serde_json::from_str(line.trim()).ok()?;
    (report.phase == PhaseKind::User).then_some(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandOutput;
    use crate::runner::{StepRecord, StepStatus};
    use crate::testing::FakeHost;
    use crate::types::{ExitOutcome, Failure, Identity};
    use tempfile::TempDir;

    fn frappe() -> UserRecord {
        UserRecord {
            name: "frappe".into(),
            uid: 1001,
            home: PathBuf::from("/home/frappe"),
        }
    }

    fn forwarded() -> RawParameters {
        RawParameters {
            user: Some("frappe".into()),
            db_password: Some("x".into()),
            site: Some("a.local".into()),
            admin_password: Some("y".into()),
            developer_mode: Some("true".into()),
            ssh_key: None,
        }
    }

    fn report_json(outcome: ExitOutcome) -> String {
        let report = PhaseReport {
            phase: PhaseKind::User,
            steps: vec![StepRecord {
                position: 1,
                name: "install-uv".into(),
                status: StepStatus::Applied,
                detail: None,
            }],
            outcome,
        };
        serde_json::to_string(&report).unwrap()
    }

    #[test]
    fn command_forwards_params_over_stdin_only() {
        let dir = TempDir::new().unwrap();
        let host = FakeHost::new(dir.path(), Identity::Root);
        let switcher = SudoSwitcher::new(&host, "/usr/local/bin/frappe-provision")
            .with_config(Path::new("/etc/frappe-provision/config.yaml"));
        let spec = switcher.command(&frappe(), &forwarded()).unwrap();

        assert_eq!(spec.program, "sudo");
        assert_eq!(&spec.args[..5], ["-n", "-H", "-u", "frappe", "--"]);
        assert!(spec.args.contains(&"--params-stdin".to_string()));
        assert!(spec.capture);
        assert!(spec.env.is_empty());
        assert!(!spec.display().contains("\"x\""));
        let sent: RawParameters = serde_json::from_str(spec.stdin.as_deref().unwrap()).unwrap();
        assert_eq!(sent.db_password.as_deref(), Some("x"));
        assert!(spec.display().ends_with("--config /etc/frappe-provision/config.yaml"));
    }

    #[test]
    fn report_read_from_last_line() {
        let dir = TempDir::new().unwrap();
        let host = FakeHost::new(dir.path(), Identity::Root);
        host.reply(
            "user-phase",
            CommandOutput {
                code: Some(4),
                stdout: format!(
                    "noise\n{}\n",
                    report_json(ExitOutcome::Failed(Failure::StepFailed {
                        phase: PhaseKind::User,
                        step: "install-uv".into(),
                        position: 1,
                        total: 10,
                        reason: "boom".into(),
                    }))
                ),
            },
        );
        let switcher = SudoSwitcher::new(&host, "/bin/true");
        let report = switcher.hand_off(&frappe(), &forwarded()).unwrap();
        assert_eq!(report.outcome.exit_code(), 4);
    }

    #[test]
    fn missing_report_is_elevation_rejected() {
        let dir = TempDir::new().unwrap();
        let host = FakeHost::new(dir.path(), Identity::Root);
        host.reply(
            "user-phase",
            CommandOutput {
                code: Some(1),
                stdout: String::new(),
            },
        );
        let switcher = SudoSwitcher::new(&host, "/bin/true");
        let err = switcher.hand_off(&frappe(), &forwarded()).unwrap_err();
        assert!(matches!(err, ProvisionError::ElevationRejected { .. }), "{err}");
        assert!(err.to_string().contains("exit status 1"));
    }

    #[test]
    fn preflight_requires_sudo_and_program() {
        let dir = TempDir::new().unwrap();
        let host = FakeHost::new(dir.path(), Identity::Root);
        let program = dir.path().join("frappe-provision");
        std::fs::write(&program, "").unwrap();

        let switcher = SudoSwitcher::new(&host, &program);
        let err = switcher.preflight(&frappe()).unwrap_err();
        assert!(err.to_string().contains("sudo not found"));

        host.put_on_path("sudo");
        switcher.preflight(&frappe()).unwrap();

        let missing = SudoSwitcher::new(&host, dir.path().join("nope"));
        assert!(matches!(
            missing.preflight(&frappe()),
            Err(ProvisionError::ElevationUnavailable(_))
        ));
    }

    #[test]
    fn root_phase_report_is_not_accepted() {
        let mut report: PhaseReport =
            serde_json::from_str(&report_json(ExitOutcome::Success)).unwrap();
        report.phase = PhaseKind::Root;
        assert!(parse_report(&serde_json::to_string(&report).unwrap()).is_none());
        assert!(parse_report(&report_json(ExitOutcome::Success)).is_some());
    }
}
