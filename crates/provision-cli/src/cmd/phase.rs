use crate::cmd::ParamArgs;
use crate::output::{print_json, print_report};
use crate::settings::Settings;
use anyhow::Context;
use provision_core::command::SystemCommandRunner;
use provision_core::identity::{IdentityProbe, SystemIdentityProbe};
use provision_core::orchestrator::{Host, Orchestrator};
use provision_core::params::RawParameters;
use provision_core::types::{ExitOutcome, PhaseKind};
use std::io::Read;

pub fn root(
    settings: &Settings,
    user: Option<String>,
    ssh_key: Option<String>,
) -> anyhow::Result<ExitOutcome> {
    let raw = RawParameters {
        user,
        ssh_key,
        ..Default::default()
    };
    run_single(settings, PhaseKind::Root, &raw, false)
}

pub fn user(
    settings: &Settings,
    params: ParamArgs,
    params_stdin: bool,
    report_json: bool,
) -> anyhow::Result<ExitOutcome> {
    let raw = if params_stdin {
        read_params(std::io::stdin())?
    } else {
        params.into_raw()
    };
    run_single(settings, PhaseKind::User, &raw, report_json)
}

/// Parameters forwarded across the identity switch, as one JSON document.
fn read_params(mut input: impl Read) -> anyhow::Result<RawParameters> {
    let mut buf = String::new();
    input
        .read_to_string(&mut buf)
        .context("failed to read parameters from stdin")?;
    serde_json::from_str(&buf).context("invalid parameter JSON on stdin")
}

fn run_single(
    settings: &Settings,
    kind: PhaseKind,
    raw: &RawParameters,
    report_json: bool,
) -> anyhow::Result<ExitOutcome> {
    // With a machine-readable report on stdout, tool output must stay off it.
    let runner = if report_json {
        SystemCommandRunner::with_stdout_to_stderr()
    } else {
        SystemCommandRunner::new()
    };
    let probe = SystemIdentityProbe::new();
    let exec = probe
        .current()
        .context("failed to determine the running identity")?;
    let mut log = settings.open_log(&exec, &format!("{kind}-phase"))?;

    let orchestrator = Orchestrator::new(
        settings.config.clone(),
        Host {
            identity: &probe,
            commands: &runner,
        },
    )?;
    let report = orchestrator.run_phase_only(kind, raw, &mut log);

    if report_json {
        println!("{}", serde_json::to_string(&report)?);
    } else if settings.json {
        print_json(&report)?;
    } else {
        print_report(&report);
        println!("log: {}", log.path().display());
    }
    Ok(report.outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_forwarded_params() {
        let json = r#"{"user":"frappe","db_password":"x","site":"a.local","admin_password":"y","developer_mode":"true"}"#;
        let raw = read_params(json.as_bytes()).unwrap();
        assert_eq!(raw.user.as_deref(), Some("frappe"));
        assert!(raw.ssh_key.is_none());
    }

    #[test]
    fn rejects_malformed_params() {
        let err = read_params("not json".as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("invalid parameter JSON"));
    }
}
