use crate::output::print_json;
use crate::settings::Settings;
use anyhow::Context;
use provision_core::command::SystemCommandRunner;
use provision_core::identity::{IdentityProbe, SystemIdentityProbe};
use provision_core::orchestrator::{Host, Orchestrator};
use provision_core::params::RawParameters;
use provision_core::switcher::SudoSwitcher;
use provision_core::types::ExitOutcome;

pub fn run(settings: &Settings, raw: RawParameters) -> anyhow::Result<ExitOutcome> {
    let runner = SystemCommandRunner::new();
    let probe = SystemIdentityProbe::new();
    let exec = probe
        .current()
        .context("failed to determine the running identity")?;
    let mut log = settings.open_log(&exec, "run")?;

    let program = match &settings.config.user_phase_program {
        Some(p) => p.clone(),
        None => std::env::current_exe().context("failed to locate the running executable")?,
    };
    let mut switcher = SudoSwitcher::new(&runner, program);
    if let Some(path) = &settings.explicit_config {
        switcher = switcher.with_config(path);
    }

    let mut orchestrator = Orchestrator::new(
        settings.config.clone(),
        Host {
            identity: &probe,
            commands: &runner,
        },
    )?;
    let outcome = orchestrator.run(&raw, &switcher, &mut log);

    if settings.json {
        print_json(&serde_json::json!({
            "outcome": outcome,
            "exit_code": outcome.exit_code(),
            "trail": orchestrator.trail(),
            "log": log.path(),
        }))?;
    } else {
        println!("{outcome}");
        println!("log: {}", log.path().display());
    }
    Ok(outcome)
}
