use crate::output::{print_json, print_table};
use crate::settings::Settings;
use provision_core::step::StepSummary;
use provision_core::steps;
use provision_core::types::PhaseKind;

pub fn run(settings: &Settings) -> anyhow::Result<()> {
    let mut plan: Vec<StepSummary> = Vec::new();
    for kind in PhaseKind::all() {
        plan.extend(steps::phase(*kind)?.describe());
    }

    if settings.json {
        return print_json(&plan);
    }

    let rows = plan
        .iter()
        .map(|s| {
            vec![
                s.phase.to_string(),
                s.position.to_string(),
                s.name.clone(),
                s.identity.to_string(),
                s.idempotency.to_string(),
                s.summary.clone(),
            ]
        })
        .collect();
    print_table(
        &["PHASE", "#", "STEP", "IDENTITY", "IDEMPOTENCY", "SUMMARY"],
        rows,
    );
    Ok(())
}
