//! Phase runner: identity check, then strictly ordered step execution.
//!
//! The runner owns sequencing and logging only. It stops at the first failing
//! step and never undoes steps already applied.

use crate::error::{ProvisionError, Result};
use crate::identity::ExecutionContext;
use crate::runlog::RunLog;
use crate::step::{Phase, Step, StepContext};
use crate::types::{ExitOutcome, Idempotency, PhaseKind};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Applied,
    Skipped,
    NotApplicable,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub position: usize,
    pub name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// What a phase did. Also the payload returned across the identity switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: PhaseKind,
    pub steps: Vec<StepRecord>,
    pub outcome: ExitOutcome,
}

impl PhaseReport {
    pub fn empty(phase: PhaseKind, outcome: ExitOutcome) -> Self {
        Self {
            phase,
            steps: Vec::new(),
            outcome,
        }
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

// ---------------------------------------------------------------------------
// Identity check
// ---------------------------------------------------------------------------

/// Fail unless `exec` is exactly the identity `kind` requires for this run.
pub fn check_identity(kind: PhaseKind, exec: &ExecutionContext, target_user: &str) -> Result<()> {
    let expected = kind.required_identity().resolve(target_user);
    if exec.identity != expected {
        return Err(ProvisionError::WrongIdentity {
            expected: expected.to_string(),
            actual: exec.identity.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub fn run_phase(phase: &Phase, ctx: &StepContext<'_>, log: &mut RunLog) -> PhaseReport {
    let kind = phase.kind();
    let mut records = Vec::with_capacity(phase.len());
    let result = execute(phase, ctx, log, &mut records);
    let outcome = match result {
        Ok(()) => {
            log.info(format!(
                "{kind} phase complete: {} applied, {} skipped",
                records.iter().filter(|r| r.status == StepStatus::Applied).count(),
                records
                    .iter()
                    .filter(|r| matches!(r.status, StepStatus::Skipped | StepStatus::NotApplicable))
                    .count(),
            ));
            ExitOutcome::Success
        }
        Err(e) => ExitOutcome::from_error(&e, kind, &ctx.params.user),
    };
    PhaseReport {
        phase: kind,
        steps: records,
        outcome,
    }
}

fn execute(
    phase: &Phase,
    ctx: &StepContext<'_>,
    log: &mut RunLog,
    records: &mut Vec<StepRecord>,
) -> Result<()> {
    let kind = phase.kind();

    if let Err(e) = check_identity(kind, ctx.exec, &ctx.params.user) {
        log.error(format!("{kind} phase refused: {e}"));
        return Err(e);
    }

    let total = phase.len();
    log.info(format!(
        "{kind} phase starting: {total} steps as {}",
        ctx.exec.identity
    ));

    for (i, step) in phase.steps().iter().enumerate() {
        let position = i + 1;
        let tag = format!("[{kind} {position}/{total}]");
        match run_step(step, ctx, log, &tag) {
            Ok((status, detail)) => records.push(StepRecord {
                position,
                name: step.name().to_string(),
                status,
                detail,
            }),
            Err(e) => {
                let reason = e.to_string();
                log.error(format!(
                    "{tag} step '{}' failed at position {position}/{total} of the {kind} phase: {reason}",
                    step.name()
                ));
                records.push(StepRecord {
                    position,
                    name: step.name().to_string(),
                    status: StepStatus::Failed,
                    detail: Some(reason.clone()),
                });
                return Err(ProvisionError::StepFailed {
                    phase: kind.to_string(),
                    step: step.name().to_string(),
                    position,
                    total,
                    reason,
                });
            }
        }
    }
    Ok(())
}

fn run_step(
    step: &Step,
    ctx: &StepContext<'_>,
    log: &mut RunLog,
    tag: &str,
) -> Result<(StepStatus, Option<String>)> {
    let action = step.action();

    if !action.applies(ctx) {
        log.info(format!("{tag} skip {}: not applicable to this run", step.name()));
        return Ok((StepStatus::NotApplicable, Some("not applicable".to_string())));
    }

    log.info(format!(
        "{tag} start {} ({})",
        step.name(),
        step.idempotency()
    ));

    if step.idempotency() == Idempotency::SkipIfPresent && action.already_satisfied(ctx)? {
        log.info(format!("{tag} skip {}: already present", step.name()));
        return Ok((StepStatus::Skipped, Some("already present".to_string())));
    }

    action.apply(ctx)?;
    log.info(format!("{tag} done {}", step.name()));
    Ok((StepStatus::Applied, None))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
