//! Full-run orchestration: validate once, Root Phase, switch, User Phase.
//!
//! The orchestrator is the only producer of a run's `ExitOutcome`. It walks a
//! small state machine and records every state it enters, so a caller (or a
//! test) can see exactly how far a run got.

use crate::command::CommandRunner;
use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::identity::IdentityProbe;
use crate::params::{ParamScope, RawParameters};
use crate::runlog::RunLog;
use crate::runner::{run_phase, PhaseReport, StepStatus};
use crate::step::{Phase, StepContext};
use crate::steps;
use crate::switcher::IdentitySwitcher;
use crate::types::{ExitOutcome, PhaseKind};
use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Init,
    ValidatingParams,
    RunningRootPhase,
    SwitchingIdentity,
    RunningUserPhase,
    Done(RunStatus),
}

impl OrchestratorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrchestratorState::Done(_))
    }

    /// `Done(Failed)` is reachable from every non-terminal state; everything
    /// else moves strictly forward one state at a time.
    pub fn can_transition_to(self, next: OrchestratorState) -> bool {
        use OrchestratorState::*;
        match (self, next) {
            (Done(_), _) => false,
            (_, Done(RunStatus::Failed)) => true,
            (Init, ValidatingParams)
            | (ValidatingParams, RunningRootPhase)
            | (RunningRootPhase, SwitchingIdentity)
            | (SwitchingIdentity, RunningUserPhase)
            | (RunningUserPhase, Done(RunStatus::Success)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorState::Init => f.write_str("init"),
            OrchestratorState::ValidatingParams => f.write_str("validating-params"),
            OrchestratorState::RunningRootPhase => f.write_str("running-root-phase"),
            OrchestratorState::SwitchingIdentity => f.write_str("switching-identity"),
            OrchestratorState::RunningUserPhase => f.write_str("running-user-phase"),
            OrchestratorState::Done(RunStatus::Success) => f.write_str("done(success)"),
            OrchestratorState::Done(RunStatus::Failed) => f.write_str("done(failed)"),
        }
    }
}

#[derive(Debug, Clone)]
struct Trail {
    states: Vec<OrchestratorState>,
}

impl Trail {
    fn new() -> Self {
        Self {
            states: vec![OrchestratorState::Init],
        }
    }

    fn current(&self) -> OrchestratorState {
        self.states
            .last()
            .copied()
            .unwrap_or(OrchestratorState::Init)
    }

    fn advance(&mut self, next: OrchestratorState) -> Result<()> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(ProvisionError::InvalidTransition {
                from: from.to_string(),
                to: next.to_string(),
            });
        }
        self.states.push(next);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Host capabilities the orchestrator drives.
#[derive(Clone, Copy)]
pub struct Host<'a> {
    pub identity: &'a dyn IdentityProbe,
    pub commands: &'a dyn CommandRunner,
}

pub struct Orchestrator<'a> {
    config: ProvisionConfig,
    host: Host<'a>,
    root: Phase,
    user: Phase,
    trail: Trail,
}

impl<'a> Orchestrator<'a> {
    /// Orchestrator over the built-in step catalog.
    pub fn new(config: ProvisionConfig, host: Host<'a>) -> Result<Self> {
        Ok(Self::with_phases(
            config,
            host,
            steps::root_phase()?,
            steps::user_phase()?,
        ))
    }

    pub fn with_phases(config: ProvisionConfig, host: Host<'a>, root: Phase, user: Phase) -> Self {
        Self {
            config,
            host,
            root,
            user,
            trail: Trail::new(),
        }
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    pub fn phase(&self, kind: PhaseKind) -> &Phase {
        match kind {
            PhaseKind::Root => &self.root,
            PhaseKind::User => &self.user,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.trail.current()
    }

    /// Every state the last `run` entered, in order.
    pub fn trail(&self) -> &[OrchestratorState] {
        &self.trail.states
    }

    /// Full run. The User Phase is handed to `switcher` and never starts
    /// unless the Root Phase succeeded.
    pub fn run(
        &mut self,
        raw: &RawParameters,
        switcher: &dyn IdentitySwitcher,
        log: &mut RunLog,
    ) -> ExitOutcome {
        self.trail = Trail::new();
        let target = raw.user.clone().unwrap_or_default();

        let outcome = match self.drive(raw, switcher, log) {
            Ok(outcome) => outcome,
            Err((phase, e)) => ExitOutcome::from_error(&e, phase, &target),
        };

        let status = if outcome.is_success() {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };
        if let Err(e) = self.trail.advance(OrchestratorState::Done(status)) {
            log.error(format!("run aborted: {e}"));
            let _ = self.trail.advance(OrchestratorState::Done(RunStatus::Failed));
            return ExitOutcome::from_error(&e, PhaseKind::User, &target);
        }

        match &outcome {
            ExitOutcome::Success => log.info("run finished: success"),
            ExitOutcome::Failed(failure) => log.error(format!("run failed: {failure}")),
        }
        outcome
    }

    /// Drive the run up to its last phase. `Err` carries the phase the error
    /// is attributed to.
    fn drive(
        &mut self,
        raw: &RawParameters,
        switcher: &dyn IdentitySwitcher,
        log: &mut RunLog,
    ) -> std::result::Result<ExitOutcome, (PhaseKind, ProvisionError)> {
        let at_root = |e: ProvisionError| (PhaseKind::Root, e);
        let at_user = |e: ProvisionError| (PhaseKind::User, e);

        self.trail
            .advance(OrchestratorState::ValidatingParams)
            .map_err(at_root)?;
        let params = raw.validate(ParamScope::Full).map_err(at_root)?;
        log.info(format!(
            "run started: user '{}', site '{}', developer mode {}",
            params.user,
            params.site_or_empty(),
            if params.developer_mode { "on" } else { "off" }
        ));

        self.trail
            .advance(OrchestratorState::RunningRootPhase)
            .map_err(at_root)?;
        let exec = self.host.identity.current().map_err(at_root)?;
        let ctx = StepContext {
            exec: &exec,
            params: &params,
            config: &self.config,
            commands: self.host.commands,
            users: self.host.identity,
        };
        let root = run_phase(&self.root, &ctx, log);
        if !root.outcome.is_success() {
            return Ok(root.outcome);
        }

        self.trail
            .advance(OrchestratorState::SwitchingIdentity)
            .map_err(at_user)?;
        log.info(format!("switching to user '{}'", params.user));
        let record = self
            .host
            .identity
            .lookup_user(&params.user)
            .map_err(at_user)?
            .ok_or_else(|| at_user(ProvisionError::UserNotFound(params.user.clone())))?;
        switcher.preflight(&record).map_err(at_user)?;
        let report = switcher
            .hand_off(&record, &params.forward())
            .map_err(at_user)?;

        // Only a returned report proves the User Phase started.
        self.trail
            .advance(OrchestratorState::RunningUserPhase)
            .map_err(at_user)?;
        log.info(format!(
            "user phase returned as '{}': {} applied, {} skipped",
            record.name,
            report.count(StepStatus::Applied),
            report.count(StepStatus::Skipped) + report.count(StepStatus::NotApplicable),
        ));
        Ok(report.outcome)
    }

    /// Run one phase on its own, as its standalone entry point does.
    ///
    /// Parameters are validated for that phase's scope only.
    pub fn run_phase_only(
        &self,
        kind: PhaseKind,
        raw: &RawParameters,
        log: &mut RunLog,
    ) -> PhaseReport {
        let target = raw.user.clone().unwrap_or_default();
        let scope = match kind {
            PhaseKind::Root => ParamScope::RootPhase,
            PhaseKind::User => ParamScope::UserPhase,
        };

        let params = match raw.validate(scope) {
            Ok(p) => p,
            Err(e) => {
                let outcome = ExitOutcome::from_error(&e, kind, &target);
                log.error(format!("{kind} phase failed: {}", outcome_reason(&outcome)));
                return PhaseReport::empty(kind, outcome);
            }
        };

        let exec = match self.host.identity.current() {
            Ok(exec) => exec,
            Err(e) => {
                let outcome = ExitOutcome::from_error(&e, kind, &target);
                log.error(format!("{kind} phase failed: {}", outcome_reason(&outcome)));
                return PhaseReport::empty(kind, outcome);
            }
        };
        let ctx = StepContext {
            exec: &exec,
            params: &params,
            config: &self.config,
            commands: self.host.commands,
            users: self.host.identity,
        };
        let report = run_phase(self.phase(kind), &ctx, log);
        if let ExitOutcome::Failed(failure) = &report.outcome {
            log.error(format!("{kind} phase failed: {failure}"));
        }
        report
    }
}

fn outcome_reason(outcome: &ExitOutcome) -> String {
    match outcome {
        ExitOutcome::Success => "success".to_string(),
        ExitOutcome::Failed(failure) => failure.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
