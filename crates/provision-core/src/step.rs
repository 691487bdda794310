//! Steps and phases.
//!
//! A `Step` is a named unit of provisioning work with a declared identity and
//! idempotency class. The work itself sits behind `StepAction`, which is all
//! the runner ever sees of it. A `Phase` is an ordered, name-unique list of
//! steps that all declare the phase's identity; order is part of the contract.

use crate::command::CommandRunner;
use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::identity::{ExecutionContext, IdentityProbe};
use crate::params::ProvisioningParameters;
use crate::types::{Idempotency, PhaseKind, RequiredIdentity};
use serde::Serialize;
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// StepContext
// ---------------------------------------------------------------------------

/// Everything a step may read or call. Passed explicitly on every call.
pub struct StepContext<'a> {
    pub exec: &'a ExecutionContext,
    pub params: &'a ProvisioningParameters,
    pub config: &'a ProvisionConfig,
    pub commands: &'a dyn CommandRunner,
    pub users: &'a dyn IdentityProbe,
}

// ---------------------------------------------------------------------------
// StepAction
// ---------------------------------------------------------------------------

pub trait StepAction {
    /// False when the run's parameters give this step nothing to do
    /// (e.g. no SSH key supplied).
    fn applies(&self, _ctx: &StepContext<'_>) -> bool {
        true
    }

    /// Target-state predicate. Only consulted for `SkipIfPresent` steps.
    fn already_satisfied(&self, _ctx: &StepContext<'_>) -> Result<bool> {
        Ok(false)
    }

    fn apply(&self, ctx: &StepContext<'_>) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

pub struct Step {
    name: String,
    identity: RequiredIdentity,
    idempotency: Idempotency,
    summary: String,
    action: Box<dyn StepAction>,
}

impl Step {
    pub fn new(
        name: impl Into<String>,
        identity: RequiredIdentity,
        idempotency: Idempotency,
        summary: impl Into<String>,
        action: impl StepAction + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            identity,
            idempotency,
            summary: summary.into(),
            action: Box::new(action),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> RequiredIdentity {
        self.identity
    }

    pub fn idempotency(&self) -> Idempotency {
        self.idempotency
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn action(&self) -> &dyn StepAction {
        self.action.as_ref()
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("identity", &self.identity)
            .field("idempotency", &self.idempotency)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Phase {
    kind: PhaseKind,
    steps: Vec<Step>,
}

/// Plan view of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub phase: PhaseKind,
    pub position: usize,
    pub name: String,
    pub identity: RequiredIdentity,
    pub idempotency: Idempotency,
    pub summary: String,
}

impl Phase {
    /// Build a phase, rejecting duplicate names and steps whose declared
    /// identity differs from the phase's.
    pub fn new(kind: PhaseKind, steps: Vec<Step>) -> Result<Self> {
        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step.name.clone()) {
                return Err(ProvisionError::DuplicateStep {
                    phase: kind.to_string(),
                    step: step.name.clone(),
                });
            }
            if step.identity != kind.required_identity() {
                return Err(ProvisionError::StepIdentityMismatch {
                    phase: kind.to_string(),
                    step: step.name.clone(),
                    required: step.identity.to_string(),
                });
            }
        }
        Ok(Self { kind, steps })
    }

    pub fn kind(&self) -> PhaseKind {
        self.kind
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn describe(&self) -> Vec<StepSummary> {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, s)| StepSummary {
                phase: self.kind,
                position: i + 1,
                name: s.name.clone(),
                identity: s.identity,
                idempotency: s.idempotency,
                summary: s.summary.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    impl StepAction for Noop {
        fn apply(&self, _ctx: &StepContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn root_step(name: &str) -> Step {
        Step::new(name, RequiredIdentity::Root, Idempotency::AlwaysSafeToRepeat, "noop", Noop)
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = Phase::new(PhaseKind::Root, vec![root_step("a"), root_step("a")]).unwrap_err();
        assert!(matches!(err, ProvisionError::DuplicateStep { .. }));
    }

    #[test]
    fn step_identity_must_match_phase() {
        let err = Phase::new(PhaseKind::User, vec![root_step("a")]).unwrap_err();
        assert!(matches!(err, ProvisionError::StepIdentityMismatch { .. }));
    }

    #[test]
    fn describe_keeps_order_and_positions() {
        let phase =
            Phase::new(PhaseKind::Root, vec![root_step("first"), root_step("second")]).unwrap();
        let plan = phase.describe();
        assert_eq!(plan[0].name, "first");
        assert_eq!(plan[1].position, 2);
        assert_eq!(plan[1].idempotency, Idempotency::AlwaysSafeToRepeat);
    }
}
