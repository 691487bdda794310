use crate::error::ProvisionError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// PhaseKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Root,
    User,
}

impl PhaseKind {
    pub fn all() -> &'static [PhaseKind] {
        &[PhaseKind::Root, PhaseKind::User]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseKind::Root => "root",
            PhaseKind::User => "user",
        }
    }

    /// The identity every step of this phase must declare.
    pub fn required_identity(self) -> RequiredIdentity {
        match self {
            PhaseKind::Root => RequiredIdentity::Root,
            PhaseKind::User => RequiredIdentity::NamedUser,
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The identity a process is actually running as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Identity {
    Root,
    User(String),
}

impl Identity {
    pub fn is_root(&self) -> bool {
        matches!(self, Identity::Root)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Root => f.write_str("root"),
            Identity::User(name) => f.write_str(name),
        }
    }
}

/// The identity a step or phase declares it needs.
///
/// `NamedUser` is resolved against the run's target user, never against
/// whoever happens to be running the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequiredIdentity {
    Root,
    NamedUser,
}

impl RequiredIdentity {
    pub fn resolve(self, target_user: &str) -> Identity {
        match self {
            RequiredIdentity::Root => Identity::Root,
            RequiredIdentity::NamedUser => Identity::User(target_user.to_string()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequiredIdentity::Root => "root",
            RequiredIdentity::NamedUser => "named-user",
        }
    }
}

impl fmt::Display for RequiredIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Idempotency
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Idempotency {
    /// A target-state predicate is checked first; satisfied means no action.
    SkipIfPresent,
    /// Re-running converges on the same end state.
    AlwaysSafeToRepeat,
    /// Repeating may compound side effects. Accepted, not guarded.
    NotIdempotent,
}

impl Idempotency {
    pub fn as_str(self) -> &'static str {
        match self {
            Idempotency::SkipIfPresent => "skip-if-present",
            Idempotency::AlwaysSafeToRepeat => "always-safe-to-repeat",
            Idempotency::NotIdempotent => "not-idempotent",
        }
    }
}

impl fmt::Display for Idempotency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ExitOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
    InvalidParameters {
        reason: String,
    },
    WrongIdentity {
        expected: String,
        actual: String,
    },
    StepFailed {
        phase: PhaseKind,
        step: String,
        position: usize,
        total: usize,
        reason: String,
    },
    SwitchFailed {
        user: String,
        reason: String,
    },
    /// The host could not be prepared for the phase (identity probe, log or
    /// filesystem trouble). No step ran.
    Precondition {
        phase: PhaseKind,
        reason: String,
    },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::InvalidParameters { reason } => write!(f, "invalid parameters: {reason}"),
            Failure::WrongIdentity { expected, actual } => {
                write!(f, "wrong identity: expected {expected}, running as {actual}")
            }
            Failure::StepFailed {
                phase,
                step,
                position,
                total,
                reason,
            } => write!(
                f,
                "step '{step}' ({position}/{total}) of the {phase} phase failed: {reason}"
            ),
            Failure::SwitchFailed { user, reason } => {
                write!(f, "could not switch to user '{user}': {reason}")
            }
            Failure::Precondition { phase, reason } => {
                write!(f, "{phase} phase could not start: {reason}")
            }
        }
    }
}

/// Terminal state of a run, consumed by callers as a process exit code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitOutcome {
    Success,
    Failed(Failure),
}

impl ExitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Success)
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ExitOutcome::Success => 0,
            ExitOutcome::Failed(Failure::InvalidParameters { .. }) => 2,
            ExitOutcome::Failed(Failure::WrongIdentity { .. }) => 3,
            ExitOutcome::Failed(Failure::StepFailed { .. }) => 4,
            ExitOutcome::Failed(Failure::SwitchFailed { .. }) => 5,
            ExitOutcome::Failed(Failure::Precondition { .. }) => 1,
        }
    }

    /// Classify an error raised on the way to (or during) a phase.
    pub fn from_error(err: &ProvisionError, phase: PhaseKind, target_user: &str) -> Self {
        let failure = match err {
            ProvisionError::MissingParameter(_) | ProvisionError::InvalidParameter { .. } => {
                Failure::InvalidParameters {
                    reason: err.to_string(),
                }
            }
            ProvisionError::WrongIdentity { expected, actual } => Failure::WrongIdentity {
                expected: expected.clone(),
                actual: actual.clone(),
            },
            ProvisionError::StepFailed {
                step,
                position,
                total,
                reason,
                ..
            } => Failure::StepFailed {
                phase,
                step: step.clone(),
                position: *position,
                total: *total,
                reason: reason.clone(),
            },
            ProvisionError::UserNotFound(_)
            | ProvisionError::ElevationUnavailable(_)
            | ProvisionError::ElevationRejected { .. } => Failure::SwitchFailed {
                user: target_user.to_string(),
                reason: err.to_string(),
            },
            other => Failure::Precondition {
                phase,
                reason: other.to_string(),
            },
        };
        ExitOutcome::Failed(failure)
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Success => f.write_str("success"),
            ExitOutcome::Failed(failure) => write!(f, "failed: {failure}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_failure_class() {
        let codes = [
            ExitOutcome::Success.exit_code(),
            ExitOutcome::Failed(Failure::InvalidParameters { reason: "x".into() }).exit_code(),
            ExitOutcome::Failed(Failure::WrongIdentity {
                expected: "root".into(),
                actual: "bob".into(),
            })
            .exit_code(),
            ExitOutcome::Failed(Failure::StepFailed {
                phase: PhaseKind::User,
                step: "install-node".into(),
                position: 4,
                total: 10,
                reason: "boom".into(),
            })
            .exit_code(),
            ExitOutcome::Failed(Failure::SwitchFailed {
                user: "frappe".into(),
                reason: "denied".into(),
            })
            .exit_code(),
            ExitOutcome::Failed(Failure::Precondition {
                phase: PhaseKind::Root,
                reason: "no id".into(),
            })
            .exit_code(),
        ];
        assert_eq!(codes, [0, 2, 3, 4, 5, 1]);
    }

    #[test]
    fn required_identity_resolves_against_target() {
        assert_eq!(RequiredIdentity::Root.resolve("frappe"), Identity::Root);
        assert_eq!(
            RequiredIdentity::NamedUser.resolve("frappe"),
            Identity::User("frappe".into())
        );
    }

    #[test]
    fn outcome_json_shape() {
        let outcome = ExitOutcome::Failed(Failure::SwitchFailed {
            user: "frappe".into(),
            reason: "sudo refused".into(),
        });
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"failed\""));
        assert!(json.contains("\"kind\":\"switch_failed\""));
        let parsed: ExitOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, outcome);
    }

    #[test]
    fn setup_errors_are_not_step_failures() {
        let errors = [
            ProvisionError::IdentityProbe("id exited with status 1".into()),
            ProvisionError::Io(std::io::Error::other("disk full")),
            ProvisionError::CommandSpawn {
                program: "id".into(),
                reason: "not found".into(),
            },
        ];
        for err in &errors {
            let outcome = ExitOutcome::from_error(err, PhaseKind::Root, "frappe");
            match &outcome {
                ExitOutcome::Failed(Failure::Precondition { phase, reason }) => {
                    assert_eq!(*phase, PhaseKind::Root);
                    assert_eq!(reason, &err.to_string());
                }
                other => panic!("unexpected outcome {other:?}"),
            }
            assert_eq!(outcome.exit_code(), 1);
        }
    }

    #[test]
    fn user_not_found_is_a_switch_failure() {
        let err = ProvisionError::UserNotFound("frappe".into());
        let outcome = ExitOutcome::from_error(&err, PhaseKind::User, "frappe");
        assert_eq!(outcome.exit_code(), 5);
    }
}
