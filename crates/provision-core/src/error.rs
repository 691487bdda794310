use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("wrong execution identity: expected {expected}, running as {actual}")]
    WrongIdentity { expected: String, actual: String },

    #[error("duplicate step name in {phase} phase: {step}")]
    DuplicateStep { phase: String, step: String },

    #[error("step '{step}' requires {required} but belongs to the {phase} phase")]
    StepIdentityMismatch {
        phase: String,
        step: String,
        required: String,
    },

    #[error("step '{step}' failed at position {position}/{total} of the {phase} phase: {reason}")]
    StepFailed {
        phase: String,
        step: String,
        position: usize,
        total: usize,
        reason: String,
    },

    #[error("target user does not exist: {0}")]
    UserNotFound(String),

    #[error("privilege elevation unavailable: {0}")]
    ElevationUnavailable(String),

    #[error("switch to user '{user}' was rejected: {reason}")]
    ElevationRejected { user: String, reason: String },

    #[error("failed to start '{program}': {reason}")]
    CommandSpawn { program: String, reason: String },

    #[error("command '{command}' exited with {}", exit_display(.code))]
    CommandFailed { command: String, code: Option<i32> },

    #[error("could not determine identity: {0}")]
    IdentityProbe(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn exit_display(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parameter_names_the_field() {
        let err = ProvisionError::MissingParameter("db-password");
        assert_eq!(err.to_string(), "missing required parameter: db-password");
    }

    #[test]
    fn command_failed_without_status() {
        let err = ProvisionError::CommandFailed {
            command: "apt-get update".into(),
            code: None,
        };
        assert!(err.to_string().contains("terminated by signal"));
    }
}
