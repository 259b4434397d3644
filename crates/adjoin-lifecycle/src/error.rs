//! Lifecycle error types and their exit codes.

use std::path::PathBuf;

use adjoin_common::error::ExitCode;
use adjoin_config::{ConfigError, RenderError};

use crate::machine::Step;
use crate::refresh::RefreshStage;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// A join-sequence step failed. `code` is usually the step's own code,
    /// but keytab verification reports a missing principal separately.
    #[error("{step} {cause}")]
    Step {
        step: Step,
        code: ExitCode,
        cause: String,
    },

    #[error("[refresh {stage}] {cause}")]
    Refresh { stage: RefreshStage, cause: String },

    #[error("could not write client configuration: {0}")]
    Render(#[from] RenderError),

    #[error("another adjoin process holds {}", .0.display())]
    Locked(PathBuf),

    #[error("state error: {0}")]
    State(#[from] std::io::Error),
}

impl LifecycleError {
    pub(crate) fn step(step: Step, cause: impl Into<String>) -> Self {
        Self::Step {
            step,
            code: step.exit_code(),
            cause: cause.into(),
        }
    }

    pub(crate) fn refresh(stage: RefreshStage, cause: impl Into<String>) -> Self {
        Self::Refresh {
            stage,
            cause: cause.into(),
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self)
    }
}

/// Configuration problems are the first step's failure.
impl From<ConfigError> for LifecycleError {
    fn from(e: ConfigError) -> Self {
        Self::step(Step::ValidateConfiguration, e.to_string())
    }
}

impl From<&LifecycleError> for ExitCode {
    fn from(e: &LifecycleError) -> Self {
        match e {
            LifecycleError::Step { code, .. } => *code,
            LifecycleError::Refresh { .. } => ExitCode::Unknown,
            LifecycleError::Render(_) => ExitCode::Unknown,
            LifecycleError::Locked(_) => ExitCode::Unknown,
            LifecycleError::State(_) => ExitCode::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_configuration_maps_to_code_two() {
        let err = LifecycleError::from(ConfigError::Missing("AD_ADMIN_USER"));
        assert_eq!(err.exit_code().code(), 2);
        assert!(err.to_string().starts_with("[step 1/13 validate-configuration]"));
    }

    #[test]
    fn step_code_can_be_overridden() {
        let err = LifecycleError::Step {
            step: Step::CreateKeytab,
            code: ExitCode::ServicePrincipal,
            cause: "keytab lacks cifs/files01".to_string(),
        };
        assert_eq!(err.exit_code(), ExitCode::ServicePrincipal);
    }

    #[test]
    fn lock_contention_is_unknown_error() {
        let err = LifecycleError::Locked(PathBuf::from("/var/lib/adjoin/lifecycle.lock"));
        assert_eq!(err.exit_code(), ExitCode::Unknown);
        assert!(err.to_string().contains("lifecycle.lock"));
    }
}
