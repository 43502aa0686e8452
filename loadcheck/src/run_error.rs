use crate::exit_codes::ExitCode;

#[derive(Debug)]
pub enum RunError {
    InvalidInput(anyhow::Error),
    RunAborted(anyhow::Error),
    RuntimeError(anyhow::Error),
}

impl RunError {
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidInput(_) => ExitCode::InvalidInput,
            Self::RunAborted(_) => ExitCode::RunAborted,
            Self::RuntimeError(_) => ExitCode::RuntimeError,
        }
    }

    #[must_use]
    pub fn anyhow(&self) -> &anyhow::Error {
        match self {
            Self::InvalidInput(e) | Self::RunAborted(e) | Self::RuntimeError(e) => e,
        }
    }

    /// Configuration problems found by the scheduler are the user's input, not a crash.
    pub fn from_core(err: loadcheck_core::Error) -> Self {
        use loadcheck_core::Error as CoreError;

        match err {
            CoreError::InvalidVus
            | CoreError::InvalidIterations
            | CoreError::InvalidDuration
            | CoreError::InvalidPause { .. }
            | CoreError::InvalidThreshold { .. } => Self::InvalidInput(err.into()),
            CoreError::InvalidTransition { .. } | CoreError::Metrics(_) | CoreError::Join(_) => {
                Self::RunAborted(err.into())
            }
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#}", self.anyhow())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.anyhow().as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_invalid_input() {
        let err = RunError::from_core(loadcheck_core::Error::InvalidVus);
        assert_eq!(err.exit_code(), ExitCode::InvalidInput);
    }

    #[test]
    fn scheduler_failures_abort_the_run() {
        let err = RunError::from_core(loadcheck_core::Error::InvalidTransition {
            vu: 1,
            from: loadcheck_core::VuState::Stopped,
            to: loadcheck_core::VuState::Running,
        });
        assert_eq!(err.exit_code(), ExitCode::RunAborted);
    }
}
