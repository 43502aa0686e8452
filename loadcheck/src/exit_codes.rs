use loadcheck_core::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more thresholds failed.
    ThresholdsFailed = 11,

    /// The run could not start or a virtual user died (fatal scheduler error).
    RunAborted = 20,

    /// Invalid CLI/config/scenario input (bad flags, unreadable YAML, invalid thresholds, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors writing outputs, unexpected invariants).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check failures alone never fail the run; only thresholds do.
    #[must_use]
    pub fn from_verdict(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Pass => Self::Success,
            Verdict::Fail => Self::ThresholdsFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_maps_to_exit_code() {
        assert_eq!(ExitCode::from_verdict(Verdict::Pass).as_i32(), 0);
        assert_eq!(ExitCode::from_verdict(Verdict::Fail).as_i32(), 11);
    }
}
