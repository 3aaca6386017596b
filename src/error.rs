use thiserror::Error;

/// Failure taxonomy shared by every component of the runtime.
///
/// Timeouts on `join` and `CondVar::wait` are not errors: those calls report
/// them through their return value and leave all state unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The arena does not have enough free space for the request.
    #[error("arena exhausted: requested {requested} bytes, {remaining} remaining")]
    AllocationExhausted { requested: usize, remaining: usize },
    /// The platform refused to create a thread or other resource.
    #[error("platform could not create the requested resource")]
    ResourceCreationFailed,
    /// A caller-supplied timeout elapsed.
    #[error("operation timed out")]
    TimeoutExpired,
    /// A documented usage precondition was broken.
    #[error("runtime invariant violated")]
    InvariantViolation,
}

impl RuntimeError {
    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeError::AllocationExhausted { .. } => "Arena has insufficient remaining capacity",
            RuntimeError::ResourceCreationFailed => "Platform refused to create resource",
            RuntimeError::TimeoutExpired => "Timeout expired before completion",
            RuntimeError::InvariantViolation => "Usage precondition violated",
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Checks a usage precondition.
///
/// Misuse is a fatal assertion in debug builds. Release builds skip the check
/// and the behaviour of the misuse is undefined at the API level.
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $($arg:tt)+) => {
        debug_assert!($cond, $($arg)+)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_sizes() {
        let err = RuntimeError::AllocationExhausted {
            requested: 128,
            remaining: 16,
        };
        assert_eq!(
            err.to_string(),
            "arena exhausted: requested 128 bytes, 16 remaining"
        );
        assert_eq!(err.as_str(), "Arena has insufficient remaining capacity");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "broken")]
    fn invariant_panics_in_debug() {
        invariant!(1 + 1 == 3, "broken {}", "precondition");
    }
}
