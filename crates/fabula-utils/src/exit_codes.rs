//! Exit code constants for the fabula CLI.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Job completed (possibly with degraded phases) |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `JOB_FAILED` | A phase failed and the job halted |
//! | 4 | `DEPENDENCY_VIOLATION` | Checkpoint is inconsistent |
//! | 9 | `LOCK_HELD` | Another process is advancing the job |
//! | 10 | `PHASE_TIMEOUT` | A model call exceeded its time limit |
//! | 70 | `PROVIDER_FAILURE` | Model provider rejected or failed the call |

/// Exit codes matching the documented exit code table.
///
/// The numeric values are part of the CLI contract.
///
/// # Example
///
/// ```rust
/// use fabula_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::LOCK_HELD, ExitCode::from_i32(9));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - the job reached `completed`
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments or configuration error
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// A phase failed; the job is `failed` and can be resumed
    pub const JOB_FAILED: ExitCode = ExitCode(3);

    /// Stored checkpoint violates the phase dependency graph
    pub const DEPENDENCY_VIOLATION: ExitCode = ExitCode(4);

    /// Lock held - another process is already advancing the same job
    pub const LOCK_HELD: ExitCode = ExitCode(9);

    /// Phase timeout - a gateway call exceeded the configured timeout
    pub const PHASE_TIMEOUT: ExitCode = ExitCode(10);

    /// Provider failure - auth, quota or outage at the model provider
    pub const PROVIDER_FAILURE: ExitCode = ExitCode(70);

    /// Get the numeric exit code value for `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an ExitCode from a raw i32 value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }

    /// Short machine-readable name, used in `--json` status output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self.0 {
            0 => "success",
            2 => "cli_args",
            3 => "job_failed",
            4 => "dependency_violation",
            9 => "lock_held",
            10 => "phase_timeout",
            70 => "provider_failure",
            _ => "internal",
        }
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_constants() {
        assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
        assert_eq!(ExitCode::INTERNAL.as_i32(), 1);
        assert_eq!(ExitCode::CLI_ARGS.as_i32(), 2);
        assert_eq!(ExitCode::JOB_FAILED.as_i32(), 3);
        assert_eq!(ExitCode::DEPENDENCY_VIOLATION.as_i32(), 4);
        assert_eq!(ExitCode::LOCK_HELD.as_i32(), 9);
        assert_eq!(ExitCode::PHASE_TIMEOUT.as_i32(), 10);
        assert_eq!(ExitCode::PROVIDER_FAILURE.as_i32(), 70);
    }

    #[test]
    fn test_names() {
        assert_eq!(ExitCode::LOCK_HELD.name(), "lock_held");
        assert_eq!(ExitCode::from_i32(42).name(), "internal");
    }

    #[test]
    fn test_conversions() {
        let code: ExitCode = 10.into();
        assert_eq!(code, ExitCode::PHASE_TIMEOUT);
        let raw: i32 = ExitCode::PROVIDER_FAILURE.into();
        assert_eq!(raw, 70);
    }
}
