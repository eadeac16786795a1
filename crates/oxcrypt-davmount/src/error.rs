//! Error types for mount operations.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Why an external command was classified as failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDetail {
    /// The command exited with an unexpected code and wrote this to stderr.
    Stderr(String),

    /// The command exited with an unexpected code and stderr was empty or
    /// could not be captured.
    ExitCode {
        /// Exit code the command returned
        actual: i32,
        /// Exit code the caller expected
        expected: i32,
    },

    /// The command was terminated by a signal before it could exit.
    Signal,

    /// The command succeeded, but its outcome could not be confirmed from
    /// this output.
    Unverified(String),
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureDetail::Stderr(stderr) => write!(f, "stderr output: {}", stderr.trim()),
            FailureDetail::ExitCode { actual, expected } => {
                write!(f, "exit code {actual}, expected {expected}")
            }
            FailureDetail::Signal => f.write_str("terminated by signal"),
            FailureDetail::Unverified(output) => {
                write!(
                    f,
                    "command succeeded, but the mount could not be verified from: {}",
                    output.trim()
                )
            }
        }
    }
}

/// Errors that can occur while mounting, revealing or unmounting.
#[derive(Error, Debug)]
pub enum MountError {
    /// An external command did not finish as expected
    #[error("Command `{command}` failed: {detail}")]
    CommandFailed {
        /// The command line, for diagnostics
        command: String,
        /// What went wrong
        detail: FailureDetail,
    },

    /// An external command did not finish in time and was killed
    #[error("Command `{command}` timed out after {timeout:?}")]
    Timeout {
        /// The command line, for diagnostics
        command: String,
        /// The bound that elapsed
        timeout: Duration,
    },

    /// The caller cancelled while a command was running; the command was killed
    #[error("Command `{command}` was cancelled")]
    Cancelled {
        /// The command line, for diagnostics
        command: String,
    },

    /// The command could not be started or waited on
    #[error("I/O error running `{command}`: {source}")]
    Io {
        /// The command line, for diagnostics
        command: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A mount parameter holds a value the strategy cannot use
    #[error("Invalid value {value:?} for {param}: {reason}")]
    InvalidParam {
        /// Parameter name
        param: String,
        /// Rejected value
        value: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// The handle was already unmounted
    #[error("Volume is not mounted")]
    NotMounted,
}

impl MountError {
    /// Whether this error means the command ran past its time bound.
    pub fn is_timeout(&self) -> bool {
        matches!(self, MountError::Timeout { .. })
    }

    /// Whether the mount call itself succeeded but could not be confirmed.
    pub fn is_unverified(&self) -> bool {
        matches!(
            self,
            MountError::CommandFailed {
                detail: FailureDetail::Unverified(_),
                ..
            }
        )
    }
}
