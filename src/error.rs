//! Exit codes and structured error output for the binary.

use serde::Serialize;

use crate::cache::CaptureError;
use crate::encoder::EncodeError;

/// Process exit codes.
///
/// - 0: success
/// - 1: unexpected failure
/// - 2: a frame could not be encoded
/// - 3: storage could not be written or removed
/// - 4: a replay finished but some steps failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    EncodeFailed = 2,
    StorageFailed = 3,
    PartialSuccess = 4,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "SC000",
            Self::GeneralError => "SC001",
            Self::EncodeFailed => "SC002",
            Self::StorageFailed => "SC003",
            Self::PartialSuccess => "SC004",
        }
    }

    /// Pick the exit code for an error, looking through its cause chain.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(capture) = cause.downcast_ref::<CaptureError>() {
                return match capture {
                    CaptureError::Encode(_) => Self::EncodeFailed,
                    CaptureError::Persistence { .. } | CaptureError::Cleared => {
                        Self::StorageFailed
                    }
                };
            }
            if cause.downcast_ref::<EncodeError>().is_some() {
                return Self::EncodeFailed;
            }
        }
        Self::GeneralError
    }
}

/// Error report printed with `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    pub code: String,
    pub exit_code: i32,
    pub message: String,
    /// Messages of the underlying causes, outermost first.
    pub causes: Vec<String>,
}

impl StructuredError {
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: err.to_string(),
            causes: err.chain().skip(1).map(ToString::to_string).collect(),
        }
    }
}
