use std::time::Duration;

use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

use crate::labels::Labels;

#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum CoreReason {
    #[error("query model decode error")]
    ModelDecode,
    #[error("invalid alert condition")]
    InvalidCondition,
    #[error("frame shape error")]
    FrameShape,
    #[error("data format error")]
    DataFormat,
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for CoreReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::ModelDecode => 1001,
            Self::InvalidCondition => 1002,
            Self::FrameShape => 1003,
            Self::DataFormat => 1004,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type CoreError = StructError<CoreReason>;
pub type CoreResult<T> = Result<T, CoreError>;

// ---------------------------------------------------------------------------
// EvalError: failures carried inside an evaluation result
// ---------------------------------------------------------------------------

/// A failure that is reported *as data* on an `Error`-state result rather
/// than returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// A condition frame did not have the reduced, single-value shape.
    #[error("invalid format of evaluation results for the alert definition {ref_id}: {reason}")]
    InvalidFormat { ref_id: String, reason: String },
    /// Two results share an instance label set.
    #[error(
        "frame cannot uniquely be identified by its labels: has duplicate results with labels {{{labels}}}"
    )]
    DuplicateLabels { labels: Labels },
    /// The backend returned an error for the whole request.
    #[error("queries and expressions execution failed: {0}")]
    Backend(String),
    /// The backend reported an error for the condition's own reference ID.
    #[error("query {ref_id} failed: {message}")]
    QueryFailed { ref_id: String, message: String },
    /// The evaluation deadline elapsed before the backend answered.
    #[error("context deadline exceeded: evaluation did not complete within {timeout:?}")]
    DeadlineExceeded { timeout: Duration },
    /// The backend task was cancelled without producing a result.
    #[error("context canceled: {0}")]
    Cancelled(String),
    /// The backend panicked; details are in the process log.
    #[error("alert rule panic; please check the logs for the full stack")]
    Panic,
    /// Expressions are switched off in configuration.
    #[error("server-side expressions are disabled")]
    ExpressionsDisabled,
}

impl EvalError {
    pub(crate) fn invalid_format(ref_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            ref_id: ref_id.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_format_message_names_ref_id() {
        let e = EvalError::invalid_format("B", "unexpected field length: 2 instead of 1");
        assert_eq!(
            e.to_string(),
            "invalid format of evaluation results for the alert definition B: unexpected field length: 2 instead of 1"
        );
    }

    #[test]
    fn duplicate_labels_message_wraps_labels_in_braces() {
        let e = EvalError::DuplicateLabels {
            labels: Labels::from_pairs([("host", "a")]),
        };
        assert_eq!(
            e.to_string(),
            "frame cannot uniquely be identified by its labels: has duplicate results with labels {host=a}"
        );
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(CoreReason::ModelDecode.error_code(), 1001);
        assert_eq!(CoreReason::InvalidCondition.error_code(), 1002);
        assert_eq!(CoreReason::FrameShape.error_code(), 1003);
        assert_eq!(CoreReason::DataFormat.error_code(), 1004);
    }
}
