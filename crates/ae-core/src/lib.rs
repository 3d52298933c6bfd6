//! Alert condition evaluation core: turns query/expression result frames
//! into per-instance alert states.

pub mod backend;
pub mod error;
pub mod eval;
pub mod frame;
pub mod labels;
pub mod query;
mod serde_util;

pub use backend::{DataResponse, QueryBackend, QueryDataResponse};
pub use error::{CoreError, CoreReason, CoreResult, EvalError};
pub use eval::{
    EvalResult, ExecutionResults, NumberValueCapture, Results, State, evaluate_execution_result,
};
pub use frame::{EvalMatch, Field, Frame, FrameAnnotation, RowLenError};
pub use labels::Labels;
pub use query::{
    AlertQuery, Condition, EXPRESSION_DATASOURCE_UID, ExecutionQuery, ExecutionRequest,
    RelativeTimeRange, TimeRange, build_request,
};
