//! Condition evaluation: value capture, state mapping and the tabular
//! projection of results.

mod capture;
mod evaluate;
mod extract;
mod result;
mod state;
mod table;

pub use capture::{NumberValueCapture, attach_captures, collect_captures};
pub use evaluate::evaluate_execution_result;
pub use result::{EvalResult, ExecutionResults, Results};
pub use state::State;
pub use table::{INFO_COLUMN, RESULTS_FRAME_NAME, STATE_COLUMN};
