#[macro_use]
mod log_macros;

mod adapter;
mod panic_capture;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod tracing_init;

pub use error::{RuntimeError, RuntimeReason, RuntimeResult};
pub use evaluator::Evaluator;
pub use metrics::EvalMetrics;
pub use tracing_init::init_tracing;
