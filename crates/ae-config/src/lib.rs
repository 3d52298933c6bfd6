pub mod config;
pub mod evaluation;
pub mod logging;
pub mod metrics;
pub mod types;
mod validate;

pub use config::AlertEvalConfig;
pub use evaluation::EvaluationConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use metrics::MetricsConfig;
pub use types::HumanDuration;
pub use validate::MAX_EVALUATION_TIMEOUT;
