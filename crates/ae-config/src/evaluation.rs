use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::HumanDuration;

/// Settings read once when the evaluator is constructed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvaluationConfig {
    /// Upper bound for a single condition evaluation, backend call included.
    #[serde(default = "default_timeout")]
    pub timeout: HumanDuration,
    /// Whether server-side expressions may be executed by the backend.
    #[serde(default = "default_expressions_enabled")]
    pub expressions_enabled: bool,
}

impl EvaluationConfig {
    pub fn new(timeout: Duration, expressions_enabled: bool) -> Self {
        Self {
            timeout: timeout.into(),
            expressions_enabled,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.as_duration()
    }
}

fn default_timeout() -> HumanDuration {
    "30s".parse().expect("hardcoded duration must parse")
}

fn default_expressions_enabled() -> bool {
    true
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            expressions_enabled: default_expressions_enabled(),
        }
    }
}
