use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::evaluation::EvaluationConfig;
use crate::logging::LoggingConfig;
use crate::metrics::MetricsConfig;
use crate::validate;

// ---------------------------------------------------------------------------
// Raw TOML structure (intermediate representation)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AlertEvalConfigRaw {
    #[serde(default)]
    evaluation: EvaluationConfig,
    #[serde(default)]
    metrics: MetricsConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// AlertEvalConfig (resolved, validated)
// ---------------------------------------------------------------------------

/// Top-level configuration for the alert condition evaluator.
///
/// Built once and handed to the evaluator by value; nothing reads it from
/// ambient state afterwards.
#[derive(Debug, Clone, Default)]
pub struct AlertEvalConfig {
    pub evaluation: EvaluationConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

impl AlertEvalConfig {
    /// Read and parse an `alert-eval.toml` file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.as_ref().display()))?;
        content.parse()
    }
}

impl FromStr for AlertEvalConfig {
    type Err = anyhow::Error;

    /// Parse a TOML string into a validated [`AlertEvalConfig`].
    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let raw: AlertEvalConfigRaw = toml::from_str(toml_str)?;

        let config = AlertEvalConfig {
            evaluation: raw.evaluation,
            metrics: raw.metrics,
            logging: raw.logging,
        };

        validate::validate(&config)?;

        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
