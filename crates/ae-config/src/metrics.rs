use serde::Deserialize;

/// Evaluation metrics settings.
///
/// When disabled, the evaluator skips metrics collection entirely.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
}
