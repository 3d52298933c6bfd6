use std::time::Duration;

use crate::config::AlertEvalConfig;

/// Longest accepted `evaluation.timeout`.
pub const MAX_EVALUATION_TIMEOUT: Duration = Duration::from_secs(24 * 3600);

/// Internal validation, called automatically during `AlertEvalConfig::from_str` / `load`.
pub(crate) fn validate(config: &AlertEvalConfig) -> anyhow::Result<()> {
    if config.evaluation.timeout.is_zero() {
        anyhow::bail!("evaluation.timeout must be > 0");
    }
    if config.evaluation.timeout() > MAX_EVALUATION_TIMEOUT {
        anyhow::bail!(
            "evaluation.timeout must be at most {}, got {}",
            crate::HumanDuration::from(MAX_EVALUATION_TIMEOUT),
            config.evaluation.timeout
        );
    }

    if config.logging.level.trim().is_empty() {
        anyhow::bail!("logging.level must not be empty");
    }

    for (module, level) in &config.logging.modules {
        if module.trim().is_empty() {
            anyhow::bail!("logging.modules: empty module name");
        }
        if level.trim().is_empty() {
            anyhow::bail!("logging.modules.{module}: empty level");
        }
    }

    Ok(())
}
