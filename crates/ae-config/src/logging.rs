use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Logging configuration. All fields have defaults so the entire `[logging]`
/// section may be omitted from `alert-eval.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level filter (e.g. `"info"`, `"debug"`).
    pub level: String,
    /// Per-module level overrides, e.g. `{ "ae_runtime::adapter" = "debug" }`.
    pub modules: HashMap<String, String>,
    /// Optional file path for log output. Relative paths are resolved against
    /// the config file's parent directory.
    pub file: Option<PathBuf>,
    /// Output format: `plain` (human-readable) or `json` (structured).
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            modules: HashMap::new(),
            file: None,
            format: LogFormat::Plain,
        }
    }
}

impl LoggingConfig {
    /// Render the level + per-module overrides as an `EnvFilter` directive
    /// string, e.g. `"info,ae_runtime=debug"`. Module keys are sorted so the
    /// output is stable.
    pub fn filter_directives(&self) -> String {
        let mut directives = self.level.clone();
        let mut modules: Vec<_> = self.modules.iter().collect();
        modules.sort();
        for (module, level) in modules {
            directives.push(',');
            directives.push_str(module);
            directives.push('=');
            directives.push_str(level);
        }
        directives
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Plain,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_without_modules() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.filter_directives(), "info");
    }

    #[test]
    fn directives_are_sorted_by_module() {
        let mut cfg = LoggingConfig {
            level: "warn".into(),
            ..LoggingConfig::default()
        };
        cfg.modules.insert("ae_runtime".into(), "debug".into());
        cfg.modules.insert("ae_core".into(), "trace".into());
        assert_eq!(
            cfg.filter_directives(),
            "warn,ae_core=trace,ae_runtime=debug"
        );
    }
}
