use std::fmt::{self as stdfmt, Write as _};
use std::path::Path;

use ae_config::{LogFormat, LoggingConfig};
use anyhow::Result;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::format::DefaultFields;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent, FormattedFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

// ---------------------------------------------------------------------------
// FileFields: newtype to isolate span field caching between layers
// ---------------------------------------------------------------------------

/// Field formatter for file layers, so the file and stderr layers keep
/// separate `FormattedFields` caches on spans.
#[derive(Default)]
pub struct FileFields(DefaultFields);

impl<'writer> fmt::FormatFields<'writer> for FileFields {
    fn format_fields<R: tracing_subscriber::field::RecordFields>(
        &self,
        writer: fmt::format::Writer<'writer>,
        fields: R,
    ) -> stdfmt::Result {
        self.0.format_fields(writer, fields)
    }
}

// ---------------------------------------------------------------------------
// DomainFormat: promotes `domain` field to a `[domain]` prefix
// ---------------------------------------------------------------------------

/// Event formatter that renders the `domain` field as a `[domain]` prefix.
///
/// ```text
/// 2026-02-21T01:17:14Z  WARN [exec] eval.condition{org_id=1 condition=B}: backend call timed out timeout=30s
/// ```
///
/// Events without a `domain` field, such as records bridged from `log`,
/// get no prefix.
pub struct DomainFormat {
    timer: SystemTime,
}

impl DomainFormat {
    pub fn new() -> Self {
        Self { timer: SystemTime }
    }
}

impl Default for DomainFormat {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `text` wrapped in an SGR escape when the writer supports ANSI.
fn styled(
    w: &mut fmt::format::Writer<'_>,
    sgr: &str,
    text: impl stdfmt::Display,
) -> stdfmt::Result {
    if w.has_ansi_escapes() {
        write!(w, "\x1b[{sgr}m{text}\x1b[0m")
    } else {
        write!(w, "{text}")
    }
}

fn level_sgr(level: Level) -> &'static str {
    match level {
        Level::ERROR => "31",
        Level::WARN => "33",
        Level::INFO => "32",
        Level::DEBUG => "34",
        Level::TRACE => "35",
    }
}

impl<S, N> FormatEvent<S, N> for DomainFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> fmt::FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: fmt::format::Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        let mut stamp = String::new();
        if self
            .timer
            .format_time(&mut fmt::format::Writer::new(&mut stamp))
            .is_err()
        {
            stamp.push_str("<unknown time>");
        }
        styled(&mut writer, "2", stamp)?;

        let level = *event.metadata().level();
        writer.write_char(' ')?;
        styled(&mut writer, level_sgr(level), format_args!("{level:>5}"))?;
        writer.write_char(' ')?;

        let mut fields = EventFields::default();
        event.record(&mut fields);

        if let Some(domain) = &fields.domain {
            styled(&mut writer, "1;36", format_args!("[{domain}]"))?;
            writer.write_char(' ')?;
        }

        for span in ctx.event_scope().into_iter().flat_map(|scope| scope.from_root()) {
            styled(&mut writer, "1", span.name())?;
            let ext = span.extensions();
            match ext.get::<FormattedFields<N>>() {
                Some(cached) if !cached.is_empty() => write!(writer, "{{{cached}}}: ")?,
                _ => writer.write_str("{}: ")?,
            }
        }

        writer.write_str(&fields.message)?;
        if !fields.rest.is_empty() {
            writer.write_char(' ')?;
            styled(&mut writer, "3", fields.rest.join(" "))?;
        }
        writeln!(writer)
    }
}

// ---------------------------------------------------------------------------
// EventFields: splits `domain` and `message` from the remaining fields
// ---------------------------------------------------------------------------

#[derive(Default)]
struct EventFields {
    domain: Option<String>,
    message: String,
    rest: Vec<String>,
}

impl EventFields {
    fn push(&mut self, name: &str, value: impl stdfmt::Display) {
        self.rest.push(format!("{name}={value}"));
    }
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "domain" => self.domain = Some(value.to_owned()),
            "message" => self.message = value.to_owned(),
            name => self.push(name, format_args!("{value:?}")),
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn stdfmt::Debug) {
        let rendered = format!("{value:?}");
        match field.name() {
            "domain" => self.domain = Some(rendered.trim_matches('"').to_owned()),
            "message" => self.message = rendered,
            name => self.push(name, rendered),
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field.name(), value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field.name(), value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field.name(), value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field.name(), value);
    }
}

// ---------------------------------------------------------------------------
// Layers
// ---------------------------------------------------------------------------

fn stderr_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Plain => fmt::layer()
            .event_format(DomainFormat::new())
            .with_writer(std::io::stderr)
            .boxed(),
    }
}

fn file_layer(format: LogFormat, writer: NonBlocking) -> BoxedLayer {
    match format {
        // JSON keeps domain as a regular field so consumers can query by key.
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(false)
            .with_ansi(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Plain => fmt::layer()
            .event_format(DomainFormat::new())
            .fmt_fields(FileFields::default())
            .with_ansi(false)
            .with_writer(writer)
            .boxed(),
    }
}

/// `EnvFilter` built from the configured level and module overrides.
fn config_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directives = config.filter_directives();
    EnvFilter::try_new(&directives)
        .map_err(|e| anyhow::anyhow!("invalid log filter '{directives}': {e}"))
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Initialise the `tracing` subscriber stack from [`LoggingConfig`].
///
/// Returns an optional [`WorkerGuard`] that **must** be held until the process
/// exits; dropping it flushes and closes the non-blocking file writer.
///
/// Precedence: `RUST_LOG` overrides all config-driven directives.
///
/// The `log` → `tracing` bridge is set up automatically by
/// `tracing-subscriber`'s default `tracing-log` feature, so records from
/// `ae_core` show up here too.
pub fn init_tracing(config: &LoggingConfig, base_dir: &Path) -> Result<Option<WorkerGuard>> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        config_filter(config)?
    };

    let mut layers: Vec<BoxedLayer> = vec![stderr_layer(config.format)];
    let mut guard = None;

    if let Some(ref file_path) = config.file {
        let resolved = if file_path.is_relative() {
            base_dir.join(file_path)
        } else {
            file_path.clone()
        };
        let file_name = resolved
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("log file path has no file name"))?
            .to_os_string();
        let dir = resolved
            .parent()
            .ok_or_else(|| anyhow::anyhow!("log file path has no parent directory"))?;
        std::fs::create_dir_all(dir)?;

        let file_appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);
        layers.push(file_layer(config.format, non_blocking));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_filter_accepts_levels_and_overrides() {
        let mut cfg = LoggingConfig::default();
        cfg.modules.insert("ae_runtime".into(), "debug".into());
        assert!(config_filter(&cfg).is_ok());
    }

    #[test]
    fn config_filter_rejects_bad_module_level() {
        let mut cfg = LoggingConfig::default();
        cfg.modules.insert("ae_runtime".into(), "loudest".into());
        let err = config_filter(&cfg).unwrap_err();
        assert!(err.to_string().contains("invalid log filter"));
    }

    #[test]
    fn event_fields_keep_insertion_order() {
        let mut v = EventFields::default();
        v.push("org_id", 1_i64);
        v.push("timeout", format_args!("{:?}", std::time::Duration::from_secs(30)));
        assert_eq!(v.rest.join(" "), "org_id=1 timeout=30s");
        assert!(v.domain.is_none());
    }

    #[test]
    fn plain_format_prefixes_domain() {
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Sink(Arc<Mutex<Vec<u8>>>);
        impl std::io::Write for Sink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let sink = Sink::default();
        let writer = sink.clone();
        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .event_format(DomainFormat::new())
                .with_ansi(false)
                .with_writer(move || writer.clone()),
        );
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("eval.condition", org_id = 7);
            let _entered = span.enter();
            ae_warn!(exec, timeout = ?std::time::Duration::from_secs(30), "backend call timed out");
        });

        let text = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert!(
            text.contains(" WARN [exec] eval.condition{org_id=7}: backend call timed out timeout=30s"),
            "{text}"
        );
    }
}
