use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use ae_config::MetricsConfig;
use ae_core::{Results, State};

const DEFAULT_HISTOGRAM_BUCKETS_SECONDS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Lock-free histogram with fixed buckets.
///
/// Each observation increments exactly one bucket (non-cumulative storage).
struct Histogram {
    upper_bounds_nanos: Vec<u64>,
    bucket_counts: Vec<AtomicU64>,
    sum_nanos: AtomicU64,
}

impl Histogram {
    fn from_seconds_bounds(bounds: &[f64]) -> Self {
        let upper_bounds_nanos = bounds
            .iter()
            .map(|sec| (*sec * 1_000_000_000.0) as u64)
            .collect::<Vec<_>>();
        let bucket_counts = (0..=upper_bounds_nanos.len())
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>();
        Self {
            upper_bounds_nanos,
            bucket_counts,
            sum_nanos: AtomicU64::new(0),
        }
    }

    fn observe_duration(&self, elapsed: Duration) {
        let nanos = elapsed.as_nanos().min(u64::MAX as u128) as u64;
        self.sum_nanos.fetch_add(nanos, Ordering::Relaxed);
        let idx = self
            .upper_bounds_nanos
            .iter()
            .position(|bound| nanos <= *bound)
            .unwrap_or(self.upper_bounds_nanos.len());
        self.bucket_counts[idx].fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            upper_bounds_nanos: self.upper_bounds_nanos.clone(),
            bucket_counts: self
                .bucket_counts
                .iter()
                .map(|v| v.load(Ordering::Relaxed))
                .collect(),
            sum_seconds: self.sum_nanos.load(Ordering::Relaxed) as f64 / 1_000_000_000.0,
        }
    }
}

struct HistogramSnapshot {
    upper_bounds_nanos: Vec<u64>,
    bucket_counts: Vec<u64>,
    sum_seconds: f64,
}

/// Evaluation metrics shared by every evaluator call.
///
/// Counters are lock-free atomics; the `state` label set is fixed, so
/// recording never allocates.
pub struct EvalMetrics {
    evaluations_total: AtomicU64,
    failures_total: AtomicU64,
    timeouts_total: AtomicU64,
    panics_total: AtomicU64,
    raw_queries_total: AtomicU64,
    results_total: BTreeMap<State, AtomicU64>,
    duration_seconds: Histogram,
}

impl Default for EvalMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EvalMetrics {
    pub fn new() -> Self {
        Self {
            evaluations_total: AtomicU64::new(0),
            failures_total: AtomicU64::new(0),
            timeouts_total: AtomicU64::new(0),
            panics_total: AtomicU64::new(0),
            raw_queries_total: AtomicU64::new(0),
            results_total: State::ALL
                .into_iter()
                .map(|s| (s, AtomicU64::new(0)))
                .collect(),
            duration_seconds: Histogram::from_seconds_bounds(DEFAULT_HISTOGRAM_BUCKETS_SECONDS),
        }
    }

    /// Record one condition evaluation and its per-state outcome.
    pub fn observe_evaluation(&self, results: &Results, elapsed: Duration) {
        self.evaluations_total.fetch_add(1, Ordering::Relaxed);
        self.duration_seconds.observe_duration(elapsed);
        for r in results {
            if let Some(v) = self.results_total.get(&r.state) {
                v.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn inc_raw_query(&self) {
        self.raw_queries_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Execution failed as a whole (backend error, timeout or panic).
    pub fn inc_failure(&self) {
        self.failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_timeout(&self) {
        self.timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_panic(&self) {
        self.panics_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations_total.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures_total.load(Ordering::Relaxed)
    }

    pub fn results(&self, state: State) -> u64 {
        self.results_total
            .get(&state)
            .map(|v| v.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Prometheus text exposition of every metric.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::with_capacity(4 * 1024);
        let mut rendered_types = BTreeSet::new();

        self.render_counter(
            &mut out,
            &mut rendered_types,
            "alert_eval_total",
            self.evaluations_total.load(Ordering::Relaxed),
        );
        self.render_counter(
            &mut out,
            &mut rendered_types,
            "alert_eval_failures_total",
            self.failures_total.load(Ordering::Relaxed),
        );
        self.render_counter(
            &mut out,
            &mut rendered_types,
            "alert_eval_timeouts_total",
            self.timeouts_total.load(Ordering::Relaxed),
        );
        self.render_counter(
            &mut out,
            &mut rendered_types,
            "alert_eval_panics_total",
            self.panics_total.load(Ordering::Relaxed),
        );
        self.render_counter(
            &mut out,
            &mut rendered_types,
            "alert_eval_raw_queries_total",
            self.raw_queries_total.load(Ordering::Relaxed),
        );
        for (state, value) in &self.results_total {
            self.render_counter_labeled(
                &mut out,
                &mut rendered_types,
                "alert_eval_results_total",
                &[("state", state.as_str())],
                value.load(Ordering::Relaxed),
            );
        }
        self.render_histogram(
            &mut out,
            &mut rendered_types,
            "alert_eval_duration_seconds",
            &self.duration_seconds,
        );

        out
    }

    fn render_counter(
        &self,
        out: &mut String,
        rendered_types: &mut BTreeSet<String>,
        name: &str,
        value: u64,
    ) {
        self.render_counter_labeled(out, rendered_types, name, &[], value);
    }

    fn render_counter_labeled(
        &self,
        out: &mut String,
        rendered_types: &mut BTreeSet<String>,
        name: &str,
        labels: &[(&str, &str)],
        value: u64,
    ) {
        self.render_type_once(out, rendered_types, name, "counter");
        let _ = writeln!(out, "{name}{} {value}", format_labels(labels));
    }

    fn render_histogram(
        &self,
        out: &mut String,
        rendered_types: &mut BTreeSet<String>,
        name: &str,
        histogram: &Histogram,
    ) {
        let snapshot = histogram.snapshot();
        self.render_type_once(out, rendered_types, name, "histogram");
        let mut cumulative = 0u64;
        for (idx, upper_bound_nanos) in snapshot.upper_bounds_nanos.iter().enumerate() {
            cumulative = cumulative.saturating_add(snapshot.bucket_counts[idx]);
            let le = format!("{:.6}", *upper_bound_nanos as f64 / 1_000_000_000.0);
            let _ = writeln!(
                out,
                "{name}_bucket{} {cumulative}",
                format_labels(&[("le", le.as_str())]),
            );
        }
        cumulative = cumulative.saturating_add(
            *snapshot
                .bucket_counts
                .last()
                .expect("histogram must include +Inf bucket"),
        );
        let _ = writeln!(
            out,
            "{name}_bucket{} {cumulative}",
            format_labels(&[("le", "+Inf")]),
        );
        let _ = writeln!(out, "{name}_sum {}", snapshot.sum_seconds);
        let _ = writeln!(out, "{name}_count {cumulative}");
    }

    fn render_type_once(
        &self,
        out: &mut String,
        rendered_types: &mut BTreeSet<String>,
        name: &str,
        kind: &str,
    ) {
        if rendered_types.insert(name.to_string()) {
            let _ = writeln!(out, "# TYPE {name} {kind}");
        }
    }

    /// One-line summary for logs and the CLI.
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "evaluations={} failures={} timeouts={} panics={}",
            self.evaluations_total.load(Ordering::Relaxed),
            self.failures_total.load(Ordering::Relaxed),
            self.timeouts_total.load(Ordering::Relaxed),
            self.panics_total.load(Ordering::Relaxed),
        );
        for (state, value) in &self.results_total {
            let _ = write!(
                line,
                " {}={}",
                state.as_str().to_lowercase(),
                value.load(Ordering::Relaxed)
            );
        }
        line
    }
}

fn format_labels(labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let mut out = String::from("{");
    for (idx, (key, value)) in labels.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        out.push_str(key);
        out.push('=');
        out.push('"');
        for ch in value.chars() {
            match ch {
                '\\' => out.push_str("\\\\"),
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                _ => out.push(ch),
            }
        }
        out.push('"');
    }
    out.push('}');
    out
}

pub fn maybe_build_metrics(config: &MetricsConfig) -> Option<Arc<EvalMetrics>> {
    if !config.enabled {
        return None;
    }
    Some(Arc::new(EvalMetrics::new()))
}
