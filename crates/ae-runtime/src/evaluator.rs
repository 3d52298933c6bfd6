use std::sync::Arc;
use std::time::Duration;

use ae_config::{AlertEvalConfig, EvaluationConfig};
use ae_core::{
    AlertQuery, Condition, EvalError, ExecutionResults, QueryBackend, QueryDataResponse, Results,
    build_request, evaluate_execution_result,
};
use chrono::{DateTime, Utc};
use orion_error::op_context;
use orion_error::prelude::*;
use tokio::time::Instant;

use crate::adapter::ExecutionAdapter;
use crate::error::{RuntimeReason, RuntimeResult};
use crate::metrics::{EvalMetrics, maybe_build_metrics};

/// Entry point for evaluating alert conditions against a query backend.
///
/// Holds no per-call state: one instance can serve concurrent evaluations
/// of many rules, each bounded by its own deadline.
pub struct Evaluator {
    timeout: Duration,
    adapter: ExecutionAdapter,
    metrics: Option<Arc<EvalMetrics>>,
}

impl Evaluator {
    /// Build from the full configuration; metrics are collected when
    /// `metrics.enabled` is set.
    pub fn new(config: &AlertEvalConfig, backend: Arc<dyn QueryBackend>) -> Self {
        let metrics = maybe_build_metrics(&config.metrics);
        Self::build(&config.evaluation, backend, metrics)
    }

    /// Build from the evaluation settings alone, without metrics.
    pub fn from_evaluation_config(
        config: &EvaluationConfig,
        backend: Arc<dyn QueryBackend>,
    ) -> Self {
        Self::build(config, backend, None)
    }

    fn build(
        config: &EvaluationConfig,
        backend: Arc<dyn QueryBackend>,
        metrics: Option<Arc<EvalMetrics>>,
    ) -> Self {
        ae_debug!(
            sys,
            timeout = ?config.timeout(),
            expressions_enabled = config.expressions_enabled,
            metrics = metrics.is_some(),
            "evaluator ready"
        );
        Self {
            timeout: config.timeout(),
            adapter: ExecutionAdapter::new(backend, config.expressions_enabled, metrics.clone()),
            metrics,
        }
    }

    pub fn metrics(&self) -> Option<&Arc<EvalMetrics>> {
        self.metrics.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Evaluate `condition` at `now` into one state per alert instance.
    ///
    /// Only a malformed condition or an undecodable query model is returned
    /// as `Err`; every failure after that point, including backend errors,
    /// panics and timeouts, is reported as an `Error` result.
    #[tracing::instrument(
        name = "eval.condition",
        skip_all,
        fields(org_id = condition.org_id, condition = %condition.condition)
    )]
    pub async fn condition_eval(
        &self,
        condition: &Condition,
        now: DateTime<Utc>,
    ) -> RuntimeResult<Results> {
        let mut op = op_context!("condition-eval").with_auto_log();
        op.record("condition", condition.condition.as_str());

        condition.validate().err_conv()?;
        let request = build_request(condition.org_id, &condition.data, now).err_conv()?;

        let started = Instant::now();
        let deadline = deadline_after(started, self.timeout);
        let exec = match self.adapter.execute(request, deadline, self.timeout).await {
            Ok(response) => ExecutionResults::from_response(response, &condition.condition),
            Err(e) => ExecutionResults::Failed(e),
        };

        let results = evaluate_execution_result(&exec, now);
        if let Some(m) = &self.metrics {
            if exec.error().is_some() {
                m.inc_failure();
            }
            m.observe_evaluation(&results, started.elapsed());
        }
        ae_debug!(
            eval,
            results = results.len(),
            states = ?results.state_counts(),
            "condition evaluated"
        );

        op.mark_suc();
        Ok(results)
    }

    /// Run `queries` at `now` and return the raw backend response, without
    /// state evaluation.
    #[tracing::instrument(
        name = "eval.queries",
        skip_all,
        fields(org_id = org_id, queries = queries.len())
    )]
    pub async fn queries_and_expressions_eval(
        &self,
        org_id: i64,
        queries: &[AlertQuery],
        now: DateTime<Utc>,
    ) -> RuntimeResult<QueryDataResponse> {
        let request = build_request(org_id, queries, now).err_conv()?;
        if let Some(m) = &self.metrics {
            m.inc_raw_query();
        }

        let deadline = deadline_after(Instant::now(), self.timeout);
        self.adapter
            .execute(request, deadline, self.timeout)
            .await
            .map_err(|e| {
                if let Some(m) = &self.metrics {
                    m.inc_failure();
                }
                StructError::from(execution_reason(&e)).with_detail(e.to_string())
            })
    }
}

/// `start + timeout`, saturating to roughly 30 years out when the sum does
/// not fit in an `Instant`.
fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

fn execution_reason(e: &EvalError) -> RuntimeReason {
    match e {
        EvalError::DeadlineExceeded { .. } => RuntimeReason::Timeout,
        EvalError::Panic => RuntimeReason::Panic,
        _ => RuntimeReason::Execution,
    }
}
