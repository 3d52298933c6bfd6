use std::sync::Arc;
use std::time::Duration;

use ae_core::{EvalError, ExecutionRequest, QueryBackend, QueryDataResponse};
use tokio::time::Instant;
use tokio_util::task::AbortOnDropHandle;

use crate::metrics::EvalMetrics;
use crate::panic_capture::{BackendPanic, CatchPanic, panic_message};

/// Runs backend calls in their own task so that a panic or a missed
/// deadline becomes an [`EvalError`] instead of taking the caller down.
pub(crate) struct ExecutionAdapter {
    backend: Arc<dyn QueryBackend>,
    expressions_enabled: bool,
    metrics: Option<Arc<EvalMetrics>>,
}

impl ExecutionAdapter {
    pub(crate) fn new(
        backend: Arc<dyn QueryBackend>,
        expressions_enabled: bool,
        metrics: Option<Arc<EvalMetrics>>,
    ) -> Self {
        Self {
            backend,
            expressions_enabled,
            metrics,
        }
    }

    fn record_panic(&self) {
        if let Some(m) = &self.metrics {
            m.inc_panic();
        }
    }

    /// Execute `request`, giving up at `deadline`.
    ///
    /// The backend task is aborted when the deadline passes or when the
    /// returned future is dropped.
    pub(crate) async fn execute(
        &self,
        request: ExecutionRequest,
        deadline: Instant,
        budget: Duration,
    ) -> Result<QueryDataResponse, EvalError> {
        if !self.expressions_enabled {
            ae_warn!(exec, org_id = request.org_id, "server-side expressions are disabled");
            return Err(EvalError::ExpressionsDisabled);
        }

        let org_id = request.org_id;
        let queries = request.queries.len();
        let backend = Arc::clone(&self.backend);
        let mut handle = AbortOnDropHandle::new(tokio::spawn(async move {
            CatchPanic::new(backend.query_data(request)).await
        }));

        ae_debug!(exec, org_id, queries, "backend call started");
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(Ok(Ok(response)))) => {
                ae_debug!(
                    exec,
                    org_id,
                    responses = response.responses.len(),
                    "backend call finished"
                );
                Ok(response)
            }
            Ok(Ok(Ok(Err(e)))) => {
                ae_warn!(exec, org_id, error = %format!("{e:#}"), "backend call failed");
                Err(EvalError::Backend(format!("{e:#}")))
            }
            Ok(Ok(Err(BackendPanic { message, stack }))) => {
                ae_error!(exec, org_id, panic = %message, stack = %stack, "alert rule panic");
                self.record_panic();
                Err(EvalError::Panic)
            }
            Ok(Err(join_err)) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                ae_error!(exec, org_id, panic = %message, "alert rule panic outside backend poll");
                self.record_panic();
                Err(EvalError::Panic)
            }
            Ok(Err(join_err)) => {
                ae_warn!(exec, org_id, error = %join_err, "backend task cancelled");
                Err(EvalError::Cancelled(join_err.to_string()))
            }
            Err(_elapsed) => {
                handle.abort();
                ae_warn!(exec, org_id, timeout = ?budget, "backend call timed out");
                if let Some(m) = &self.metrics {
                    m.inc_timeout();
                }
                Err(EvalError::DeadlineExceeded { timeout: budget })
            }
        }
    }
}
