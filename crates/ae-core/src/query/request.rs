use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use orion_error::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreResult;
use crate::query::{AlertQuery, TimeRange};

/// One query of an [`ExecutionRequest`], with its window resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionQuery {
    pub ref_id: String,
    pub time_range: TimeRange,
    pub datasource_uid: String,
    pub model: Value,
    #[serde(rename = "intervalMs", with = "crate::serde_util::millis")]
    pub interval: Duration,
    pub max_data_points: i64,
    pub query_type: String,
}

/// What the query/expression backend is asked to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub org_id: i64,
    pub headers: BTreeMap<String, String>,
    pub queries: Vec<ExecutionQuery>,
}

fn alerting_headers() -> BTreeMap<String, String> {
    // Datasources check these to special-case alerting traffic.
    BTreeMap::from([
        ("FromAlert".to_string(), "true".to_string()),
        ("X-Cache-Skip".to_string(), "true".to_string()),
    ])
}

/// Build the backend request for `queries` evaluated at `now`.
///
/// Each query's relative range is resolved on its own. Fails with
/// `ModelDecode` if a model, interval or max data points cannot be read.
pub fn build_request(
    org_id: i64,
    queries: &[AlertQuery],
    now: DateTime<Utc>,
) -> CoreResult<ExecutionRequest> {
    let mut resolved = Vec::with_capacity(queries.len());
    for q in queries {
        let position = format!("query {}", q.ref_id);
        let model = q.model_with_defaults().position(position.clone())?;
        let interval = q.interval().position(position.clone())?;
        let max_data_points = q.max_data_points().position(position)?;

        resolved.push(ExecutionQuery {
            ref_id: q.ref_id.clone(),
            time_range: q.relative_time_range.to_time_range(now),
            datasource_uid: q.datasource_uid.clone(),
            model,
            interval,
            max_data_points,
            query_type: q.query_type.clone(),
        });
    }

    Ok(ExecutionRequest {
        org_id,
        headers: alerting_headers(),
        queries: resolved,
    })
}
