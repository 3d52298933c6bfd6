//! Alert query definitions and the execution request built from them.

mod request;

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use orion_error::StructError;
use orion_error::ErrorOweBase;
use orion_error::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreReason, CoreResult};

pub use request::{ExecutionQuery, ExecutionRequest, build_request};

/// Datasource UID reserved for server-side expressions.
pub const EXPRESSION_DATASOURCE_UID: &str = "-100";

/// 12 hours at a one second interval.
const DEFAULT_MAX_DATA_POINTS: f64 = 43200.0;
const DEFAULT_INTERVAL_MS: f64 = 1000.0;

const MAX_DATA_POINTS_KEY: &str = "maxDataPoints";
const INTERVAL_MS_KEY: &str = "intervalMs";
const QUERY_TYPE_KEY: &str = "queryType";

// ---------------------------------------------------------------------------
// Time ranges
// ---------------------------------------------------------------------------

/// Absolute query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Query window relative to the evaluation instant, in whole seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeTimeRange {
    #[serde(with = "crate::serde_util::secs")]
    pub from: Duration,
    #[serde(with = "crate::serde_util::secs")]
    pub to: Duration,
}

impl RelativeTimeRange {
    pub fn new(from: Duration, to: Duration) -> Self {
        Self { from, to }
    }

    /// `from` must lie further in the past than `to`.
    pub fn is_valid(&self) -> bool {
        self.from > self.to
    }

    /// `[now - from, now - to]`, clamped to the representable range.
    pub fn to_time_range(&self, now: DateTime<Utc>) -> TimeRange {
        let back = |d: Duration| {
            let delta = TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX);
            now.checked_sub_signed(delta)
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        };
        TimeRange {
            from: back(self.from),
            to: back(self.to),
        }
    }
}

// ---------------------------------------------------------------------------
// AlertQuery
// ---------------------------------------------------------------------------

/// One query or expression of an alert rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertQuery {
    pub ref_id: String,
    #[serde(default)]
    pub query_type: String,
    #[serde(default)]
    pub relative_time_range: RelativeTimeRange,
    #[serde(default)]
    pub datasource_uid: String,
    /// Raw datasource query model; must be a JSON object.
    pub model: Value,
}

impl AlertQuery {
    pub fn new(ref_id: impl Into<String>, datasource_uid: impl Into<String>, model: Value) -> Self {
        Self {
            ref_id: ref_id.into(),
            query_type: String::new(),
            relative_time_range: RelativeTimeRange::default(),
            datasource_uid: datasource_uid.into(),
            model,
        }
    }

    pub fn with_time_range(mut self, range: RelativeTimeRange) -> Self {
        self.relative_time_range = range;
        self
    }

    pub fn is_expression(&self) -> bool {
        self.datasource_uid == EXPRESSION_DATASOURCE_UID
    }

    fn model_props(&self) -> CoreResult<&Map<String, Value>> {
        match &self.model {
            Value::Object(props) => Ok(props),
            other => StructError::from(CoreReason::ModelDecode)
                .with_detail(format!(
                    "query {}: model is not a JSON object: {other}",
                    self.ref_id
                ))
                .err(),
        }
    }

    /// `maxDataPoints` from the model; missing, non-numeric or zero values
    /// fall back to 43200.
    pub fn max_data_points(&self) -> CoreResult<i64> {
        let props = self.model_props()?;
        Ok(number_or_default(props, MAX_DATA_POINTS_KEY, DEFAULT_MAX_DATA_POINTS) as i64)
    }

    /// `intervalMs` from the model; missing, non-numeric or zero values
    /// fall back to one second.
    pub fn interval(&self) -> CoreResult<Duration> {
        let props = self.model_props()?;
        let ms = number_or_default(props, INTERVAL_MS_KEY, DEFAULT_INTERVAL_MS);
        if ms < 0.0 || !ms.is_finite() {
            return StructError::from(CoreReason::ModelDecode)
                .with_detail(format!("query {}: invalid intervalMs {ms}", self.ref_id))
                .err();
        }
        Ok(Duration::from_millis(ms.trunc() as u64))
    }

    /// The model with `maxDataPoints` and `intervalMs` defaults filled in.
    pub fn model_with_defaults(&self) -> CoreResult<Value> {
        let mut props = self.model_props()?.clone();
        for (key, default) in [
            (MAX_DATA_POINTS_KEY, DEFAULT_MAX_DATA_POINTS),
            (INTERVAL_MS_KEY, DEFAULT_INTERVAL_MS),
        ] {
            let value = number_or_default(&props, key, default);
            props.insert(key.to_string(), Value::from(value));
        }
        Ok(Value::Object(props))
    }

    /// Normalise the query before it is stored: take `queryType` from the
    /// model, fill model defaults and check the time range.
    pub fn pre_save(&mut self) -> CoreResult<()> {
        match self.model_props()?.get(QUERY_TYPE_KEY) {
            None => {}
            Some(Value::String(qt)) => self.query_type = qt.clone(),
            Some(other) => {
                return StructError::from(CoreReason::ModelDecode)
                    .with_detail(format!(
                        "query {}: failed to get queryType from query model: {other}",
                        self.ref_id
                    ))
                    .err();
            }
        }

        self.model = self.model_with_defaults()?;

        if !self.is_expression() && !self.relative_time_range.is_valid() {
            return StructError::from(CoreReason::InvalidCondition)
                .with_detail(format!(
                    "query {}: invalid relative time range: {:?}",
                    self.ref_id, self.relative_time_range
                ))
                .err();
        }
        Ok(())
    }
}

fn number_or_default(props: &Map<String, Value>, key: &str, default: f64) -> f64 {
    props
        .get(key)
        .and_then(Value::as_f64)
        .filter(|v| *v != 0.0)
        .unwrap_or(default)
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// An alert rule condition: the queries to run and the reference ID whose
/// frames decide the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub condition: String,
    #[serde(default)]
    pub org_id: i64,
    pub data: Vec<AlertQuery>,
}

impl Condition {
    pub fn from_json(json: &str) -> CoreResult<Self> {
        serde_json::from_str(json).owe(CoreReason::InvalidCondition)
    }

    /// Reject conditions that can never be evaluated.
    pub fn validate(&self) -> CoreResult<()> {
        if self.condition.is_empty() {
            return StructError::from(CoreReason::InvalidCondition)
                .with_detail("condition reference ID is empty")
                .err();
        }
        if self.data.is_empty() {
            return StructError::from(CoreReason::InvalidCondition)
                .with_detail("condition has no queries")
                .err();
        }

        let mut seen = HashSet::with_capacity(self.data.len());
        for q in &self.data {
            if q.ref_id.is_empty() {
                return StructError::from(CoreReason::InvalidCondition)
                    .with_detail("query with empty reference ID")
                    .err();
            }
            if !seen.insert(q.ref_id.as_str()) {
                return StructError::from(CoreReason::InvalidCondition)
                    .with_detail(format!("duplicate query reference ID '{}'", q.ref_id))
                    .err();
            }
        }

        if !seen.contains(self.condition.as_str()) {
            return StructError::from(CoreReason::InvalidCondition)
                .with_detail(format!(
                    "condition '{}' does not match any query reference ID",
                    self.condition
                ))
                .err();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn query(model: Value) -> AlertQuery {
        AlertQuery::new("A", "ds-1", model)
            .with_time_range(RelativeTimeRange::new(Duration::from_secs(600), Duration::ZERO))
    }

    // -----------------------------------------------------------------------
    // Model defaults
    // -----------------------------------------------------------------------

    #[test]
    fn defaults_when_missing() {
        let q = query(json!({ "expr": "up" }));
        assert_eq!(q.max_data_points().unwrap(), 43200);
        assert_eq!(q.interval().unwrap(), Duration::from_secs(1));

        let model = q.model_with_defaults().unwrap();
        assert_eq!(model["maxDataPoints"], json!(43200.0));
        assert_eq!(model["intervalMs"], json!(1000.0));
        assert_eq!(model["expr"], json!("up"));
    }

    #[test]
    fn defaults_when_zero_or_not_numeric() {
        let q = query(json!({ "maxDataPoints": 0, "intervalMs": "fast" }));
        assert_eq!(q.max_data_points().unwrap(), 43200);
        assert_eq!(q.interval().unwrap(), Duration::from_millis(1000));
    }

    #[test]
    fn explicit_values_kept() {
        let q = query(json!({ "maxDataPoints": 100, "intervalMs": 250 }));
        assert_eq!(q.max_data_points().unwrap(), 100);
        assert_eq!(q.interval().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn non_object_model_is_decode_error() {
        let q = query(json!([1, 2, 3]));
        assert!(q.max_data_points().is_err());
        assert!(q.interval().is_err());
        assert!(q.model_with_defaults().is_err());
    }

    #[test]
    fn negative_interval_is_decode_error() {
        assert!(query(json!({ "intervalMs": -5 })).interval().is_err());
    }

    // -----------------------------------------------------------------------
    // Time ranges
    // -----------------------------------------------------------------------

    #[test]
    fn relative_range_resolves_against_now() {
        let now = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();
        let r = RelativeTimeRange::new(Duration::from_secs(300), Duration::from_secs(60));
        let abs = r.to_time_range(now);
        assert_eq!(abs.from, Utc.with_ymd_and_hms(2021, 6, 1, 11, 55, 0).unwrap());
        assert_eq!(abs.to, Utc.with_ymd_and_hms(2021, 6, 1, 11, 59, 0).unwrap());
    }

    #[test]
    fn relative_range_validity() {
        assert!(RelativeTimeRange::new(Duration::from_secs(10), Duration::ZERO).is_valid());
        assert!(!RelativeTimeRange::new(Duration::ZERO, Duration::ZERO).is_valid());
        assert!(!RelativeTimeRange::new(Duration::ZERO, Duration::from_secs(10)).is_valid());
    }

    #[test]
    fn relative_range_serialised_as_seconds() {
        let r: RelativeTimeRange = serde_json::from_str(r#"{ "from": 600, "to": 0 }"#).unwrap();
        assert_eq!(r.from, Duration::from_secs(600));
        assert_eq!(serde_json::to_value(r).unwrap(), json!({ "from": 600, "to": 0 }));
    }

    #[test]
    fn alert_query_wire_format() {
        let q: AlertQuery = serde_json::from_value(json!({
            "refId": "A",
            "queryType": "",
            "relativeTimeRange": { "from": 18000, "to": 10800 },
            "datasourceUid": "000000004",
            "model": { "datasource": "000000004", "refId": "A" }
        }))
        .unwrap();
        assert_eq!(q.ref_id, "A");
        assert_eq!(q.relative_time_range.from, Duration::from_secs(18000));
        assert!(!q.is_expression());
    }

    // -----------------------------------------------------------------------
    // pre_save
    // -----------------------------------------------------------------------

    #[test]
    fn pre_save_copies_query_type_and_fills_defaults() {
        let mut q = query(json!({ "queryType": "range" }));
        q.pre_save().unwrap();
        assert_eq!(q.query_type, "range");
        assert_eq!(q.model["maxDataPoints"], json!(43200.0));
    }

    #[test]
    fn pre_save_rejects_non_string_query_type() {
        let mut q = query(json!({ "queryType": 3 }));
        assert!(q.pre_save().is_err());
    }

    #[test]
    fn pre_save_rejects_invalid_range_unless_expression() {
        let mut q = AlertQuery::new("A", "ds-1", json!({}));
        assert!(q.pre_save().is_err());

        let mut e = AlertQuery::new("B", EXPRESSION_DATASOURCE_UID, json!({ "type": "math" }));
        assert!(e.is_expression());
        e.pre_save().unwrap();
    }

    // -----------------------------------------------------------------------
    // Condition
    // -----------------------------------------------------------------------

    fn condition(cond: &str, refs: &[&str]) -> Condition {
        Condition {
            condition: cond.to_string(),
            org_id: 1,
            data: refs.iter().map(|r| AlertQuery::new(*r, "ds", json!({}))).collect(),
        }
    }

    #[test]
    fn valid_condition() {
        condition("B", &["A", "B"]).validate().unwrap();
    }

    #[test]
    fn reject_empty_condition_ref() {
        assert!(condition("", &["A"]).validate().is_err());
    }

    #[test]
    fn reject_no_queries() {
        assert!(condition("A", &[]).validate().is_err());
    }

    #[test]
    fn reject_condition_not_among_queries() {
        assert!(condition("C", &["A", "B"]).validate().is_err());
    }

    #[test]
    fn reject_duplicate_ref_ids() {
        assert!(condition("A", &["A", "A"]).validate().is_err());
    }

    #[test]
    fn condition_from_json() {
        let c = Condition::from_json(
            r#"{ "condition": "B", "orgId": 3, "data": [
                { "refId": "A", "datasourceUid": "ds", "model": {} },
                { "refId": "B", "datasourceUid": "-100", "model": { "type": "reduce" } }
            ] }"#,
        )
        .unwrap();
        assert_eq!(c.org_id, 3);
        assert!(c.data[1].is_expression());
        assert!(Condition::from_json("{").is_err());
    }
}
