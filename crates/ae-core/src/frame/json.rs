//! JSON codec for recorded backend responses.
//!
//! ```json
//! {
//!   "A": {
//!     "frames": [
//!       { "name": "", "refId": "A",
//!         "fields": [ { "name": "A", "type": "number", "labels": { "host": "a" }, "values": [1.0] } ],
//!         "meta": { "classicMatches": [ { "metric": "cpu", "labels": {}, "value": 3.5 } ] } }
//!     ],
//!     "error": null
//!   }
//! }
//! ```
//!
//! Field types are `number` (nullable float), `time` (epoch milliseconds or
//! RFC 3339 strings), `string` and `bool`. Non-finite numbers are written as
//! the strings `"NaN"`, `"+Inf"` and `"-Inf"`.

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, StringArray, TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, Float64Type, TimeUnit, TimestampMillisecondType};
use chrono::DateTime;
use orion_error::StructError;
use orion_error::ErrorOweBase;
use orion_error::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{DataResponse, QueryDataResponse};
use crate::error::{CoreError, CoreReason, CoreResult};
use crate::eval::NumberValueCapture;
use crate::frame::{EvalMatch, Field, Frame, FrameAnnotation};
use crate::labels::Labels;

// ---------------------------------------------------------------------------
// Wire structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct DataResponseJson {
    #[serde(default)]
    frames: Vec<FrameJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameJson {
    #[serde(default)]
    name: String,
    #[serde(default)]
    ref_id: String,
    #[serde(default)]
    fields: Vec<FieldJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<MetaJson>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetaJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    classic_matches: Option<Vec<EvalMatch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value_captures: Option<Vec<NumberValueCapture>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct FieldJson {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: FieldKind,
    #[serde(default)]
    labels: Labels,
    #[serde(default)]
    values: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FieldKind {
    Number,
    Time,
    String,
    Bool,
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

pub fn decode_response(json: &str) -> CoreResult<QueryDataResponse> {
    let raw: BTreeMap<String, DataResponseJson> =
        serde_json::from_str(json).owe(CoreReason::DataFormat)?;

    let mut responses = BTreeMap::new();
    for (ref_id, resp) in raw {
        let frames = resp
            .frames
            .into_iter()
            .map(|f| decode_frame(f, &ref_id))
            .collect::<CoreResult<Vec<_>>>()?;
        responses.insert(
            ref_id,
            DataResponse {
                frames,
                error: resp.error,
            },
        );
    }
    Ok(QueryDataResponse { responses })
}

fn decode_frame(raw: FrameJson, response_ref: &str) -> CoreResult<Frame> {
    let ref_id = if raw.ref_id.is_empty() {
        response_ref.to_string()
    } else {
        raw.ref_id
    };
    let fields = raw
        .fields
        .into_iter()
        .map(|f| decode_field(f).position(format!("frame {ref_id}")))
        .collect::<CoreResult<Vec<_>>>()?;

    let annotation = match raw.meta {
        Some(MetaJson {
            classic_matches: Some(matches),
            ..
        }) => FrameAnnotation::ClassicMatches(matches),
        Some(MetaJson {
            value_captures: Some(captures),
            ..
        }) => FrameAnnotation::ValueCaptures(captures),
        _ => FrameAnnotation::None,
    };

    Ok(Frame {
        name: raw.name,
        ref_id,
        fields,
        annotation,
    })
}

fn decode_field(raw: FieldJson) -> CoreResult<Field> {
    let values: ArrayRef = match raw.kind {
        FieldKind::Number => {
            let nums = raw
                .values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Number(n) => n.as_f64().map(Some).ok_or_else(|| bad_value(&raw.name, v)),
                    Value::String(s) => non_finite_from_str(s)
                        .map(Some)
                        .ok_or_else(|| bad_value(&raw.name, v)),
                    _ => Err(bad_value(&raw.name, v)),
                })
                .collect::<CoreResult<Vec<_>>>()?;
            Arc::new(Float64Array::from(nums))
        }
        FieldKind::Time => {
            let millis = raw
                .values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Number(n) => n.as_i64().map(Some).ok_or_else(|| bad_value(&raw.name, v)),
                    Value::String(s) => DateTime::parse_from_rfc3339(s)
                        .map(|t| Some(t.timestamp_millis()))
                        .map_err(|_| bad_value(&raw.name, v)),
                    _ => Err(bad_value(&raw.name, v)),
                })
                .collect::<CoreResult<Vec<_>>>()?;
            Arc::new(TimestampMillisecondArray::from(millis))
        }
        FieldKind::String => {
            let strings = raw
                .values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::String(s) => Ok(Some(s.clone())),
                    _ => Err(bad_value(&raw.name, v)),
                })
                .collect::<CoreResult<Vec<_>>>()?;
            Arc::new(StringArray::from(strings))
        }
        FieldKind::Bool => {
            let bools = raw
                .values
                .iter()
                .map(|v| match v {
                    Value::Null => Ok(None),
                    Value::Bool(b) => Ok(Some(*b)),
                    _ => Err(bad_value(&raw.name, v)),
                })
                .collect::<CoreResult<Vec<_>>>()?;
            Arc::new(BooleanArray::from(bools))
        }
    };

    Ok(Field {
        name: raw.name,
        labels: raw.labels,
        values,
    })
}

fn non_finite_from_str(s: &str) -> Option<f64> {
    match s {
        "NaN" => Some(f64::NAN),
        "+Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

fn number_to_json(v: f64) -> Value {
    match serde_json::Number::from_f64(v) {
        Some(n) => Value::Number(n),
        None if v.is_nan() => Value::from("NaN"),
        None if v > 0.0 => Value::from("+Inf"),
        None => Value::from("-Inf"),
    }
}

fn bad_value(field: &str, v: &Value) -> CoreError {
    StructError::from(CoreReason::DataFormat)
        .with_detail(format!("field '{field}': unexpected value {v}"))
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

pub fn encode_response(response: &QueryDataResponse) -> CoreResult<String> {
    let mut raw = BTreeMap::new();
    for (ref_id, resp) in &response.responses {
        let frames = resp
            .frames
            .iter()
            .map(encode_frame)
            .collect::<CoreResult<Vec<_>>>()?;
        raw.insert(
            ref_id.as_str(),
            DataResponseJson {
                frames,
                error: resp.error.clone(),
            },
        );
    }
    serde_json::to_string_pretty(&raw).owe(CoreReason::DataFormat)
}

fn encode_frame(frame: &Frame) -> CoreResult<FrameJson> {
    let fields = frame
        .fields
        .iter()
        .map(encode_field)
        .collect::<CoreResult<Vec<_>>>()?;
    let meta = match &frame.annotation {
        FrameAnnotation::None => None,
        FrameAnnotation::ClassicMatches(m) => Some(MetaJson {
            classic_matches: Some(m.clone()),
            ..MetaJson::default()
        }),
        FrameAnnotation::ValueCaptures(c) => Some(MetaJson {
            value_captures: Some(c.clone()),
            ..MetaJson::default()
        }),
    };
    Ok(FrameJson {
        name: frame.name.clone(),
        ref_id: frame.ref_id.clone(),
        fields,
        meta,
    })
}

fn encode_field(field: &Field) -> CoreResult<FieldJson> {
    let array = &field.values;
    let (kind, values): (FieldKind, Vec<Value>) = match array.data_type() {
        DataType::Float64 => {
            let a = array.as_primitive::<Float64Type>();
            (
                FieldKind::Number,
                (0..a.len())
                    .map(|i| {
                        if a.is_null(i) {
                            Value::Null
                        } else {
                            number_to_json(a.value(i))
                        }
                    })
                    .collect(),
            )
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            let a = array.as_primitive::<TimestampMillisecondType>();
            (
                FieldKind::Time,
                (0..a.len())
                    .map(|i| {
                        if a.is_null(i) {
                            Value::Null
                        } else {
                            Value::from(a.value(i))
                        }
                    })
                    .collect(),
            )
        }
        DataType::Utf8 => {
            let a = array.as_string::<i32>();
            (
                FieldKind::String,
                (0..a.len())
                    .map(|i| {
                        if a.is_null(i) {
                            Value::Null
                        } else {
                            Value::from(a.value(i))
                        }
                    })
                    .collect(),
            )
        }
        DataType::Boolean => {
            let a = array.as_boolean();
            (
                FieldKind::Bool,
                (0..a.len())
                    .map(|i| {
                        if a.is_null(i) {
                            Value::Null
                        } else {
                            Value::from(a.value(i))
                        }
                    })
                    .collect(),
            )
        }
        other => {
            return StructError::from(CoreReason::DataFormat)
                .with_detail(format!("field '{}': unsupported type {other}", field.name))
                .err();
        }
    };
    Ok(FieldJson {
        name: field.name.clone(),
        kind,
        labels: field.labels.clone(),
        values,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
