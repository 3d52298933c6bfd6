use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::EvalError;
use crate::eval::extract::{captured_values, evaluation_string};
use crate::eval::{EvalResult, ExecutionResults, Results, State};
use crate::frame::Frame;
use crate::labels::Labels;

/// Map execution results to one state per alert instance.
///
/// An execution failure yields a single unlabeled `Error` result. No frames
/// yield a single unlabeled `NoData` result. Otherwise each frame is checked
/// on its own: a badly shaped frame becomes an `Error` result next to the
/// others. Finally, if two results share a label set, everything is
/// replaced by one `Error` result naming those labels.
///
/// A reduced frame holds one nullable number field with zero or one row:
/// zero rows or a null value is `NoData`, `0` is `Normal`, and any other
/// value (NaN included) is `Alerting`.
pub fn evaluate_execution_result(exec: &ExecutionResults, ts: DateTime<Utc>) -> Results {
    let elapsed = (Utc::now() - ts).to_std().unwrap_or_default();

    let frames = match exec {
        ExecutionResults::Failed(e) => {
            return Results(vec![EvalResult::failed(
                Labels::new(),
                e.clone(),
                ts,
                elapsed,
            )]);
        }
        ExecutionResults::Frames(frames) => frames,
    };

    if frames.is_empty() {
        return Results(vec![EvalResult::new(
            Labels::new(),
            State::NoData,
            ts,
            elapsed,
        )]);
    }

    let mut results = Vec::with_capacity(frames.len());
    for frame in frames {
        let r = match evaluate_frame(frame) {
            Ok(FrameOutcome { instance, state, annotated }) => {
                let mut r = EvalResult::new(instance, state, ts, elapsed);
                if annotated {
                    r.evaluation_string = evaluation_string(frame);
                    r.values = captured_values(frame);
                }
                r
            }
            Err(e) => EvalResult::failed(Labels::new(), e, ts, elapsed),
        };
        results.push(r);
    }

    let mut seen: HashSet<&Labels> = HashSet::with_capacity(results.len());
    for r in &results {
        if !seen.insert(&r.instance) {
            log::warn!("duplicate alert instance labels {{{}}}", r.instance);
            let labels = r.instance.clone();
            return Results(vec![EvalResult::failed(
                labels.clone(),
                EvalError::DuplicateLabels { labels },
                ts,
                elapsed,
            )]);
        }
    }

    Results(results)
}

struct FrameOutcome {
    instance: Labels,
    state: State,
    /// Whether the diagnostic string and captured values apply.
    annotated: bool,
}

impl FrameOutcome {
    fn no_data(instance: Labels) -> Self {
        Self {
            instance,
            state: State::NoData,
            annotated: false,
        }
    }
}

fn evaluate_frame(frame: &Frame) -> Result<FrameOutcome, EvalError> {
    let ref_id = frame.ref_id.as_str();

    let row_len = frame.row_len().map_err(|e| {
        EvalError::invalid_format(ref_id, format!("unable to get frame row length: {e}"))
    })?;

    if frame.has_time_field() {
        return Err(EvalError::invalid_format(
            ref_id,
            "looks like time series data, only reduced data can be alerted on.",
        ));
    }

    if row_len == 0 {
        match frame.fields.as_slice() {
            [] => return Ok(FrameOutcome::no_data(Labels::new())),
            [only] => return Ok(FrameOutcome::no_data(only.labels.clone())),
            _ => {}
        }
    }

    if row_len > 1 {
        return Err(EvalError::invalid_format(
            ref_id,
            format!("unexpected row length: {row_len} instead of 0 or 1"),
        ));
    }

    if frame.fields.len() > 1 {
        return Err(EvalError::invalid_format(
            ref_id,
            format!("unexpected field length: {} instead of 1", frame.fields.len()),
        ));
    }

    let field = &frame.fields[0];
    if !field.is_number() {
        return Err(EvalError::invalid_format(
            ref_id,
            format!("invalid field type: {}", field.data_type()),
        ));
    }

    // row_len == 1 and the single field is numeric.
    let state = match field.number_at(0).flatten() {
        None => State::NoData,
        Some(v) if v == 0.0 => State::Normal,
        Some(_) => State::Alerting,
    };

    Ok(FrameOutcome {
        instance: field.labels.clone(),
        state,
        annotated: true,
    })
}
