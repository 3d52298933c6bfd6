use std::collections::BTreeMap;

use crate::eval::NumberValueCapture;
use crate::frame::{Frame, FrameAnnotation};

fn fmt_value(v: Option<f64>) -> String {
    match v {
        Some(v) => v.to_string(),
        None => "null".to_string(),
    }
}

/// Human readable summary of the values behind a frame's state.
pub(crate) fn evaluation_string(frame: &Frame) -> String {
    match &frame.annotation {
        FrameAnnotation::None => String::new(),
        FrameAnnotation::ClassicMatches(matches) => matches
            .iter()
            .map(|m| {
                format!(
                    "[ metric='{}' labels={{{}}} value={} ]",
                    m.metric,
                    m.labels,
                    fmt_value(m.value)
                )
            })
            .collect::<Vec<_>>()
            .join(", "),
        FrameAnnotation::ValueCaptures(captures) => captures
            .iter()
            .map(|c| {
                format!(
                    "[ var='{}' labels={{{}}} value={} ]",
                    c.var,
                    c.labels,
                    fmt_value(c.value)
                )
            })
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Captured values keyed by reference ID; `None` for classic-condition
/// frames and frames without captures.
pub(crate) fn captured_values(frame: &Frame) -> Option<BTreeMap<String, NumberValueCapture>> {
    match &frame.annotation {
        FrameAnnotation::ValueCaptures(captures) if !captures.is_empty() => Some(
            captures
                .iter()
                .map(|c| (c.var.clone(), c.clone()))
                .collect(),
        ),
        _ => None,
    }
}
