use serde::{Deserialize, Serialize};

use crate::backend::QueryDataResponse;
use crate::frame::{Frame, FrameAnnotation};
use crate::labels::Labels;

/// A scalar captured from a reduced frame, used to annotate results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberValueCapture {
    /// Reference ID of the query or expression that produced the value.
    pub var: String,
    #[serde(default)]
    pub labels: Labels,
    /// `None` when the source frame had no rows.
    pub value: Option<f64>,
}

/// Capture every single-number frame in `response`, whatever its
/// reference ID.
///
/// Frames with more than one row are not scalars and are skipped.
pub fn collect_captures(response: &QueryDataResponse) -> Vec<NumberValueCapture> {
    let mut captures = Vec::new();
    for (ref_id, resp) in &response.responses {
        for frame in &resp.frames {
            let Some(field) = frame.single_number_field() else {
                continue;
            };
            let value = match field.len() {
                0 => None,
                1 => field.number_at(0).flatten(),
                _ => continue,
            };
            let var = if frame.ref_id.is_empty() {
                ref_id.clone()
            } else {
                frame.ref_id.clone()
            };
            captures.push(NumberValueCapture {
                var,
                labels: field.labels.clone(),
                value,
            });
        }
    }
    captures
}

/// Annotate condition frames with the captures whose labels overlap theirs.
///
/// Frames holding classic matches are left alone. Every other frame has
/// its annotation replaced: matching captures when it has exactly one
/// field, nothing otherwise. A capture may land on several frames.
pub fn attach_captures(frames: &mut [Frame], captures: &[NumberValueCapture]) {
    for frame in frames.iter_mut() {
        if frame.annotation.is_classic() {
            continue;
        }
        frame.annotation = FrameAnnotation::None;

        let [field] = frame.fields.as_slice() else {
            continue;
        };
        let matched: Vec<NumberValueCapture> = captures
            .iter()
            .filter(|c| field.labels.overlaps(&c.labels))
            .cloned()
            .collect();
        if !matched.is_empty() {
            frame.annotation = FrameAnnotation::ValueCaptures(matched);
        }
    }
}
