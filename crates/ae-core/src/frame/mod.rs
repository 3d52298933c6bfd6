//! Result frames returned by the query/expression backend.
//!
//! A [`Frame`] is a named set of equally long columns ([`Field`]s), each
//! backed by an Arrow array and carrying its own label set. Frames belonging
//! to the designated condition are what the state evaluator reads.

pub mod json;

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Float64Array};
use arrow::datatypes::{DataType, Field as ArrowField, Float64Type, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use orion_error::ErrorOweBase;
use orion_error::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CoreReason, CoreResult};
use crate::eval::NumberValueCapture;
use crate::labels::Labels;

// ---------------------------------------------------------------------------
// Annotation
// ---------------------------------------------------------------------------

/// A single match produced by a legacy "classic condition" expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalMatch {
    pub metric: String,
    #[serde(default)]
    pub labels: Labels,
    pub value: Option<f64>,
}

/// Metadata attached to a frame.
///
/// Classic matches come from the backend and are never replaced; value
/// captures are written by the capture extractor.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FrameAnnotation {
    #[default]
    None,
    ClassicMatches(Vec<EvalMatch>),
    ValueCaptures(Vec<NumberValueCapture>),
}

impl FrameAnnotation {
    pub fn is_classic(&self) -> bool {
        matches!(self, Self::ClassicMatches(_))
    }
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub labels: Labels,
    pub values: ArrayRef,
}

impl Field {
    pub fn new(name: impl Into<String>, values: ArrayRef) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            values,
        }
    }

    /// A nullable numeric field.
    pub fn number(name: impl Into<String>, values: impl IntoIterator<Item = Option<f64>>) -> Self {
        let array: Float64Array = values.into_iter().collect();
        Self::new(name, Arc::new(array))
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn data_type(&self) -> &DataType {
        self.values.data_type()
    }

    pub fn is_time(&self) -> bool {
        matches!(
            self.data_type(),
            DataType::Timestamp(_, _)
                | DataType::Date32
                | DataType::Date64
                | DataType::Time32(_)
                | DataType::Time64(_)
        )
    }

    /// True for the single-nullable-number type the evaluator accepts.
    pub fn is_number(&self) -> bool {
        matches!(self.data_type(), DataType::Float64)
    }

    /// Value at `row` of a numeric field; `None` when the field is not
    /// numeric or the row is out of range, `Some(None)` for a null.
    pub fn number_at(&self, row: usize) -> Option<Option<f64>> {
        let array = self.values.as_primitive_opt::<Float64Type>()?;
        if row >= array.len() {
            return None;
        }
        Some(array.is_valid(row).then(|| array.value(row)))
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("frame has different field lengths, field 0 is len {first} but field {index} is len {len}")]
pub struct RowLenError {
    pub first: usize,
    pub index: usize,
    pub len: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub name: String,
    pub ref_id: String,
    pub fields: Vec<Field>,
    pub annotation: FrameAnnotation,
}

impl Frame {
    pub fn new(ref_id: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_annotation(mut self, annotation: FrameAnnotation) -> Self {
        self.annotation = annotation;
        self
    }

    /// Number of rows; every field must have the same length.
    pub fn row_len(&self) -> Result<usize, RowLenError> {
        let Some(first) = self.fields.first() else {
            return Ok(0);
        };
        let first = first.len();
        for (index, field) in self.fields.iter().enumerate().skip(1) {
            if field.len() != first {
                return Err(RowLenError {
                    first,
                    index,
                    len: field.len(),
                });
            }
        }
        Ok(first)
    }

    pub fn has_time_field(&self) -> bool {
        self.fields.iter().any(Field::is_time)
    }

    /// The lone numeric field of a reduced frame, if the frame has that shape.
    pub fn single_number_field(&self) -> Option<&Field> {
        match self.fields.as_slice() {
            [f] if f.is_number() => Some(f),
            _ => None,
        }
    }

    /// Project into an Arrow [`RecordBatch`]; each field's labels become
    /// the schema field's metadata.
    pub fn to_record_batch(&self) -> CoreResult<RecordBatch> {
        let row_count = self.row_len().owe(CoreReason::FrameShape)?;

        let schema_fields: Vec<ArrowField> = self
            .fields
            .iter()
            .map(|f| {
                let metadata: HashMap<String, String> = f.labels.to_hash_map();
                ArrowField::new(&f.name, f.data_type().clone(), true).with_metadata(metadata)
            })
            .collect();
        let mut schema_metadata = HashMap::new();
        if !self.name.is_empty() {
            schema_metadata.insert("name".to_string(), self.name.clone());
        }
        if !self.ref_id.is_empty() {
            schema_metadata.insert("refId".to_string(), self.ref_id.clone());
        }
        let schema = Arc::new(Schema::new_with_metadata(schema_fields, schema_metadata));
        let columns: Vec<ArrayRef> = self.fields.iter().map(|f| f.values.clone()).collect();
        let options = RecordBatchOptions::new().with_row_count(Some(row_count));

        RecordBatch::try_new_with_options(schema, columns, &options)
            .owe(CoreReason::FrameShape)
            .position(format!("frame {}", self.ref_id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
