use std::collections::BTreeMap;
use std::ops::Deref;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::backend::QueryDataResponse;
use crate::error::EvalError;
use crate::eval::{NumberValueCapture, State, attach_captures, collect_captures};
use crate::frame::Frame;
use crate::labels::Labels;

// ---------------------------------------------------------------------------
// ExecutionResults
// ---------------------------------------------------------------------------

/// Output of executing a condition, before state evaluation.
#[derive(Debug, Clone)]
pub enum ExecutionResults {
    /// Execution failed as a whole; no frame is looked at.
    Failed(EvalError),
    /// The designated condition's frames, in backend order.
    Frames(Vec<Frame>),
}

impl ExecutionResults {
    /// Select the frames of `condition_ref` from a backend response and
    /// annotate them with the values captured across every response.
    ///
    /// An error reported for `condition_ref` itself fails the execution.
    pub fn from_response(mut response: QueryDataResponse, condition_ref: &str) -> Self {
        if let Some(message) = response
            .responses
            .get(condition_ref)
            .and_then(|r| r.error.clone())
        {
            return Self::Failed(EvalError::QueryFailed {
                ref_id: condition_ref.to_string(),
                message,
            });
        }

        let captures = collect_captures(&response);
        let mut frames = response
            .responses
            .remove(condition_ref)
            .map(|r| r.frames)
            .unwrap_or_default();
        attach_captures(&mut frames, &captures);
        Self::Frames(frames)
    }

    pub fn error(&self) -> Option<&EvalError> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Frames(_) => None,
        }
    }
}

impl From<EvalError> for ExecutionResults {
    fn from(e: EvalError) -> Self {
        Self::Failed(e)
    }
}

// ---------------------------------------------------------------------------
// EvalResult / Results
// ---------------------------------------------------------------------------

/// The evaluated state of one alert instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalResult {
    pub instance: Labels,
    pub state: State,
    /// Set only for `Error` results.
    #[serde(serialize_with = "error_as_string")]
    pub error: Option<EvalError>,
    pub evaluated_at: DateTime<Utc>,
    #[serde(rename = "evaluationDurationMs", with = "crate::serde_util::millis")]
    pub evaluation_duration: Duration,
    pub evaluation_string: String,
    /// Captured values by reference ID; `None` for classic conditions.
    pub values: Option<BTreeMap<String, NumberValueCapture>>,
}

fn error_as_string<S: Serializer>(e: &Option<EvalError>, s: S) -> Result<S::Ok, S::Error> {
    match e {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

impl EvalResult {
    pub(crate) fn new(
        instance: Labels,
        state: State,
        evaluated_at: DateTime<Utc>,
        evaluation_duration: Duration,
    ) -> Self {
        Self {
            instance,
            state,
            error: None,
            evaluated_at,
            evaluation_duration,
            evaluation_string: String::new(),
            values: None,
        }
    }

    pub(crate) fn failed(
        instance: Labels,
        error: EvalError,
        evaluated_at: DateTime<Utc>,
        evaluation_duration: Duration,
    ) -> Self {
        Self {
            error: Some(error),
            ..Self::new(instance, State::Error, evaluated_at, evaluation_duration)
        }
    }

    /// Text for the `Info` column: the error if any, else the evaluation
    /// string.
    pub fn info(&self) -> String {
        match &self.error {
            Some(e) => e.to_string(),
            None => self.evaluation_string.clone(),
        }
    }
}

/// Ordered results of one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Results(pub Vec<EvalResult>);

impl Results {
    pub fn into_inner(self) -> Vec<EvalResult> {
        self.0
    }

    /// Count of results per state, in `State` order.
    pub fn state_counts(&self) -> BTreeMap<State, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.0 {
            *counts.entry(r.state).or_insert(0) += 1;
        }
        counts
    }
}

impl Deref for Results {
    type Target = [EvalResult];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<EvalResult>> for Results {
    fn from(v: Vec<EvalResult>) -> Self {
        Self(v)
    }
}

impl FromIterator<EvalResult> for Results {
    fn from_iter<I: IntoIterator<Item = EvalResult>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Results {
    type Item = EvalResult;
    type IntoIter = std::vec::IntoIter<EvalResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Results {
    type Item = &'a EvalResult;
    type IntoIter = std::slice::Iter<'a, EvalResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
