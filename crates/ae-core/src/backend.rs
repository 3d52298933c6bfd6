//! Seam to the external query/expression backend.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::frame::{Frame, json};
use crate::query::ExecutionRequest;

/// Frames returned for one reference ID, or the error that prevented them.
#[derive(Debug, Clone, Default)]
pub struct DataResponse {
    pub frames: Vec<Frame>,
    pub error: Option<String>,
}

impl DataResponse {
    pub fn ok(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            frames: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// Backend answer keyed by reference ID.
#[derive(Debug, Clone, Default)]
pub struct QueryDataResponse {
    pub responses: BTreeMap<String, DataResponse>,
}

impl QueryDataResponse {
    pub fn with_response(mut self, ref_id: impl Into<String>, response: DataResponse) -> Self {
        self.responses.insert(ref_id.into(), response);
        self
    }

    pub fn get(&self, ref_id: &str) -> Option<&DataResponse> {
        self.responses.get(ref_id)
    }

    pub fn from_json(text: &str) -> CoreResult<Self> {
        json::decode_response(text)
    }

    pub fn to_json(&self) -> CoreResult<String> {
        json::encode_response(self)
    }
}

/// Runs the queries and expressions of an [`ExecutionRequest`].
///
/// Implementations may wrap datasource plugins; the runtime isolates panics
/// and enforces the evaluation timeout around every call.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn query_data(&self, request: ExecutionRequest) -> anyhow::Result<QueryDataResponse>;
}
