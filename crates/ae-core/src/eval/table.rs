use std::collections::BTreeSet;
use std::sync::Arc;

use arrow::array::StringArray;

use crate::eval::Results;
use crate::frame::{Field, Frame};

pub const RESULTS_FRAME_NAME: &str = "evaluation results";
pub const STATE_COLUMN: &str = "State";
pub const INFO_COLUMN: &str = "Info";

fn string_field(name: &str, values: Vec<String>) -> Field {
    Field::new(name, Arc::new(StringArray::from(values)))
}

impl Results {
    /// One row per result: a column for every label key seen (sorted),
    /// then `State`, then `Info`. Missing label values are empty strings.
    pub fn as_data_frame(&self) -> Frame {
        let keys: BTreeSet<&str> = self.iter().flat_map(|r| r.instance.keys()).collect();

        let mut frame = Frame::default().with_name(RESULTS_FRAME_NAME);
        for key in keys {
            let column = self
                .iter()
                .map(|r| r.instance.get(key).unwrap_or_default().to_string())
                .collect();
            frame = frame.with_field(string_field(key, column));
        }

        let states = self.iter().map(|r| r.state.to_string()).collect();
        let infos = self.iter().map(|r| r.info()).collect();
        frame
            .with_field(string_field(STATE_COLUMN, states))
            .with_field(string_field(INFO_COLUMN, infos))
    }
}
