use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Evaluation state of one alert instance.
///
/// The declaration order is only used for display. `Pending` is never
/// produced by the evaluator; it belongs to the scheduler, which holds an
/// `Alerting` instance there until its `for` duration has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum State {
    Normal,
    Alerting,
    Pending,
    NoData,
    Error,
}

impl State {
    pub const ALL: [State; 5] = [
        State::Normal,
        State::Alerting,
        State::Pending,
        State::NoData,
        State::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            State::Normal => "Normal",
            State::Alerting => "Alerting",
            State::Pending => "Pending",
            State::NoData => "NoData",
            State::Error => "Error",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        State::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("unknown state '{s}'"))
    }
}
