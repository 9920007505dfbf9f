use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of one visible button, unique while that button is shown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(pub String);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Press sends one command, hold sends another.
    Gesture,
    /// Periodically fetches JSON and renders it as the button title.
    Poll,
    /// Sends a single command when invoked.
    Passive,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Gesture => "gesture",
            ActionKind::Poll => "poll",
            ActionKind::Passive => "passive",
        }
    }
}
