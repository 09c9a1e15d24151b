use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of lifecycle events, named `scope:action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    #[serde(rename = "server:started")]
    ServerStarted,
    #[serde(rename = "server:reloaded")]
    ServerReloaded,
    #[serde(rename = "reload:failed")]
    ReloadFailed,
    #[serde(rename = "data:generated")]
    DataGenerated,
    #[serde(rename = "fault:injected")]
    FaultInjected,
}

impl EventName {
    pub const ALL: [EventName; 5] = [
        EventName::ServerStarted,
        EventName::ServerReloaded,
        EventName::ReloadFailed,
        EventName::DataGenerated,
        EventName::FaultInjected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::ServerStarted => "server:started",
            EventName::ServerReloaded => "server:reloaded",
            EventName::ReloadFailed => "reload:failed",
            EventName::DataGenerated => "data:generated",
            EventName::FaultInjected => "fault:injected",
        }
    }

    /// The part before the colon.
    pub fn scope(&self) -> &'static str {
        self.as_str().split(':').next().unwrap_or_default()
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown event name: {0}")]
pub struct UnknownEvent(pub String);

impl FromStr for EventName {
    type Err = UnknownEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|e| e.as_str() == s.trim())
            .ok_or_else(|| UnknownEvent(s.to_string()))
    }
}
