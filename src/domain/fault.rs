use std::collections::HashMap;

/// Simulated latency applied before a response.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Delay {
    #[default]
    None,
    Fixed(u64),
    /// Uniform draw in `[min, max]` milliseconds.
    Range(u64, u64),
}

/// Probability and latency parameters for simulated network misbehaviour.
///
/// Immutable for the lifetime of one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultProfile {
    pub delay: Delay,
    pub error_rate: f64,
    pub timeout_rate: f64,
    pub offline: bool,
    pub error_status_codes: Vec<u16>,
    pub error_messages: HashMap<u16, String>,
}

impl Default for FaultProfile {
    fn default() -> Self {
        Self {
            delay: Delay::None,
            error_rate: 0.0,
            timeout_rate: 0.0,
            offline: false,
            error_status_codes: Vec::new(),
            error_messages: HashMap::new(),
        }
    }
}

impl FaultProfile {
    /// True when the profile can never alter a response.
    pub fn is_passthrough(&self) -> bool {
        matches!(self.delay, Delay::None | Delay::Fixed(0))
            && self.error_rate <= 0.0
            && self.timeout_rate <= 0.0
            && !self.offline
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Error,
    Offline,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::Error => "error",
            FaultKind::Offline => "offline",
        }
    }
}

/// Status and message of a simulated failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultResponse {
    pub status: u16,
    pub message: String,
}
