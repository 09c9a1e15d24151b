use crate::domain::fault::{Delay, FaultKind, FaultProfile, FaultResponse};
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

const OFFLINE_STATUS: u16 = 503;
const OFFLINE_MESSAGE: &str = "Network offline";
const DEFAULT_ERROR_STATUS: u16 = 500;
const DEFAULT_ERROR_MESSAGE: &str = "Simulated network error";

/// Applies a [`FaultProfile`] to incoming requests.
///
/// Stateless apart from the profile; every decision is an independent draw.
#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    profile: FaultProfile,
}

impl FaultInjector {
    pub fn new(profile: FaultProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &FaultProfile {
        &self.profile
    }

    pub fn is_offline(&self) -> bool {
        self.profile.offline
    }

    pub fn should_timeout(&self) -> bool {
        draw(self.profile.timeout_rate)
    }

    pub fn should_error(&self) -> bool {
        draw(self.profile.error_rate)
    }

    /// Delay to apply to the next request.
    pub fn next_delay(&self) -> Duration {
        let millis = match self.profile.delay {
            Delay::None => 0,
            Delay::Fixed(ms) => ms,
            Delay::Range(min, max) if min >= max => min,
            Delay::Range(min, max) => rand::thread_rng().gen_range(min..=max),
        };
        Duration::from_millis(millis)
    }

    /// Sleep for [`next_delay`](Self::next_delay); returns at once for zero.
    pub async fn wait(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn resolve_fault_response(&self, kind: FaultKind) -> FaultResponse {
        match kind {
            FaultKind::Offline => FaultResponse {
                status: OFFLINE_STATUS,
                message: OFFLINE_MESSAGE.to_string(),
            },
            FaultKind::Error => {
                let status = self
                    .profile
                    .error_status_codes
                    .choose(&mut rand::thread_rng())
                    .copied()
                    .unwrap_or(DEFAULT_ERROR_STATUS);
                let message = self
                    .profile
                    .error_messages
                    .get(&status)
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());
                FaultResponse { status, message }
            }
        }
    }
}

fn draw(rate: f64) -> bool {
    if rate <= 0.0 {
        return false;
    }
    if rate >= 1.0 {
        return true;
    }
    rand::thread_rng().gen::<f64>() < rate
}
