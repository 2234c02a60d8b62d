//! Interval bookkeeping for periodic upkeep between tasks.
//!
//! Workers poll the clock at task boundaries rather than running upkeep on
//! background timers, so session reloads and identity rotation never race
//! with an in-flight page fetch.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::HarvestConfig;

/// Which upkeep actions are due right now. Claiming them resets their
/// timers, so each due action fires on exactly one poll.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DueActions {
    pub reload_session: bool,
    pub rotate_identity: bool,
    pub run_hygiene: bool,
}

impl DueActions {
    pub fn any(&self) -> bool {
        self.reload_session || self.rotate_identity || self.run_hygiene
    }
}

struct ClockState {
    last_session: Instant,
    last_identity: Instant,
    last_hygiene: Instant,
}

/// Tracks three independent maintenance intervals. A single lock guards all
/// three timestamps so one poll claims atomically.
pub struct MaintenanceClock {
    session_interval: Duration,
    identity_interval: Duration,
    hygiene_interval: Duration,
    state: Mutex<ClockState>,
}

impl MaintenanceClock {
    pub fn new(config: &HarvestConfig) -> Self {
        let now = Instant::now();
        Self {
            session_interval: Duration::from_secs(config.session_reload_interval_secs),
            identity_interval: Duration::from_secs(config.identity_rotation_interval_secs),
            hygiene_interval: Duration::from_secs(config.hygiene_interval_secs),
            state: Mutex::new(ClockState {
                last_session: now,
                last_identity: now,
                last_hygiene: now,
            }),
        }
    }

    /// Check all intervals and claim the due ones in one step. Concurrent
    /// callers never both see the same action due.
    pub fn due(&self) -> DueActions {
        let mut state = self.state.lock().expect("maintenance lock poisoned");
        let now = Instant::now();
        let mut due = DueActions::default();

        if now.duration_since(state.last_session) >= self.session_interval {
            state.last_session = now;
            due.reload_session = true;
        }
        if now.duration_since(state.last_identity) >= self.identity_interval {
            state.last_identity = now;
            due.rotate_identity = true;
        }
        if now.duration_since(state.last_hygiene) >= self.hygiene_interval {
            state.last_hygiene = now;
            due.run_hygiene = true;
        }

        due
    }
}
