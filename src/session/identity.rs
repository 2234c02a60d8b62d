//! Claimed client identity: the User-Agent string attached to outgoing
//! requests, rotated on a timer to reduce fingerprinting.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

const MOBILE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Linux; Android 10; SM-G973F) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 11; Pixel 5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; SM-S908E) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-G998B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (iPad; CPU OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1",
];

const TERMUX_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Linux; Android 10; Termux) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Linux; Android 11; Termux) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; Termux) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36",
];

#[derive(Debug, Clone)]
pub struct Identity {
    pub user_agent: String,
    pub chosen_at: DateTime<Utc>,
}

/// Shared current identity. Read-only from the perspective of fetches;
/// written only by rotation.
pub struct IdentityPool {
    current: Mutex<Identity>,
}

impl IdentityPool {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Identity {
                user_agent: random_user_agent(),
                chosen_at: Utc::now(),
            }),
        }
    }

    pub fn user_agent(&self) -> String {
        self.current
            .lock()
            .expect("identity lock poisoned")
            .user_agent
            .clone()
    }

    /// Pick a new User-Agent. Returns true when the string actually changed.
    pub fn rotate(&self) -> bool {
        let candidate = random_user_agent();
        let mut current = self.current.lock().expect("identity lock poisoned");
        if candidate == current.user_agent {
            return false;
        }
        *current = Identity {
            user_agent: candidate,
            chosen_at: Utc::now(),
        };
        true
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Weighted pick: 50% Termux, 30% mobile, 20% desktop.
fn random_user_agent() -> String {
    let mut rng = rand::thread_rng();
    let pool = match rng.gen::<f64>() {
        r if r < 0.5 => TERMUX_USER_AGENTS,
        r if r < 0.8 => MOBILE_USER_AGENTS,
        _ => DESKTOP_USER_AGENTS,
    };
    pool.choose(&mut rng)
        .expect("user agent pools are non-empty")
        .to_string()
}
