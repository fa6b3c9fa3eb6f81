//! Fixed reconnection backoff schedule.

use std::time::Duration;

/// Delay sequence in seconds; the last element repeats forever.
const RECONNECT_DELAYS: [u64; 5] = [1, 2, 4, 8, 10];

/// Walks the fixed reconnect delay schedule. Each failure (failed connect
/// or unexpected close) advances the sequence; a successful connect resets
/// it to the first element.
#[derive(Debug, Default)]
pub struct Backoff {
    attempt: usize,
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// The delay to wait before the next connection attempt.
    pub fn next_delay(&mut self) -> Duration {
        let idx = self.attempt.min(RECONNECT_DELAYS.len() - 1);
        self.attempt += 1;
        Duration::from_secs(RECONNECT_DELAYS[idx])
    }

    /// Reset after a successful connect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
