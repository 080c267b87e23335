//! Trailing time windows.

/// A trailing window ending at the moment it was computed.
///
/// A record belongs to the window when its timestamp is strictly after
/// `now - length`. `reset_at` is `now + length`: the figure reported to
/// callers, which is later than the moment the oldest in-window record
/// actually expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    start: i64,
    reset_at: i64,
}

impl Window {
    /// The window of `length_ms` milliseconds ending at `now`.
    pub fn trailing(now: i64, length_ms: u64) -> Self {
        let length = i64::try_from(length_ms).unwrap_or(i64::MAX);
        Self {
            start: now.saturating_sub(length),
            reset_at: now.saturating_add(length),
        }
    }

    /// Exclusive lower bound of the window.
    pub fn start(&self) -> i64 {
        self.start
    }

    /// The reset time reported alongside decisions made in this window.
    pub fn reset_at(&self) -> i64 {
        self.reset_at
    }

    /// Whether a record stamped at `timestamp` still counts against the window.
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp > self.start
    }
}
