//! Turn boundary detection
//!
//! The remote peer never says when it has finished speaking. A turn is
//! considered over once a full quiet period passes with no new frame; every
//! frame restarts the countdown.

use std::time::{Duration, Instant};

/// Quiet period after the last frame before a turn is closed.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

/// Single-shot debounce timer, represented by its deadline.
///
/// The detector only tracks when the turn should end; whoever owns it sleeps
/// until [`deadline`](Self::deadline) and then asks [`poll_elapsed`](Self::poll_elapsed).
#[derive(Debug, Clone)]
pub struct TurnBoundaryDetector {
    quiet_period: Duration,
    deadline: Option<Instant>,
}

impl TurnBoundaryDetector {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            deadline: None,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Restart the countdown from `now`.
    pub fn on_frame_appended(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet_period);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarm. Returns whether a countdown was pending.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    /// True exactly once per countdown, when `now` has reached the deadline.
    pub fn poll_elapsed(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for TurnBoundaryDetector {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_frame_extends_the_window() {
        let t0 = Instant::now();
        let mut detector = TurnBoundaryDetector::default();
        assert!(!detector.poll_elapsed(t0 + Duration::from_secs(10)));

        detector.on_frame_appended(t0);
        detector.on_frame_appended(t0 + Duration::from_millis(400));
        assert!(!detector.poll_elapsed(t0 + Duration::from_millis(600)));
        assert!(!detector.poll_elapsed(t0 + Duration::from_millis(899)));
        assert!(detector.poll_elapsed(t0 + Duration::from_millis(900)));
        assert!(!detector.poll_elapsed(t0 + Duration::from_millis(2000)));
    }

    #[test]
    fn test_cancel() {
        let t0 = Instant::now();
        let mut detector = TurnBoundaryDetector::new(Duration::from_millis(100));
        assert!(!detector.cancel());
        detector.on_frame_appended(t0);
        assert!(detector.is_armed());
        assert!(detector.cancel());
        assert!(!detector.is_armed());
        assert!(!detector.poll_elapsed(t0 + Duration::from_secs(1)));
    }
}
