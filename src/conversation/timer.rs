//! Recording duration tracking

use std::time::Instant;

/// Snapshot of the current recording's timing and bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingWindow {
    pub started_at: Instant,
    pub elapsed_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl RecordingWindow {
    pub fn reached_minimum(&self) -> bool {
        self.elapsed_ms >= self.min_ms
    }

    pub fn reached_maximum(&self) -> bool {
        self.elapsed_ms >= self.max_ms
    }
}

/// Measures how long the current recording has been running
#[derive(Debug, Default, Clone)]
pub struct RecordingTimer {
    started_at: Option<Instant>,
}

impl RecordingTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, now: Instant) {
        self.started_at = Some(now);
    }

    pub fn stop(&mut self) {
        self.started_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Milliseconds since start, or 0 when stopped
    pub fn elapsed_ms(&self, now: Instant) -> u64 {
        self.started_at
            .map(|start| now.saturating_duration_since(start).as_millis() as u64)
            .unwrap_or(0)
    }

    pub fn has_reached_minimum(&self, min_ms: u64, now: Instant) -> bool {
        self.is_running() && self.elapsed_ms(now) >= min_ms
    }

    pub fn has_reached_maximum(&self, max_ms: u64, now: Instant) -> bool {
        self.is_running() && self.elapsed_ms(now) >= max_ms
    }

    /// Current window, or `None` when no recording is running
    pub fn window(&self, now: Instant, min_ms: u64, max_ms: u64) -> Option<RecordingWindow> {
        let started_at = self.started_at?;
        Some(RecordingWindow {
            started_at,
            elapsed_ms: self.elapsed_ms(now),
            min_ms,
            max_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_elapsed_and_bounds() {
        let t0 = Instant::now();
        let mut timer = RecordingTimer::new();
        timer.start(t0);

        let t = t0 + Duration::from_millis(999);
        assert_eq!(timer.elapsed_ms(t), 999);
        assert!(!timer.has_reached_minimum(1000, t));

        let t = t0 + Duration::from_millis(1000);
        assert!(timer.has_reached_minimum(1000, t));
        assert!(!timer.has_reached_maximum(30_000, t));
        assert!(timer.has_reached_maximum(30_000, t0 + Duration::from_secs(30)));
    }

    #[test]
    fn test_stopped_timer_reports_nothing() {
        let t0 = Instant::now();
        let mut timer = RecordingTimer::new();
        timer.start(t0);
        timer.stop();

        let later = t0 + Duration::from_secs(60);
        assert_eq!(timer.elapsed_ms(later), 0);
        assert!(!timer.has_reached_minimum(0, later));
        assert!(!timer.has_reached_maximum(0, later));
        assert!(timer.window(later, 1000, 30_000).is_none());
    }

    #[test]
    fn test_window_carries_bounds() {
        let t0 = Instant::now();
        let mut timer = RecordingTimer::new();
        timer.start(t0);

        let window = timer.window(t0 + Duration::from_millis(1500), 1000, 30_000).unwrap();
        assert_eq!(window.started_at, t0);
        assert_eq!(window.elapsed_ms, 1500);
        assert!(window.reached_minimum());
        assert!(!window.reached_maximum());
    }
}
