//! Frame timing

use std::time::{Duration, Instant};

/// Longest delta handed to the game; stalls (window drags, breakpoints) are clamped
const MAX_DELTA: Duration = Duration::from_millis(250);

/// Wall-clock time since startup and since the previous frame
#[derive(Debug, Clone)]
pub struct Time {
    start: Instant,
    last_frame: Instant,
    delta: Duration,
    frame_count: u64,
}

impl Time {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            delta: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Advance to the current instant
    pub fn update(&mut self) {
        self.advance_to(Instant::now());
    }

    fn advance_to(&mut self, now: Instant) {
        self.delta = now.saturating_duration_since(self.last_frame).min(MAX_DELTA);
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Time since the previous frame
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Time since the previous frame in seconds
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Seconds since startup
    pub fn elapsed_seconds(&self) -> f32 {
        self.last_frame.duration_since(self.start).as_secs_f32()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_tracks_frames() {
        let mut time = Time::new();
        let start = time.last_frame;

        time.advance_to(start + Duration::from_millis(16));
        assert_eq!(time.delta(), Duration::from_millis(16));
        assert_eq!(time.frame_count(), 1);

        time.advance_to(start + Duration::from_millis(48));
        assert_eq!(time.delta(), Duration::from_millis(32));
        assert!((time.elapsed_seconds() - 0.048).abs() < 1e-4);
    }

    #[test]
    fn test_long_stall_is_clamped() {
        let mut time = Time::new();
        let start = time.last_frame;
        time.advance_to(start + Duration::from_secs(5));
        assert_eq!(time.delta(), MAX_DELTA);
    }
}
