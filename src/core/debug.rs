//! Frame statistics and the periodic status line

use std::collections::VecDeque;
use std::time::Duration;

use crate::renderer::FrameReport;

/// Rolling frame-time statistics
#[derive(Debug)]
pub struct FrameStats {
    /// Frame time history for averaging
    frame_times: VecDeque<Duration>,
    /// Maximum samples to keep
    max_samples: usize,
    /// FPS over the sample window
    fps: f32,
    /// Average frame time in milliseconds
    avg_frame_time_ms: f32,
    /// Shortest frame in the window, milliseconds
    min_frame_time_ms: f32,
    /// Longest frame in the window, milliseconds
    max_frame_time_ms: f32,
    /// Frames recorded since startup
    total_frames: u64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self {
            frame_times: VecDeque::with_capacity(120),
            max_samples: 120,
            fps: 0.0,
            avg_frame_time_ms: 0.0,
            min_frame_time_ms: 0.0,
            max_frame_time_ms: 0.0,
            total_frames: 0,
        }
    }

    /// Record a frame with the given delta time
    pub fn record_frame(&mut self, delta: Duration) {
        self.total_frames += 1;

        if self.frame_times.len() >= self.max_samples {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(delta);

        self.update_stats();
    }

    fn update_stats(&mut self) {
        if self.frame_times.is_empty() {
            return;
        }

        let mut total = Duration::ZERO;
        let mut min = Duration::MAX;
        let mut max = Duration::ZERO;

        for &dt in &self.frame_times {
            total += dt;
            min = min.min(dt);
            max = max.max(dt);
        }

        let count = self.frame_times.len() as f32;
        let total_secs = total.as_secs_f32();

        if total_secs > 0.0 {
            self.avg_frame_time_ms = (total_secs / count) * 1000.0;
            self.fps = count / total_secs;
        } else {
            self.avg_frame_time_ms = 0.0;
            self.fps = 0.0;
        }

        self.min_frame_time_ms = min.as_secs_f32() * 1000.0;
        self.max_frame_time_ms = max.as_secs_f32() * 1000.0;
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn avg_frame_time_ms(&self) -> f32 {
        self.avg_frame_time_ms
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn format_stats(&self) -> String {
        format!(
            "FPS: {:.1} | Frame: {:.2}ms (min: {:.2}, max: {:.2})",
            self.fps, self.avg_frame_time_ms, self.min_frame_time_ms, self.max_frame_time_ms
        )
    }
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame stats plus the last frame's pass report, logged on an interval
#[derive(Debug)]
pub struct DebugInfo {
    /// Rolling frame timing
    pub frame_stats: FrameStats,
    /// Time between status lines
    log_interval: Duration,
    since_last_log: Duration,
    /// Most recent renderer report
    last_report: Option<FrameReport>,
}

impl DebugInfo {
    /// A zero interval disables the status line
    pub fn new(log_interval: Duration) -> Self {
        Self {
            frame_stats: FrameStats::new(),
            log_interval,
            since_last_log: Duration::ZERO,
            last_report: None,
        }
    }

    pub fn record_frame(&mut self, delta: Duration) {
        self.frame_stats.record_frame(delta);
        self.since_last_log += delta;
    }

    pub fn set_report(&mut self, report: FrameReport) {
        self.last_report = Some(report);
    }

    pub fn last_report(&self) -> Option<&FrameReport> {
        self.last_report.as_ref()
    }

    /// The status line, once per elapsed interval
    pub fn take_status_line(&mut self) -> Option<String> {
        if self.log_interval.is_zero() || self.since_last_log < self.log_interval {
            return None;
        }
        self.since_last_log = Duration::ZERO;

        let stats = self.frame_stats.format_stats();
        Some(match &self.last_report {
            Some(report) => format!("{stats} | {}", report.summary()),
            None => stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::BufferId;

    #[test]
    fn test_stats_average_window() {
        let mut stats = FrameStats::new();
        stats.record_frame(Duration::from_millis(10));
        stats.record_frame(Duration::from_millis(30));
        assert_eq!(stats.total_frames(), 2);
        assert!((stats.avg_frame_time_ms() - 20.0).abs() < 1e-3);
        assert!((stats.fps() - 50.0).abs() < 1e-2);
        assert!(stats.format_stats().starts_with("FPS: 50.0"));
    }

    #[test]
    fn test_status_line_respects_interval() {
        let mut debug = DebugInfo::new(Duration::from_millis(750));
        debug.record_frame(Duration::from_millis(500));
        assert!(debug.take_status_line().is_none());

        debug.record_frame(Duration::from_millis(300));
        let line = debug.take_status_line().unwrap();
        assert!(line.starts_with("FPS:"));
        // interval restarts after logging
        assert!(debug.take_status_line().is_none());
    }

    #[test]
    fn test_status_line_carries_frame_report() {
        let mut debug = DebugInfo::new(Duration::from_millis(100));
        debug.set_report(FrameReport {
            skipped: false,
            resized: false,
            passes: 4,
            omni_lights: 0,
            omni_passes: 0,
            effects: 1,
            final_source: BufferId::PingPongA,
            draw_calls: 3,
        });
        debug.record_frame(Duration::from_millis(100));
        let line = debug.take_status_line().unwrap();
        assert!(line.contains(" | 4 passes"));
        assert!(line.contains("1 effects"));
    }

    #[test]
    fn test_zero_interval_never_logs() {
        let mut debug = DebugInfo::new(Duration::ZERO);
        debug.record_frame(Duration::from_secs(10));
        assert!(debug.take_status_line().is_none());
    }
}
