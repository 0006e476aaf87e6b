use std::time::{Duration, Instant};

use log::warn;

/// Tracks how many frames are due relative to a wall clock time base.
#[derive(Debug, Clone)]
pub struct FramePacer {
    base: Instant,
    frame_counter: i64,
    refresh_rate: f64,
    max_drift: i64,
}

impl FramePacer {
    #[must_use]
    pub fn new(now: Instant, refresh_rate: f64, max_drift: i64) -> Self {
        Self {
            base: now,
            frame_counter: 0,
            refresh_rate,
            max_drift,
        }
    }

    pub fn set_refresh_rate(&mut self, now: Instant, refresh_rate: f64) {
        if refresh_rate != self.refresh_rate {
            self.refresh_rate = refresh_rate;
            self.resync(now);
        }
    }

    #[must_use]
    pub fn refresh_rate(&self) -> f64 {
        self.refresh_rate
    }

    #[must_use]
    pub fn frame_counter(&self) -> i64 {
        self.frame_counter
    }

    pub fn resync(&mut self, now: Instant) {
        self.base = now;
        self.frame_counter = 0;
    }

    /// Frames that should have been computed by `now` but weren't. Negative when
    /// the emulation is ahead.
    #[must_use]
    pub fn missing_frames(&self, now: Instant) -> i64 {
        let elapsed = now.saturating_duration_since(self.base).as_secs_f64();
        (elapsed * self.refresh_rate) as i64 - self.frame_counter
    }

    /// Frames to compute now. Resynchronizes the time base and returns 0 when
    /// the emulation drifted too far from real time.
    pub fn due_frames(&mut self, now: Instant) -> i64 {
        let missing = self.missing_frames(now);
        if missing.abs() <= self.max_drift {
            return missing.max(0);
        }
        if missing > 0 {
            warn!("Emulation is way too slow ({} frames behind)", missing);
        } else {
            warn!("Emulation is way too fast ({} frames ahead)", -missing);
        }
        self.resync(now);
        0
    }

    pub fn frame_done(&mut self) {
        self.frame_counter += 1;
    }

    /// Time at which the next frame becomes due.
    #[must_use]
    pub fn next_wakeup(&self) -> Instant {
        let secs = (self.frame_counter + 1) as f64 / self.refresh_rate;
        self.base + Duration::from_secs_f64(secs.max(0.))
    }
}

/// Smoothed load and frame rate of the emulator thread.
#[derive(Debug, Clone)]
pub struct Stats {
    cpu_load: f64,
    fps: f64,
    iterations: u32,
    frames: u32,
    busy: Duration,
    window_start: Instant,
}

impl Stats {
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            cpu_load: 0.,
            fps: 0.,
            iterations: 0,
            frames: 0,
            busy: Duration::ZERO,
            window_start: now,
        }
    }

    pub fn add_busy(&mut self, busy: Duration, frames: u32) {
        self.busy += busy;
        self.frames += frames;
    }

    /// Counts one loop iteration and blends in a new sample every `interval`
    /// iterations.
    pub fn tick(&mut self, now: Instant, interval: u32) {
        self.iterations += 1;
        if self.iterations < interval.max(1) {
            return;
        }

        let total = now.saturating_duration_since(self.window_start).as_secs_f64();
        if total > 0. {
            let used = self.busy.as_secs_f64();
            self.cpu_load = 0.3 * self.cpu_load + 0.7 * (used / total);
            self.fps = 0.3 * self.fps + 0.7 * (f64::from(self.frames) / total);
        }

        self.iterations = 0;
        self.frames = 0;
        self.busy = Duration::ZERO;
        self.window_start = now;
    }

    #[must_use]
    pub fn cpu_load(&self) -> f64 {
        self.cpu_load
    }

    #[must_use]
    pub fn fps(&self) -> f64 {
        self.fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn frames_become_due_with_time() {
        let t0 = Instant::now();
        let mut pacer = FramePacer::new(t0, 50., 5);

        assert_eq!(pacer.missing_frames(t0), 0);
        assert_eq!(pacer.missing_frames(t0 + ms(20)), 1);
        assert_eq!(pacer.missing_frames(t0 + ms(70)), 3);

        pacer.frame_done();
        assert_eq!(pacer.missing_frames(t0 + ms(70)), 2);
        assert_eq!(pacer.next_wakeup(), t0 + ms(40));
    }

    #[test]
    fn emulation_ahead_computes_nothing() {
        let t0 = Instant::now();
        let mut pacer = FramePacer::new(t0, 50., 5);
        for _ in 0..3 {
            pacer.frame_done();
        }
        assert_eq!(pacer.missing_frames(t0 + ms(10)), -3);
        assert_eq!(pacer.due_frames(t0 + ms(10)), 0);
        assert_eq!(pacer.frame_counter(), 3);
    }

    #[test]
    fn large_drift_resyncs() {
        let t0 = Instant::now();
        let mut pacer = FramePacer::new(t0, 50., 5);

        assert_eq!(pacer.due_frames(t0 + ms(100)), 5);
        assert_eq!(pacer.due_frames(t0 + ms(1000)), 0);
        assert_eq!(pacer.frame_counter(), 0);
        assert_eq!(pacer.missing_frames(t0 + ms(1000)), 0);
    }

    #[test]
    fn stats_blend_samples() {
        let t0 = Instant::now();
        let mut stats = Stats::new(t0);

        stats.add_busy(ms(500), 25);
        stats.tick(t0 + ms(1000), 1);
        assert_relative_eq!(stats.cpu_load(), 0.35, epsilon = 1e-9);
        assert_relative_eq!(stats.fps(), 17.5, epsilon = 1e-9);

        stats.add_busy(ms(500), 25);
        stats.tick(t0 + ms(2000), 1);
        assert_relative_eq!(stats.cpu_load(), 0.3 * 0.35 + 0.35, epsilon = 1e-9);
        assert_relative_eq!(stats.fps(), 0.3 * 17.5 + 17.5, epsilon = 1e-9);
    }

    #[test]
    fn stats_wait_for_interval() {
        let t0 = Instant::now();
        let mut stats = Stats::new(t0);
        stats.add_busy(ms(100), 5);
        for i in 1..32 {
            stats.tick(t0 + ms(i), 32);
        }
        assert_relative_eq!(stats.fps(), 0.);
        stats.tick(t0 + ms(100), 32);
        assert_relative_eq!(stats.cpu_load(), 0.7, epsilon = 1e-9);
    }
}
