//! Playback clock and fast-forward ramp

/// Tick clock owned by the player.
///
/// `host_tick` counts simulation ticks elapsed since the demo was opened. The
/// playback tick is measured from `start_tick`, which is re-anchored by every
/// resync record and moved while skipping.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    tick_interval: f32,
    host_tick: i32,
    tick_remainder: f32,
    start_tick: i32,
    previous_tick: i32,
    timescale: f32,
    max_timescale: f32,
    paused: bool,
    auto_resume_at: Option<f64>,
    skip_target: Option<i32>,
}

impl PlaybackClock {
    pub fn new(tick_interval: f32, max_timescale: f32) -> Self {
        Self {
            tick_interval: tick_interval.max(f32::EPSILON),
            host_tick: 0,
            tick_remainder: 0.0,
            start_tick: 0,
            previous_tick: 0,
            timescale: 1.0,
            max_timescale: max_timescale.max(0.0),
            paused: false,
            auto_resume_at: None,
            skip_target: None,
        }
    }

    /// Reset everything but the tick interval and timescale limit
    pub fn reset(&mut self) {
        *self = Self::new(self.tick_interval, self.max_timescale);
    }

    pub fn tick_interval(&self) -> f32 {
        self.tick_interval
    }

    pub fn set_tick_interval(&mut self, interval: f32) {
        self.tick_interval = interval.max(f32::EPSILON);
    }

    /// Advance by `frame_time` seconds scaled by the timescale.
    ///
    /// Returns the number of whole ticks that elapsed. A paused clock does
    /// not move unless a skip is in progress.
    pub fn advance(&mut self, frame_time: f32) -> i32 {
        if self.paused && self.skip_target.is_none() {
            return 0;
        }
        self.tick_remainder += frame_time.max(0.0) * self.timescale;
        let ticks = (self.tick_remainder / self.tick_interval).floor() as i32;
        self.tick_remainder -= ticks as f32 * self.tick_interval;
        self.host_tick += ticks;
        ticks
    }

    /// Advance by exactly one tick, used by time-demo playback
    pub fn step(&mut self) {
        self.host_tick += 1;
        self.tick_remainder = 0.0;
    }

    pub fn host_tick(&self) -> i32 {
        self.host_tick
    }

    /// Seconds of the current tick that have already elapsed
    pub fn tick_remainder(&self) -> f32 {
        self.tick_remainder
    }

    pub fn playback_tick(&self) -> i32 {
        self.host_tick - self.start_tick
    }

    pub fn previous_tick(&self) -> i32 {
        self.previous_tick
    }

    /// Re-anchor tick zero to now
    pub fn resync(&mut self) {
        self.start_tick = self.host_tick;
        self.previous_tick = self.start_tick;
        self.tick_remainder = 0.0;
    }

    /// Move the origin so the playback tick reads `tick`
    pub fn jump_to(&mut self, tick: i32) {
        self.previous_tick = self.playback_tick();
        self.start_tick = self.host_tick - tick;
    }

    pub fn timescale(&self) -> f32 {
        self.timescale
    }

    /// Clamped to `[0, max_timescale]`
    pub fn set_timescale(&mut self, timescale: f32) {
        self.timescale = if timescale.is_finite() {
            timescale.clamp(0.0, self.max_timescale)
        } else {
            1.0
        };
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self, auto_resume_at: Option<f64>) {
        self.paused = true;
        self.auto_resume_at = auto_resume_at;
    }

    pub fn resume(&mut self) {
        self.paused = false;
        self.auto_resume_at = None;
    }

    /// Resume if the auto-resume deadline has passed. Returns true if resumed.
    pub fn check_auto_resume(&mut self, now: f64) -> bool {
        match self.auto_resume_at {
            Some(deadline) if self.paused && now >= deadline => {
                self.resume();
                true
            }
            _ => false,
        }
    }

    pub fn skip_target(&self) -> Option<i32> {
        self.skip_target
    }

    pub fn set_skip_target(&mut self, target: Option<i32>) {
        self.skip_target = target;
    }

    pub fn is_skipping(&self) -> bool {
        self.skip_target.is_some()
    }
}

/// Linear timescale ramp applied while fast-forward is held
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FastForwardRamp {
    pub start_speed: f32,
    pub final_speed: f32,
    /// Seconds to reach `final_speed`
    pub ramp_time: f32,
    elapsed: f32,
    /// Timescale to restore on release
    restore_timescale: f32,
}

impl FastForwardRamp {
    pub fn new(start_speed: f32, final_speed: f32, ramp_time: f32, restore_timescale: f32) -> Self {
        Self {
            start_speed,
            final_speed,
            ramp_time,
            elapsed: 0.0,
            restore_timescale,
        }
    }

    /// Advance by real (unscaled) seconds and return the new speed
    pub fn advance(&mut self, real_seconds: f32) -> f32 {
        self.elapsed += real_seconds.max(0.0);
        self.speed()
    }

    pub fn speed(&self) -> f32 {
        let fraction = if self.ramp_time > 0.0 {
            (self.elapsed / self.ramp_time).clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.start_speed + (self.final_speed - self.start_speed) * fraction
    }

    pub fn restore_timescale(&self) -> f32 {
        self.restore_timescale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: f32 = 1.0 / 64.0;

    #[test]
    fn test_advance_accumulates_remainder() {
        let mut clock = PlaybackClock::new(INTERVAL, 100.0);
        assert_eq!(clock.advance(INTERVAL * 0.5), 0);
        assert_eq!(clock.advance(INTERVAL * 0.75), 1);
        assert!((clock.tick_remainder() - INTERVAL * 0.25).abs() < 1e-6);
        assert_eq!(clock.playback_tick(), 1);
    }

    #[test]
    fn test_timescale_scales_advance() {
        let mut clock = PlaybackClock::new(INTERVAL, 100.0);
        clock.set_timescale(4.0);
        assert_eq!(clock.advance(INTERVAL), 4);
    }

    #[test]
    fn test_timescale_clamped() {
        let mut clock = PlaybackClock::new(INTERVAL, 100.0);
        clock.set_timescale(500.0);
        assert_eq!(clock.timescale(), 100.0);
        clock.set_timescale(-1.0);
        assert_eq!(clock.timescale(), 0.0);
        clock.set_timescale(f32::NAN);
        assert_eq!(clock.timescale(), 1.0);
    }

    #[test]
    fn test_resync_and_jump() {
        let mut clock = PlaybackClock::new(INTERVAL, 100.0);
        clock.advance(INTERVAL * 10.0);
        clock.resync();
        assert_eq!(clock.playback_tick(), 0);

        clock.jump_to(250);
        assert_eq!(clock.playback_tick(), 250);
        clock.advance(INTERVAL);
        assert_eq!(clock.playback_tick(), 251);
    }

    #[test]
    fn test_pause_freezes_unless_skipping() {
        let mut clock = PlaybackClock::new(INTERVAL, 100.0);
        clock.pause(None);
        assert_eq!(clock.advance(INTERVAL * 3.0), 0);
        clock.set_skip_target(Some(50));
        assert_eq!(clock.advance(INTERVAL * 3.0), 3);
    }

    #[test]
    fn test_auto_resume() {
        let mut clock = PlaybackClock::new(INTERVAL, 100.0);
        clock.pause(Some(10.0));
        assert!(!clock.check_auto_resume(9.5));
        assert!(clock.is_paused());
        assert!(clock.check_auto_resume(10.0));
        assert!(!clock.is_paused());
    }

    #[test]
    fn test_ramp_speed() {
        let mut ramp = FastForwardRamp::new(2.0, 20.0, 5.0, 1.0);
        assert_eq!(ramp.speed(), 2.0);
        assert!((ramp.advance(2.5) - 11.0).abs() < 1e-5);
        assert_eq!(ramp.advance(10.0), 20.0);
        assert_eq!(ramp.restore_timescale(), 1.0);
    }
}
