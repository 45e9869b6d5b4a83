use std::time::{Duration, Instant};

/// Minimum-interval frame gate.
///
/// A frame may render once at least `min_interval` has elapsed since the
/// previous rendered frame. Requests in between are rejected and the caller
/// simply asks again on its next wakeup.
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl FrameThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval, last: None }
    }

    /// Throttle for `fps` frames per second. Non-positive or non-finite rates
    /// disable throttling.
    pub fn from_fps(fps: f32) -> Self {
        let min_interval = if fps.is_finite() && fps > 0.0 {
            // `from_secs_f32` overshoots whole-millisecond intervals.
            Duration::from_nanos((1e9 / f64::from(fps)).round() as u64)
        } else {
            Duration::ZERO
        };
        Self::new(min_interval)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Returns `true` and records `now` as the last rendered frame if the
    /// interval has elapsed.
    pub fn ready(&mut self, now: Instant) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
        };
        if due {
            self.last = Some(now);
        }
        due
    }

    /// Earliest instant at which `ready` can succeed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.last.map(|last| last + self.min_interval)
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_frame_is_always_ready() {
        let mut t = FrameThrottle::from_fps(30.0);
        assert!(t.ready(Instant::now()));
    }

    #[test]
    fn frames_inside_the_interval_are_rejected() {
        let t0 = Instant::now();
        let mut t = FrameThrottle::new(ms(33));
        assert!(t.ready(t0));
        assert!(!t.ready(t0 + ms(10)));
        assert!(!t.ready(t0 + ms(32)));
        assert!(t.ready(t0 + ms(33)));
        // Measured from the last rendered frame, not the last request.
        assert!(!t.ready(t0 + ms(60)));
        assert!(t.ready(t0 + ms(66)));
    }

    #[test]
    fn fps_interval_is_exact_for_whole_milliseconds() {
        assert_eq!(FrameThrottle::from_fps(10.0).min_interval(), ms(100));
        assert_eq!(FrameThrottle::from_fps(50.0).min_interval(), ms(20));
        let t0 = Instant::now();
        let mut t = FrameThrottle::from_fps(10.0);
        assert!(t.ready(t0));
        assert!(t.ready(t0 + ms(100)));
    }

    #[test]
    fn zero_fps_disables_throttling() {
        let t0 = Instant::now();
        let mut t = FrameThrottle::from_fps(0.0);
        assert!(t.ready(t0));
        assert!(t.ready(t0));
    }

    #[test]
    fn reset_forgets_the_last_frame() {
        let t0 = Instant::now();
        let mut t = FrameThrottle::new(ms(100));
        assert!(t.ready(t0));
        t.reset();
        assert!(t.ready(t0 + ms(1)));
        assert_eq!(t.next_deadline(), Some(t0 + ms(101)));
    }
}
