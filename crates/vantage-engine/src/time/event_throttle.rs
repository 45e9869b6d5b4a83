use std::time::{Duration, Instant};

/// Time-window throttle for an outgoing value stream.
///
/// The first value after a quiet window is sent immediately. Values arriving
/// inside the window replace each other; only the latest is kept and is
/// released by `poll` once the window has elapsed. Intermediate values are
/// dropped.
#[derive(Debug, Clone)]
pub struct EventThrottle<T> {
    delay: Duration,
    last_sent: Option<Instant>,
    pending: Option<T>,
}

impl<T> EventThrottle<T> {
    pub fn new(delay: Duration) -> Self {
        Self { delay, last_sent: None, pending: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    fn window_open(&self, now: Instant) -> bool {
        match self.last_sent {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.delay,
        }
    }

    /// Offers a value. Returns it if it may be sent right away, otherwise
    /// keeps it as the pending trailing value.
    pub fn push(&mut self, now: Instant, value: T) -> Option<T> {
        if self.window_open(now) {
            self.last_sent = Some(now);
            self.pending = None;
            Some(value)
        } else {
            self.pending = Some(value);
            None
        }
    }

    /// Releases the pending value once its window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        if self.pending.is_some() && self.window_open(now) {
            self.last_sent = Some(now);
            self.pending.take()
        } else {
            None
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Instant at which a pending value becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (&self.pending, self.last_sent) {
            (Some(_), Some(last)) => Some(last + self.delay),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    // ── leading edge ──────────────────────────────────────────────────────

    #[test]
    fn first_value_passes_through() {
        let mut t = EventThrottle::new(ms(30));
        assert_eq!(t.push(Instant::now(), 1), Some(1));
        assert!(!t.has_pending());
    }

    #[test]
    fn zero_delay_never_holds_values() {
        let t0 = Instant::now();
        let mut t = EventThrottle::new(Duration::ZERO);
        assert_eq!(t.push(t0, "a"), Some("a"));
        assert_eq!(t.push(t0, "b"), Some("b"));
    }

    // ── trailing edge ─────────────────────────────────────────────────────

    #[test]
    fn only_the_latest_value_in_a_window_is_sent() {
        let t0 = Instant::now();
        let mut t = EventThrottle::new(ms(30));
        assert_eq!(t.push(t0, 1), Some(1));
        assert_eq!(t.push(t0 + ms(5), 2), None);
        assert_eq!(t.push(t0 + ms(10), 3), None);
        assert_eq!(t.poll(t0 + ms(20)), None);
        assert_eq!(t.next_deadline(), Some(t0 + ms(30)));
        assert_eq!(t.poll(t0 + ms(30)), Some(3));
        assert_eq!(t.poll(t0 + ms(90)), None);
    }

    #[test]
    fn trailing_send_restarts_the_window() {
        let t0 = Instant::now();
        let mut t = EventThrottle::new(ms(30));
        t.push(t0, 1);
        t.push(t0 + ms(1), 2);
        assert_eq!(t.poll(t0 + ms(31)), Some(2));
        assert_eq!(t.push(t0 + ms(40), 3), None);
        assert_eq!(t.poll(t0 + ms(61)), Some(3));
    }
}
