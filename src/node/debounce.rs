use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

/// Stability-window debouncer.
///
/// A level change is accepted only once the raw input has held the new level for the whole
/// interval; any change inside the window restarts it. Each accepted change yields exactly one
/// edge, so a held button fires once.
#[derive(Clone, Debug)]
pub struct Debouncer {
    interval: Duration,
    stable: bool,
    candidate: bool,
    since: Option<Instant>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stable: false,
            candidate: false,
            since: None,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.stable
    }

    pub fn update(&mut self, raw: bool, now: Instant) -> Option<Edge> {
        if raw != self.candidate || self.since.is_none() {
            self.candidate = raw;
            self.since = Some(now);
        }

        if self.candidate == self.stable {
            return None;
        }

        let since = self.since?;
        if now.duration_since(since) < self.interval {
            return None;
        }

        self.stable = self.candidate;
        Some(if self.stable {
            Edge::Pressed
        } else {
            Edge::Released
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn press_is_reported_after_stable_interval() {
        let mut debouncer = Debouncer::new(10 * MS);
        let t0 = Instant::now();
        assert_eq!(debouncer.update(true, t0), None);
        assert_eq!(debouncer.update(true, t0 + 5 * MS), None);
        assert_eq!(debouncer.update(true, t0 + 10 * MS), Some(Edge::Pressed));
        assert!(debouncer.is_pressed());
    }

    #[test]
    fn held_button_does_not_refire() {
        let mut debouncer = Debouncer::new(10 * MS);
        let t0 = Instant::now();
        debouncer.update(true, t0);
        assert_eq!(debouncer.update(true, t0 + 10 * MS), Some(Edge::Pressed));
        for n in 2..200 {
            assert_eq!(debouncer.update(true, t0 + n * 10 * MS), None);
        }
    }

    #[test]
    fn contact_bounce_is_suppressed() {
        let mut debouncer = Debouncer::new(10 * MS);
        let t0 = Instant::now();
        let bounce = [true, false, true, false, true, true];
        for (n, level) in bounce.iter().enumerate() {
            assert_eq!(debouncer.update(*level, t0 + (n as u32) * 2 * MS), None);
        }
        // Last change was at 8ms; stable from there.
        assert_eq!(debouncer.update(true, t0 + 17 * MS), None);
        assert_eq!(debouncer.update(true, t0 + 18 * MS), Some(Edge::Pressed));
    }

    #[test]
    fn release_then_press_fires_again() {
        let mut debouncer = Debouncer::new(10 * MS);
        let t0 = Instant::now();
        debouncer.update(true, t0);
        assert_eq!(debouncer.update(true, t0 + 10 * MS), Some(Edge::Pressed));
        debouncer.update(false, t0 + 20 * MS);
        assert_eq!(debouncer.update(false, t0 + 30 * MS), Some(Edge::Released));
        debouncer.update(true, t0 + 40 * MS);
        assert_eq!(debouncer.update(true, t0 + 50 * MS), Some(Edge::Pressed));
    }

    #[test]
    fn idle_input_never_fires() {
        let mut debouncer = Debouncer::new(10 * MS);
        let t0 = Instant::now();
        for n in 0..50 {
            assert_eq!(debouncer.update(false, t0 + n * MS), None);
        }
    }
}
