//! Strictly increasing timestamps for video-mode inference.

/// Tracks the last timestamp handed to the current backend instance.
///
/// When wall-clock time has not advanced (or went backwards), the next
/// timestamp is `last + 1`.
#[derive(Debug, Default, Clone)]
pub struct MonotonicClock {
    last_ms: i64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, wall_ms: i64) -> i64 {
        let ts = if wall_ms > self.last_ms {
            wall_ms
        } else {
            self.last_ms + 1
        };
        self.last_ms = ts;
        ts
    }

    /// Called whenever the backend is swapped; a fresh backend has seen no timestamps.
    pub fn reset(&mut self) {
        self.last_ms = 0;
    }

    pub fn last(&self) -> i64 {
        self.last_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strictly_increasing_for_any_wall_sequence() {
        let mut clock = MonotonicClock::new();
        let wall = [0, 0, 5, 5, 5, 3, 100, 99, 100, 101, -4];
        let mut previous = i64::MIN;
        for w in wall {
            let ts = clock.next(w);
            assert!(ts > previous, "{} should exceed {}", ts, previous);
            previous = ts;
        }
    }

    #[test]
    fn test_repeat_uses_one_tick() {
        let mut clock = MonotonicClock::new();
        assert_eq!(clock.next(40), 40);
        assert_eq!(clock.next(40), 41);
        assert_eq!(clock.next(41), 42);
        assert_eq!(clock.next(90), 90);
    }

    #[test]
    fn test_reset_returns_to_zero() {
        let mut clock = MonotonicClock::new();
        clock.next(500);
        clock.reset();
        assert_eq!(clock.last(), 0);
        assert_eq!(clock.next(10), 10);
    }
}
