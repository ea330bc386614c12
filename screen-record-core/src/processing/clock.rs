use std::time::{Duration, Instant};

/// Monotonic session clock shared by all tasks of a recording, so that
/// video and audio presentation times share one origin.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    pub fn now_us(&self) -> i64 {
        self.origin.elapsed().as_micros() as i64
    }

    pub fn now_ns(&self) -> i64 {
        self.origin.elapsed().as_nanos() as i64
    }
}

/// Clamp presentation times so a track never goes backwards.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicPts {
    last_us: Option<i64>,
}

impl MonotonicPts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, pts_us: i64) -> i64 {
        let pts = match self.last_us {
            Some(last) if pts_us < last => {
                log::trace!("clamping pts {} to {}", pts_us, last);
                last
            }
            _ => pts_us,
        };
        self.last_us = Some(pts);
        pts
    }

    pub fn last(&self) -> Option<i64> {
        self.last_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advances() {
        let clock = SessionClock::start();
        let first = clock.now_us();
        std::thread::sleep(Duration::from_millis(2));
        assert!(clock.now_us() > first);
    }

    #[test]
    fn pts_never_decreases() {
        let mut pts = MonotonicPts::new();
        assert_eq!(pts.next(100), 100);
        assert_eq!(pts.next(90), 100);
        assert_eq!(pts.next(100), 100);
        assert_eq!(pts.next(150), 150);
        assert_eq!(pts.last(), Some(150));
    }
}
