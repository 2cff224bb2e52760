//! Restartable one-shot timers for the motion logic.
//!
//! Built on `tokio::time::Instant` so tests can drive them with a paused clock.

use tokio::time::{Duration, Instant};

/// A timer that is either stopped or counting towards `timeout_duration`.
#[derive(Debug, Clone)]
pub struct Timer {
    timer_active: bool,
    timeout_duration: Duration,
    start_time: Instant,
}

/// Creates a stopped timer
pub fn new(timeout_duration: Duration) -> Timer {
    Timer {
        timer_active: false,
        timeout_duration,
        start_time: Instant::now(),
    }
}

impl Timer {
    /// (Re)starts the timer from now
    pub fn timer_start(&mut self) {
        self.timer_active = true;
        self.start_time = Instant::now();
    }

    #[allow(missing_docs)]
    pub fn timer_stop(&mut self) {
        self.timer_active = false;
    }

    /// Whether the timer is running and its duration has passed
    pub fn timer_timeouted(&self) -> bool {
        self.timer_active && self.start_time.elapsed() >= self.timeout_duration
    }

    #[allow(missing_docs)]
    pub fn is_active(&self) -> bool {
        self.timer_active
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_only_while_active() {
        let mut t = new(Duration::from_secs(3));
        assert!(!t.timer_timeouted());

        t.timer_start();
        tokio::time::advance(Duration::from_millis(2900)).await;
        assert!(!t.timer_timeouted());
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(t.timer_timeouted());

        t.timer_stop();
        assert!(!t.timer_timeouted());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_pushes_deadline() {
        let mut t = new(Duration::from_secs(1));
        t.timer_start();
        tokio::time::advance(Duration::from_millis(900)).await;
        t.timer_start();
        tokio::time::advance(Duration::from_millis(900)).await;
        assert!(!t.timer_timeouted());
    }
}
