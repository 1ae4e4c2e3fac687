//! Millisecond countdown timer.
//!
//! Single-shot with explicit start/stop/pause/resume, clocked by the caller
//! with an elapsed wall-clock delta rather than sampling a clock itself —
//! this keeps pause/resume trivially correct (§9 "Cooperative clock
//! plumbing" design note): the Host owns one monotonic clock and samples it
//! once per tick, passing the delta to every timer and state machine that
//! needs it.

/// A single-shot countdown timer, clocked in milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    timeout_ms: u64,
    elapsed_ms: u64,
    running: bool,
    paused: bool,
}

impl Timer {
    /// Create a stopped timer with the given default timeout.
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            elapsed_ms: 0,
            running: false,
            paused: false,
        }
    }

    /// Start (or restart) the timer at its configured default timeout.
    pub fn start_default(&mut self) {
        self.elapsed_ms = 0;
        self.running = true;
        self.paused = false;
    }

    /// Start (or restart) the timer with an explicit timeout, overriding the
    /// configured default for this run.
    pub fn start(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
        self.elapsed_ms = 0;
        self.running = true;
        self.paused = false;
    }

    /// Stop the timer outright; `is_running()` becomes false and the
    /// elapsed count resets.
    pub fn stop(&mut self) {
        self.running = false;
        self.paused = false;
        self.elapsed_ms = 0;
    }

    /// Pause the timer, freezing its elapsed count without resetting it.
    /// A no-op if the timer isn't running.
    pub fn pause(&mut self) {
        if self.running {
            self.paused = true;
        }
    }

    /// Resume a paused timer from exactly the elapsed value it had when
    /// paused — not a restart.
    pub fn resume(&mut self) {
        if self.running {
            self.paused = false;
        }
    }

    /// Advance the timer by `delta_ms`. A no-op when stopped or paused.
    pub fn clock(&mut self, delta_ms: u64) {
        if self.running && !self.paused {
            self.elapsed_ms = self.elapsed_ms.saturating_add(delta_ms);
        }
    }

    /// True if the timer was started and hasn't been stopped.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// True if the timer is running but currently paused.
    pub fn is_paused(&self) -> bool {
        self.running && self.paused
    }

    /// True once the elapsed time has reached the configured timeout.
    pub fn has_expired(&self) -> bool {
        self.running && self.elapsed_ms >= self.timeout_ms
    }

    /// Milliseconds elapsed since start (or since the last pause).
    pub fn elapsed(&self) -> u64 {
        self.elapsed_ms
    }

    /// The configured timeout in milliseconds.
    pub fn timeout(&self) -> u64 {
        self.timeout_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_clock_expiry_boundary() {
        let mut t = Timer::new(100);
        t.start_default();
        t.clock(100);
        assert!(t.has_expired());
    }

    #[test]
    fn one_ms_short_of_expiry_is_not_expired() {
        let mut t = Timer::new(100);
        t.start_default();
        t.clock(99);
        assert!(!t.has_expired());
    }

    #[test]
    fn stopped_timer_never_expires() {
        let mut t = Timer::new(100);
        t.clock(1000);
        assert!(!t.has_expired());
        assert!(!t.is_running());
    }

    #[test]
    fn pause_freezes_elapsed_resume_continues() {
        let mut t = Timer::new(100);
        t.start_default();
        t.clock(50);
        t.pause();
        t.clock(1000); // ignored while paused
        assert_eq!(t.elapsed(), 50);
        assert!(!t.has_expired());
        t.resume();
        t.clock(50);
        assert!(t.has_expired());
    }

    #[test]
    fn stop_resets_elapsed() {
        let mut t = Timer::new(100);
        t.start_default();
        t.clock(50);
        t.stop();
        assert_eq!(t.elapsed(), 0);
        assert!(!t.is_running());
    }

    #[test]
    fn start_with_explicit_timeout_overrides_default() {
        let mut t = Timer::new(100);
        t.start(50);
        t.clock(50);
        assert!(t.has_expired());
    }
}
