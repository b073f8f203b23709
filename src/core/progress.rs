//! Progress of the current burst of image requests.

/// Value reported while no requests are outstanding.
pub const IDLE_PROGRESS: f64 = -1.0;

/// Counts requested vs completed images for the current burst.
///
/// A burst starts with the first request after idle and ends as soon as every
/// requested image has completed, at which point both counters reset.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProgressTracker {
    requested: usize,
    completed: usize,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// One more image was sent towards the renderer.
    pub fn issue(&mut self) {
        self.requested += 1;
    }

    /// Accounts for `n` images that will be issued later (report runs).
    pub fn reserve(&mut self, n: usize) {
        self.requested += n;
        self.settle();
    }

    /// Withdraws reserved images that will never be issued.
    pub fn release(&mut self, n: usize) {
        self.requested = self.requested.saturating_sub(n);
        self.settle();
    }

    pub fn complete(&mut self) {
        if self.requested > self.completed {
            self.completed += 1;
        }
        self.settle();
    }

    pub fn is_idle(&self) -> bool {
        self.requested == 0
    }

    pub fn progress(&self) -> f64 {
        if self.is_idle() {
            IDLE_PROGRESS
        } else {
            self.completed as f64 / self.requested as f64
        }
    }

    fn settle(&mut self) {
        if self.completed >= self.requested {
            self.requested = 0;
            self.completed = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_reports_negative() {
        let tracker = ProgressTracker::new();
        assert!(tracker.is_idle());
        assert_eq!(tracker.progress(), IDLE_PROGRESS);
    }

    #[test]
    fn burst_progresses_and_resets() {
        let mut tracker = ProgressTracker::new();
        tracker.issue();
        tracker.issue();
        tracker.issue();
        tracker.issue();
        assert_eq!(tracker.progress(), 0.0);
        tracker.complete();
        assert_eq!(tracker.progress(), 0.25);
        tracker.complete();
        tracker.complete();
        assert_eq!(tracker.progress(), 0.75);
        tracker.complete();
        assert!(tracker.is_idle());
        assert_eq!(tracker.progress(), IDLE_PROGRESS);
    }

    #[test]
    fn reservations_count_towards_total() {
        let mut tracker = ProgressTracker::new();
        tracker.reserve(4);
        tracker.complete();
        assert_eq!(tracker.progress(), 0.25);
        // two of the remaining three are withdrawn
        tracker.release(2);
        assert_eq!(tracker.progress(), 0.5);
        tracker.complete();
        assert!(tracker.is_idle());
    }

    #[test]
    fn stray_completion_keeps_idle() {
        let mut tracker = ProgressTracker::new();
        tracker.complete();
        assert!(tracker.is_idle());
        tracker.reserve(0);
        assert!(tracker.is_idle());
    }
}
