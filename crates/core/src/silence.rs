//! Debounced end-of-utterance detection.

use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// Fires once the transcript has been quiet for `timeout` after the last change.
///
/// The detector is only a deadline; it is polled from the session loop through
/// [`expired`](Self::expired), so dropping or disarming it can never leave a
/// timer behind.
#[derive(Debug)]
pub struct SilenceDetector {
    timeout: Duration,
    armed: bool,
    deadline: Option<Instant>,
}

impl SilenceDetector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            armed: false,
            deadline: None,
        }
    }

    /// Starts a listening session. The timer does not run until the first change.
    pub fn arm(&mut self) {
        self.armed = true;
        self.deadline = None;
    }

    /// Records a transcript change, restarting the quiet period.
    /// Returns `false` if the detector is not armed.
    pub fn touch(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        self.deadline = Some(Instant::now() + self.timeout);
        true
    }

    pub fn disarm(&mut self) {
        self.armed = false;
        self.deadline = None;
    }

    /// Resolves when the quiet period elapses, then disarms.
    /// Never resolves while no deadline is set.
    pub async fn expired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.disarm();
            }
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{advance, timeout};

    const QUIET: Duration = Duration::from_millis(1500);

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_quiet_period() {
        let mut detector = SilenceDetector::new(QUIET);
        detector.arm();
        assert!(detector.touch());

        let started = Instant::now();
        detector.expired().await;
        assert_eq!(started.elapsed(), QUIET);
        // Firing disarms until the next `arm`.
        assert!(!detector.touch());

        // Nothing left to fire.
        assert!(timeout(QUIET * 4, detector.expired()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn every_change_restarts_the_timer() {
        let mut detector = SilenceDetector::new(QUIET);
        detector.arm();
        detector.touch();
        for _ in 0..3 {
            advance(Duration::from_millis(1000)).await;
            detector.touch();
        }

        let started = Instant::now();
        detector.expired().await;
        assert_eq!(started.elapsed(), QUIET);
    }

    #[tokio::test(start_paused = true)]
    async fn disarming_cancels_the_pending_fire() {
        let mut detector = SilenceDetector::new(QUIET);
        detector.arm();
        detector.touch();
        advance(Duration::from_millis(500)).await;
        detector.disarm();

        assert!(timeout(QUIET * 2, detector.expired()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn changes_are_ignored_while_disarmed() {
        let mut detector = SilenceDetector::new(QUIET);
        assert!(!detector.touch());
        assert!(timeout(QUIET * 2, detector.expired()).await.is_err());
    }
}
