//! Single-shot flush timer

use std::time::Duration;

use tokio::time::Instant;

/// Phase of the flush timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerPhase {
    Disabled,
    /// A flush is scheduled at the deadline
    Armed(Instant),
}

/// Single-shot timer that is replaced, never repeated
///
/// Arming an armed timer moves its deadline. Nothing fires again after a
/// flush until the timer is armed anew.
#[derive(Debug)]
pub(crate) struct FlushTimer {
    phase: TimerPhase,
}

impl FlushTimer {
    pub fn disabled() -> Self {
        Self {
            phase: TimerPhase::Disabled,
        }
    }

    /// Schedule the flush `delay` from now, replacing any earlier schedule
    pub fn arm(&mut self, delay: Duration) {
        self.phase = TimerPhase::Armed(Instant::now() + delay);
    }

    pub fn disable(&mut self) {
        self.phase = TimerPhase::Disabled;
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.phase, TimerPhase::Armed(_))
    }

    /// Wait for the deadline; never completes while disabled
    pub async fn expired(&self) {
        match self.phase {
            TimerPhase::Armed(deadline) => tokio::time::sleep_until(deadline).await,
            TimerPhase::Disabled => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_disabled() {
        let timer = FlushTimer::disabled();
        assert_eq!(timer.phase(), TimerPhase::Disabled);
        assert!(!timer.is_armed());
    }

    #[tokio::test]
    async fn test_rearm_replaces_deadline() {
        let mut timer = FlushTimer::disabled();
        timer.arm(Duration::from_secs(60));
        let TimerPhase::Armed(first) = timer.phase() else {
            panic!("timer should be armed");
        };

        timer.arm(Duration::ZERO);
        let TimerPhase::Armed(second) = timer.phase() else {
            panic!("timer should be armed");
        };
        assert!(second < first);

        let fired = tokio::time::timeout(Duration::from_millis(100), timer.expired()).await;
        assert!(fired.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_never_fires() {
        let mut timer = FlushTimer::disabled();
        timer.arm(Duration::ZERO);
        timer.disable();

        let fired = tokio::time::timeout(Duration::from_millis(50), timer.expired()).await;
        assert!(fired.is_err());
    }
}
