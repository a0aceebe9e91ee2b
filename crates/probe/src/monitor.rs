use std::time::Duration;

use chrono::{DateTime, Utc};
use inspection_models::{HealthPolicy, HealthStatus, ProbeOutcome};
use serde::{Deserialize, Serialize};

/// What the orchestrator would see: the current status, the counted failing
/// streak and the most recent check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub failing_streak: u32,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<ProbeOutcome>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            status: HealthStatus::Starting,
            failing_streak: 0,
            last_checked_at: None,
            last_outcome: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthStatus,
    pub to: HealthStatus,
}

/// Container health state machine.
///
/// Starts in `Starting`. Failures observed inside the start period do not
/// count; a success at any point moves to `Healthy` and clears the streak.
/// The first success also ends the start period early. From then on
/// `retries` consecutive failures move to `Unhealthy`.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    policy: HealthPolicy,
    snapshot: HealthSnapshot,
}

impl HealthMonitor {
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            policy,
            snapshot: HealthSnapshot::default(),
        }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    pub fn status(&self) -> HealthStatus {
        self.snapshot.status
    }

    pub fn failing_streak(&self) -> u32 {
        self.snapshot.failing_streak
    }

    pub fn snapshot(&self) -> &HealthSnapshot {
        &self.snapshot
    }

    /// True once any check has passed.
    fn in_service(&self) -> bool {
        self.snapshot.status != HealthStatus::Starting
    }

    /// Feeds one probe result. `since_start` is the time elapsed since the
    /// monitored process started.
    pub fn observe(&mut self, outcome: &ProbeOutcome, since_start: Duration) -> Option<Transition> {
        let from = self.snapshot.status;
        self.snapshot.last_checked_at = Some(outcome.checked_at);
        self.snapshot.last_outcome = Some(outcome.clone());

        if outcome.success {
            self.snapshot.failing_streak = 0;
            self.snapshot.status = HealthStatus::Healthy;
        } else if self.in_service() || since_start >= self.policy.start_period() {
            self.snapshot.failing_streak = self.snapshot.failing_streak.saturating_add(1);
            if self.snapshot.failing_streak >= self.policy.retries {
                self.snapshot.status = HealthStatus::Unhealthy;
            }
        }

        let to = self.snapshot.status;
        (from != to).then_some(Transition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> ProbeOutcome {
        ProbeOutcome::passed(200, 2)
    }

    fn fail() -> ProbeOutcome {
        ProbeOutcome::failed(Some(500), 2, "server error")
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_failures_in_grace_window_do_not_count() {
        let mut monitor = HealthMonitor::new(HealthPolicy::default());
        for _ in 0..10 {
            assert_eq!(monitor.observe(&fail(), secs(4)), None);
        }
        assert_eq!(monitor.status(), HealthStatus::Starting);
        assert_eq!(monitor.failing_streak(), 0);
    }

    #[test]
    fn test_three_failures_after_grace_mark_unhealthy() {
        let mut monitor = HealthMonitor::new(HealthPolicy::default());
        assert_eq!(monitor.observe(&fail(), secs(30)), None);
        assert_eq!(monitor.observe(&fail(), secs(60)), None);
        assert_eq!(
            monitor.observe(&fail(), secs(90)),
            Some(Transition {
                from: HealthStatus::Starting,
                to: HealthStatus::Unhealthy,
            })
        );
        assert_eq!(monitor.failing_streak(), 3);
    }

    #[test]
    fn test_success_in_grace_window_is_healthy() {
        let mut monitor = HealthMonitor::new(HealthPolicy::default());
        let transition = monitor.observe(&ok(), secs(1));
        assert_eq!(transition.map(|t| t.to), Some(HealthStatus::Healthy));
    }

    #[test]
    fn test_first_success_ends_grace_window() {
        let mut monitor = HealthMonitor::new(HealthPolicy::default());
        monitor.observe(&ok(), secs(1));
        assert_eq!(monitor.observe(&fail(), secs(2)), None);
        assert_eq!(monitor.observe(&fail(), secs(3)), None);
        assert_eq!(monitor.failing_streak(), 2);
        assert_eq!(
            monitor.observe(&fail(), secs(4)),
            Some(Transition {
                from: HealthStatus::Healthy,
                to: HealthStatus::Unhealthy,
            })
        );
    }

    #[test]
    fn test_single_success_recovers_and_resets_streak() {
        let mut monitor = HealthMonitor::new(HealthPolicy::default());
        monitor.observe(&ok(), secs(30));
        for i in 0..3 {
            monitor.observe(&fail(), secs(60 + i * 30));
        }
        assert_eq!(monitor.status(), HealthStatus::Unhealthy);

        let transition = monitor.observe(&ok(), secs(180));
        assert_eq!(
            transition,
            Some(Transition {
                from: HealthStatus::Unhealthy,
                to: HealthStatus::Healthy,
            })
        );
        assert_eq!(monitor.failing_streak(), 0);

        // Two failures are not enough to flip again.
        monitor.observe(&fail(), secs(210));
        monitor.observe(&fail(), secs(240));
        assert_eq!(monitor.status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_interleaved_success_breaks_streak() {
        let mut monitor = HealthMonitor::new(HealthPolicy::default());
        monitor.observe(&fail(), secs(30));
        monitor.observe(&fail(), secs(60));
        monitor.observe(&ok(), secs(90));
        monitor.observe(&fail(), secs(120));
        monitor.observe(&fail(), secs(150));
        assert_eq!(monitor.status(), HealthStatus::Healthy);
        assert_eq!(monitor.failing_streak(), 2);
    }

    #[test]
    fn test_snapshot_keeps_last_check_only() {
        let mut monitor = HealthMonitor::new(HealthPolicy::default());
        let first = fail();
        let second = ok();
        monitor.observe(&first, secs(10));
        monitor.observe(&second, secs(40));
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.last_checked_at, Some(second.checked_at));
        assert_eq!(snapshot.last_outcome.as_ref().map(|o| o.success), Some(true));
    }
}
