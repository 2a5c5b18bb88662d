//! Drift-correcting tick scheduling.
//!
//! Every loop in the system (one per channel plus the synchronizer) paces itself with
//! [`Scheduler`]. The next wake time is anchored to the previous *target*, never to
//! "now + interval", so small per-tick jitter does not accumulate. When a tick overruns
//! by whole intervals those ticks are dropped instead of being replayed back to back.

use chrono::Local;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::error::ConfigError;

/// Result of one scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakePlan {
    /// How long to sleep before the next tick. Zero when running late.
    pub sleep: Duration,
    /// Target time of the next tick; pass it back as `last` next time.
    pub next: Instant,
    /// Whole intervals that were dropped to realign.
    pub skipped: u32,
}

impl WakePlan {
    /// Whether the previous tick ran past its deadline.
    pub fn overran(&self) -> bool {
        self.sleep.is_zero() && self.skipped > 0
    }
}

/// Decide how long to sleep and which target comes next.
///
/// With `remaining = last + interval - now`: a non-negative remainder is slept off and
/// the next target is `last + interval`. A negative remainder means the tick overran;
/// `floor(|remaining| / interval)` whole intervals are skipped, the sleep is zero, and the
/// next target is one interval past the realigned anchor.
///
/// `interval` must be non-zero; [`Scheduler::new`] enforces that.
pub fn next_wake(last: Instant, interval: Duration, now: Instant) -> WakePlan {
    let target = last + interval;
    if now <= target {
        return WakePlan {
            sleep: target - now,
            next: target,
            skipped: 0,
        };
    }

    let behind = now - target;
    let missed = (behind.as_nanos() / interval.as_nanos().max(1)) as u32;
    let anchor = last + interval * missed;
    WakePlan {
        sleep: Duration::ZERO,
        next: anchor + interval,
        skipped: missed,
    }
}

/// Per-loop schedule state: the last target and the nominal interval.
#[derive(Debug)]
pub struct Scheduler {
    owner: String,
    interval: Duration,
    last: Instant,
    skipped_total: u64,
}

impl Scheduler {
    /// Start a schedule anchored at `start`.
    ///
    /// # Errors
    /// A zero interval is a configuration error, not a busy loop.
    pub fn new(owner: impl Into<String>, interval: Duration, start: Instant) -> Result<Self, ConfigError> {
        let owner = owner.into();
        if interval.is_zero() {
            return Err(ConfigError::NonPositiveInterval {
                owner,
                value: interval.as_secs_f64(),
            });
        }
        Ok(Self {
            owner,
            interval,
            last: start,
            skipped_total: 0,
        })
    }

    /// Nominal interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Target time of the most recent tick.
    pub fn last(&self) -> Instant {
        self.last
    }

    /// Total ticks dropped over the life of this schedule.
    pub fn skipped_total(&self) -> u64 {
        self.skipped_total
    }

    /// Advance the schedule at `now` and return the plan. Logs a "slow" diagnostic
    /// when ticks had to be dropped.
    pub fn advance(&mut self, now: Instant) -> WakePlan {
        let plan = next_wake(self.last, self.interval, now);
        if plan.skipped > 0 {
            self.skipped_total += u64::from(plan.skipped);
            warn!(
                owner = %self.owner,
                skipped = plan.skipped,
                at = %Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                "Slow: {} fell behind, dropping {} tick(s)",
                self.owner,
                plan.skipped
            );
        }
        self.last = plan.next;
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_on_time_sleeps_remainder() {
        let t0 = Instant::now();
        let plan = next_wake(t0, SECOND, t0 + Duration::from_millis(300));
        assert_eq!(plan.sleep, Duration::from_millis(700));
        assert_eq!(plan.next, t0 + SECOND);
        assert_eq!(plan.skipped, 0);
        assert!(!plan.overran());
    }

    #[test]
    fn test_exactly_on_deadline() {
        let t0 = Instant::now();
        let plan = next_wake(t0, SECOND, t0 + SECOND);
        assert_eq!(plan.sleep, Duration::ZERO);
        assert_eq!(plan.next, t0 + SECOND);
        assert_eq!(plan.skipped, 0);
    }

    #[test]
    fn test_small_overrun_runs_immediately_without_skipping() {
        let t0 = Instant::now();
        let plan = next_wake(t0, SECOND, t0 + Duration::from_millis(1500));
        assert_eq!(plan.sleep, Duration::ZERO);
        assert_eq!(plan.skipped, 0);
        assert_eq!(plan.next, t0 + SECOND);
    }

    #[test]
    fn test_overrun_skips_whole_intervals() {
        let t0 = Instant::now();
        for (late_ms, expected) in [(1_000u64, 1u32), (2_500, 2), (3_999, 3), (7_000, 7)] {
            // `late_ms` past the deadline, i.e. k = late_ms / 1000 intervals of overrun
            let now = t0 + SECOND + Duration::from_millis(late_ms);
            let plan = next_wake(t0, SECOND, now);
            assert_eq!(plan.skipped, expected, "late by {late_ms} ms");
            assert_eq!(plan.sleep, Duration::ZERO);
            assert_eq!(plan.next, t0 + SECOND * (expected + 1));
            // the new target is never more than one interval ahead of now
            assert!(plan.next <= now + SECOND);
        }
    }

    #[test]
    fn test_no_drift_over_many_ticks() {
        let t0 = Instant::now();
        let interval = Duration::from_millis(250);
        let mut scheduler = Scheduler::new("drift", interval, t0).unwrap();
        let mut now = t0;
        let ticks = 1_000u32;
        for i in 0..ticks {
            // jittery work between 0 and 200 ms
            now += Duration::from_millis(u64::from((i * 37) % 200));
            let plan = scheduler.advance(now);
            now += plan.sleep;
            assert_eq!(now, plan.next);
        }
        assert_eq!(scheduler.last(), t0 + interval * ticks);
        assert_eq!(scheduler.skipped_total(), 0);
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(matches!(
            Scheduler::new("bad", Duration::ZERO, Instant::now()),
            Err(ConfigError::NonPositiveInterval { .. })
        ));
    }

    #[test]
    fn test_average_period_after_overrun() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new("avg", SECOND, t0).unwrap();
        // one tick stalls for 3.2 s, the rest are instant
        let mut now = t0 + Duration::from_millis(4_200);
        let plan = scheduler.advance(now);
        assert_eq!(plan.skipped, 3);
        now += plan.sleep;
        for _ in 0..10 {
            let plan = scheduler.advance(now);
            now += plan.sleep;
        }
        // the schedule stays on the original one-second grid
        let offset = (scheduler.last() - t0).as_nanos() % SECOND.as_nanos();
        assert_eq!(offset, 0);
    }

    #[traced_test]
    #[test]
    fn test_overrun_is_logged() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new("3025_Jim's", SECOND, t0).unwrap();
        let plan = scheduler.advance(t0 + Duration::from_secs(4));
        assert_eq!(plan.skipped, 3);
        assert_eq!(scheduler.skipped_total(), 3);
        assert!(logs_contain("Slow: 3025_Jim's"));
    }
}
