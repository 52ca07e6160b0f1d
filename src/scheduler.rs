// SPDX-License-Identifier: MPL-2.0

//! Randomized trigger countdown.

use std::time::{Duration, Instant};

use jumpscare_config::TriggerBounds;
use rand::Rng;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPhase {
    Idle,
    /// Counting down to `trigger_at`.
    Armed,
    /// The trigger time has passed and playback may start.
    Due,
}

/// Arms a countdown of random length and reports when it runs out.
#[derive(Debug)]
pub struct TriggerScheduler {
    phase: TriggerPhase,
    trigger_at: Option<Instant>,
    bounds: TriggerBounds,
}

impl TriggerScheduler {
    #[must_use]
    pub fn new(bounds: TriggerBounds) -> Self {
        Self {
            phase: TriggerPhase::Idle,
            trigger_at: None,
            bounds,
        }
    }

    /// Arm with a delay drawn uniformly from `bounds`, inclusive.
    pub fn arm(&mut self, bounds: TriggerBounds, now: Instant) -> Duration {
        self.arm_with(bounds, now, &mut rand::rng())
    }

    pub fn arm_with<R: Rng + ?Sized>(
        &mut self,
        bounds: TriggerBounds,
        now: Instant,
        rng: &mut R,
    ) -> Duration {
        let delay_secs = rng.random_range(bounds.min_secs()..=bounds.max_secs());
        let delay = Duration::from_secs(u64::from(delay_secs));

        self.bounds = bounds;
        self.trigger_at = Some(now + delay);
        self.phase = TriggerPhase::Armed;
        debug!(delay_secs, "trigger armed");
        delay
    }

    /// Arm again with the current bounds.
    pub fn rearm(&mut self, now: Instant) -> Duration {
        self.arm(self.bounds, now)
    }

    /// Move from `Armed` to `Due` once the trigger time is reached.
    pub fn poll(&mut self, now: Instant) -> TriggerPhase {
        if let (TriggerPhase::Armed, Some(at)) = (self.phase, self.trigger_at) {
            if now >= at {
                debug!("trigger due");
                self.phase = TriggerPhase::Due;
            }
        }
        self.phase
    }

    pub fn cancel(&mut self) {
        if self.phase != TriggerPhase::Idle {
            debug!(phase = ?self.phase, "trigger cancelled");
        }
        self.phase = TriggerPhase::Idle;
        self.trigger_at = None;
    }

    /// Time left while armed.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match (self.phase, self.trigger_at) {
            (TriggerPhase::Armed, Some(at)) => Some(at.saturating_duration_since(now)),
            _ => None,
        }
    }

    /// Whole seconds left while armed, rounded up for countdown text.
    #[must_use]
    pub fn remaining_secs(&self, now: Instant) -> Option<u64> {
        self.remaining(now).map(|left| {
            let secs = left.as_secs();
            if left.subsec_nanos() > 0 { secs + 1 } else { secs }
        })
    }

    /// Replace the bounds used by the next arm. A running countdown keeps
    /// its trigger time.
    pub fn set_bounds(&mut self, bounds: TriggerBounds) {
        self.bounds = bounds;
    }

    #[must_use]
    pub fn bounds(&self) -> TriggerBounds {
        self.bounds
    }

    #[must_use]
    pub fn phase(&self) -> TriggerPhase {
        self.phase
    }

    #[must_use]
    pub fn trigger_at(&self) -> Option<Instant> {
        self.trigger_at
    }

    /// Armed or due.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase != TriggerPhase::Idle
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn test_arm_draws_within_bounds() {
        let bounds = TriggerBounds::new(10, 100).unwrap();
        let mut rng = StdRng::seed_from_u64(0x6a75_6d70);
        let mut scheduler = TriggerScheduler::new(bounds);
        let now = Instant::now();

        // 91 values, seven bins of thirteen
        let mut bins = [0u32; 7];
        for _ in 0..1000 {
            let delay = scheduler.arm_with(bounds, now, &mut rng).as_secs();
            assert!((10..=100).contains(&delay), "{delay} out of bounds");
            bins[((delay - 10) / 13) as usize] += 1;
        }

        let expected = 1000.0 / 7.0;
        let chi_square: f64 = bins
            .iter()
            .map(|&observed| {
                let diff = f64::from(observed) - expected;
                diff * diff / expected
            })
            .sum();
        // six degrees of freedom, far beyond the 99.9% quantile
        assert!(chi_square < 30.0, "chi-square {chi_square}, bins {bins:?}");
    }

    #[test]
    fn test_poll_becomes_due() {
        let bounds = TriggerBounds::new(10, 11).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut scheduler = TriggerScheduler::new(bounds);
        let now = Instant::now();

        let delay = scheduler.arm_with(bounds, now, &mut rng);
        assert_eq!(scheduler.poll(now), TriggerPhase::Armed);
        assert_eq!(
            scheduler.poll(now + delay - Duration::from_millis(1)),
            TriggerPhase::Armed
        );
        assert_eq!(scheduler.poll(now + delay), TriggerPhase::Due);
        assert!(scheduler.is_active());
        assert_eq!(scheduler.remaining(now + delay), None);
    }

    #[test]
    fn test_remaining_secs_round_up() {
        let bounds = TriggerBounds::new(10, 11).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let mut scheduler = TriggerScheduler::new(bounds);
        let now = Instant::now();

        let delay = scheduler.arm_with(bounds, now, &mut rng);
        assert_eq!(scheduler.remaining_secs(now), Some(delay.as_secs()));
        assert_eq!(
            scheduler.remaining_secs(now + Duration::from_millis(500)),
            Some(delay.as_secs())
        );
        assert_eq!(
            scheduler.remaining_secs(now + Duration::from_secs(1)),
            Some(delay.as_secs() - 1)
        );
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let bounds = TriggerBounds::default();
        let mut scheduler = TriggerScheduler::new(bounds);
        scheduler.cancel();
        assert_eq!(scheduler.phase(), TriggerPhase::Idle);

        scheduler.arm(bounds, Instant::now());
        scheduler.cancel();
        scheduler.cancel();
        assert_eq!(scheduler.phase(), TriggerPhase::Idle);
        assert_eq!(scheduler.trigger_at(), None);
        assert!(!scheduler.is_active());
    }

    #[test]
    fn test_set_bounds_keeps_countdown() {
        let mut scheduler = TriggerScheduler::new(TriggerBounds::default());
        let now = Instant::now();
        scheduler.arm(TriggerBounds::new(10, 20).unwrap(), now);
        let at = scheduler.trigger_at();

        let wider = TriggerBounds::new(50, 60).unwrap();
        scheduler.set_bounds(wider);
        assert_eq!(scheduler.trigger_at(), at);
        assert_eq!(scheduler.phase(), TriggerPhase::Armed);

        let delay = scheduler.rearm(now);
        assert!((50..=60).contains(&delay.as_secs()));
    }
}
