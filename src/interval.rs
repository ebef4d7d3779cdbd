//! Exponentially distributed waits between reports.
//!
//! Report times form a Poisson process: each wait is `-M * ln(U)` for a
//! uniform `U` in (0, 1], so the waits are memoryless and past emissions say
//! nothing about the next one.

use crate::platform::RandomSource;
use std::time::Duration;
use thiserror::Error;

const SECONDS_PER_MINUTE: f64 = 60.0;

/// Smallest positive fraction a 32-bit draw can represent. Substituted for a
/// zero draw so `ln(0)` is never evaluated.
pub const MIN_FRACTION: f64 = 1.0 / u32::MAX as f64;

#[derive(Debug, Error, PartialEq)]
#[error("mean interval must be a positive number of minutes, got {0}")]
pub struct InvalidMean(pub f64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoissonInterval {
    mean_minutes: f64,
}

impl PoissonInterval {
    pub fn new(mean_minutes: f64) -> Result<Self, InvalidMean> {
        if !mean_minutes.is_finite() || mean_minutes <= 0.0 {
            return Err(InvalidMean(mean_minutes));
        }
        Ok(Self { mean_minutes })
    }

    /// Wait for a given uniform fraction. Fractions at or below zero are
    /// raised to [`MIN_FRACTION`]; fractions above one are treated as one.
    /// Waits too long for a `Duration` saturate at `Duration::MAX`.
    pub fn delay_for_fraction(&self, u: f64) -> Duration {
        let u = if u.is_nan() {
            MIN_FRACTION
        } else {
            u.clamp(MIN_FRACTION, 1.0)
        };
        let minutes = -self.mean_minutes * u.ln();
        // u == 1.0 yields -0.0
        if minutes <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(minutes * SECONDS_PER_MINUTE).unwrap_or(Duration::MAX)
    }

    /// Draw one wait from the random source.
    pub fn sample(&self, random: &dyn RandomSource) -> Duration {
        self.delay_for_fraction(fraction_from_raw(random.next_u32()))
    }

    /// Longest wait the generator can produce, reached on a zero draw.
    pub fn max_delay(&self) -> Duration {
        self.delay_for_fraction(MIN_FRACTION)
    }
}

/// Map a raw 32-bit draw onto (0, 1].
pub fn fraction_from_raw(raw: u32) -> f64 {
    (raw as f64 / u32::MAX as f64).max(MIN_FRACTION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ScriptedRandom;

    fn hourly() -> PoissonInterval {
        PoissonInterval::new(60.0).unwrap()
    }

    #[test]
    fn rejects_bad_means() {
        for mean in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(PoissonInterval::new(mean).is_err(), "{mean}");
        }
    }

    #[test]
    fn delay_is_positive_inside_the_open_interval() {
        let interval = hourly();
        for u in [1e-9, 0.001, 0.25, 0.5, 0.75, 0.999_999] {
            assert!(interval.delay_for_fraction(u) > Duration::ZERO, "u = {u}");
        }
    }

    #[test]
    fn delay_grows_as_fraction_shrinks() {
        let interval = hourly();
        let fractions = [0.99, 0.9, 0.5, 0.1, 0.01, 1e-4, 1e-8];
        let delays: Vec<_> = fractions.iter().map(|&u| interval.delay_for_fraction(u)).collect();
        for pair in delays.windows(2) {
            assert!(pair[0] < pair[1], "{:?} !< {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn one_over_e_gives_the_mean() {
        let d = hourly().delay_for_fraction((-1.0f64).exp());
        assert!((d.as_secs_f64() - 3600.0).abs() < 1e-6, "{d:?}");
    }

    #[test]
    fn zero_draw_is_substituted() {
        let interval = hourly();
        assert_eq!(fraction_from_raw(0), MIN_FRACTION);

        let d = interval.sample(&ScriptedRandom::new([0]));
        assert_eq!(d, interval.max_delay());
        // ln(u32::MAX) ~ 22.18 means
        let means = d.as_secs_f64() / 3600.0;
        assert!((means - (u32::MAX as f64).ln()).abs() < 1e-6, "{means}");
    }

    #[test]
    fn degenerate_fractions_stay_finite() {
        let interval = hourly();
        assert_eq!(interval.delay_for_fraction(0.0), interval.max_delay());
        assert_eq!(interval.delay_for_fraction(-0.5), interval.max_delay());
        assert_eq!(interval.delay_for_fraction(f64::NAN), interval.max_delay());
        assert_eq!(interval.delay_for_fraction(1.0), Duration::ZERO);
        assert_eq!(interval.delay_for_fraction(3.0), Duration::ZERO);
    }

    #[test]
    fn huge_mean_saturates_instead_of_overflowing() {
        let interval = PoissonInterval::new(1e17).unwrap();
        assert_eq!(interval.max_delay(), Duration::MAX);
        assert_eq!(interval.sample(&ScriptedRandom::new([0])), Duration::MAX);
        assert_eq!(interval.delay_for_fraction(1.0), Duration::ZERO);
    }

    #[test]
    fn full_scale_draw_means_no_wait() {
        assert_eq!(hourly().sample(&ScriptedRandom::new([u32::MAX])), Duration::ZERO);
    }

    #[test]
    fn sample_mean_tracks_configured_mean() {
        use rand::{rngs::StdRng, RngCore, SeedableRng};

        let interval = PoissonInterval::new(1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let total: f64 = (0..n)
            .map(|_| interval.delay_for_fraction(fraction_from_raw(rng.next_u32())).as_secs_f64())
            .sum();
        let mean_minutes = total / n as f64 / 60.0;
        assert!((mean_minutes - 1.0).abs() < 0.05, "{mean_minutes}");
    }
}
