use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::profile::Profile;

/// Fixed-period scheduler for mining ticks.
///
/// The render loop calls [`AccrualClock::advance`] with whatever wall time has
/// passed; the clock answers with the number of whole periods that elapsed and
/// keeps the remainder for the next call, so a tick is never lost or repeated.
#[derive(Debug, Clone)]
pub struct AccrualClock {
    period: Duration,
    carry: Duration,
    running: bool,
}

impl AccrualClock {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            carry: Duration::ZERO,
            running: false,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stops ticking and drops any partial period.
    pub fn stop(&mut self) {
        self.running = false;
        self.carry = Duration::ZERO;
    }

    pub fn advance(&mut self, dt: Duration) -> u32 {
        if !self.running || self.period.is_zero() {
            return 0;
        }
        self.carry += dt;
        let mut ticks = 0u32;
        while self.carry >= self.period {
            self.carry -= self.period;
            ticks = ticks.saturating_add(1);
        }
        ticks
    }
}

/// TON earned by one tick at the profile's current rate.
pub fn tick_increment(base_rate: f64, accrual_rate: f64) -> f64 {
    if accrual_rate <= 0.0 {
        return 0.0;
    }
    base_rate * accrual_rate
}

/// Applies `ticks` accrual ticks to the profile and returns the amount credited.
pub fn apply_ticks(profile: &mut Profile, base_rate: f64, ticks: u32) -> f64 {
    let earned = tick_increment(base_rate, profile.accrual_rate) * f64::from(ticks);
    profile.credit_mined(earned);
    earned.max(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatchUp {
    pub elapsed_secs: f64,
    pub earned: f64,
}

/// TON earned per second when one tick of `period` pays [`tick_increment`].
pub fn per_second(base_rate: f64, accrual_rate: f64, period: Duration) -> f64 {
    let secs = period.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    tick_increment(base_rate, accrual_rate) / secs
}

/// Credits mining that would have happened between the last save and `now`,
/// at the same per-second yield as live ticks of `period`.
/// A clock that went backwards credits nothing.
pub fn catch_up(
    profile: &mut Profile,
    base_rate: f64,
    period: Duration,
    now: DateTime<Utc>,
) -> CatchUp {
    let elapsed_ms = (now - profile.last_persisted_at).num_milliseconds().max(0);
    let elapsed_secs = elapsed_ms as f64 / 1000.0;
    let earned = per_second(base_rate, profile.accrual_rate, period) * elapsed_secs;
    profile.credit_mined(earned);
    CatchUp {
        elapsed_secs,
        earned: earned.max(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::TimeZone;

    const BASE: f64 = 0.000_001;
    const SECOND: Duration = Duration::from_secs(1);

    fn profile_at(rate: f64, at: DateTime<Utc>) -> Profile {
        let mut profile = Profile::new(&Config::default(), at);
        profile.accrual_rate = rate;
        profile
    }

    #[test]
    fn clock_carries_partial_periods() {
        let mut clock = AccrualClock::new(Duration::from_secs(1));
        clock.start();
        let mut total = 0;
        for _ in 0..12 {
            total += clock.advance(Duration::from_millis(200));
        }
        assert_eq!(total, 2);
        assert_eq!(clock.advance(Duration::from_millis(600)), 1);
    }

    #[test]
    fn stopped_clock_never_ticks() {
        let mut clock = AccrualClock::new(Duration::from_secs(1));
        assert_eq!(clock.advance(Duration::from_secs(5)), 0);
        clock.start();
        clock.advance(Duration::from_millis(900));
        clock.stop();
        clock.start();
        assert_eq!(clock.advance(Duration::from_millis(200)), 0);
    }

    #[test]
    fn ticks_are_monotonic() {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let mut profile = profile_at(0.1, start);
        let mut last = (0.0, 0.0);
        for ticks in [1, 0, 3, 7, 1] {
            apply_ticks(&mut profile, BASE, ticks);
            assert!(profile.pending_earnings >= last.0);
            assert!(profile.cumulative_mined >= last.1);
            last = (profile.pending_earnings, profile.cumulative_mined);
        }
        assert!((profile.cumulative_mined - 12.0 * BASE * 0.1).abs() < 1e-15);
    }

    #[test]
    fn zero_rate_earns_nothing() {
        let start = Utc.timestamp_opt(0, 0).unwrap();
        let mut profile = profile_at(0.0, start);
        assert_eq!(apply_ticks(&mut profile, BASE, 10), 0.0);
        profile.accrual_rate = -2.0;
        let later = start + chrono::Duration::seconds(100);
        assert_eq!(catch_up(&mut profile, BASE, SECOND, later).earned, 0.0);
        assert_eq!(profile.pending_earnings, 0.0);
    }

    #[test]
    fn one_hour_offline_at_welcome_rate() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut profile = profile_at(0.1, start);
        let result = catch_up(&mut profile, BASE, SECOND, start + chrono::Duration::seconds(3600));
        assert_eq!(result.elapsed_secs, 3600.0);
        assert!((result.earned - 0.000_36).abs() < 1e-12);
        assert!((profile.pending_earnings - 0.000_36).abs() < 1e-12);
        assert!((profile.cumulative_mined - 0.000_36).abs() < 1e-12);
    }

    #[test]
    fn offline_matches_continuous_ticking() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let secs = 5_400;

        let mut offline = profile_at(2.5, start);
        catch_up(&mut offline, BASE, SECOND, start + chrono::Duration::seconds(secs));

        let mut online = profile_at(2.5, start);
        let mut clock = AccrualClock::new(Duration::from_secs(1));
        clock.start();
        for _ in 0..secs {
            let ticks = clock.advance(Duration::from_secs(1));
            apply_ticks(&mut online, BASE, ticks);
        }

        assert!((offline.pending_earnings - online.pending_earnings).abs() < 1e-9);
    }

    #[test]
    fn offline_matches_fast_ticks() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let period = Duration::from_millis(500);

        let mut offline = profile_at(1.0, start);
        catch_up(&mut offline, BASE, period, start + chrono::Duration::seconds(10));

        let mut online = profile_at(1.0, start);
        let mut clock = AccrualClock::new(period);
        clock.start();
        for _ in 0..50 {
            let ticks = clock.advance(Duration::from_millis(200));
            apply_ticks(&mut online, BASE, ticks);
        }

        assert!((online.pending_earnings - 20.0 * BASE).abs() < 1e-15);
        assert!((offline.pending_earnings - online.pending_earnings).abs() < 1e-15);
        assert!((per_second(BASE, 1.0, period) - 2.0 * BASE).abs() < 1e-18);
    }

    #[test]
    fn clock_skew_is_clamped() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut profile = profile_at(1.0, start);
        let result = catch_up(&mut profile, BASE, SECOND, start - chrono::Duration::hours(2));
        assert_eq!(result.elapsed_secs, 0.0);
        assert_eq!(profile.cumulative_mined, 0.0);
    }
}
