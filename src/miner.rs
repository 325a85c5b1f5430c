use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::accrual::{self, AccrualClock, CatchUp};
use crate::config::{Config, EconomyConfig};
use crate::economy::{
    self, ClaimRejected, UpgradeBlocked, UpgradeReceipt, WithdrawBlocked, WithdrawReceipt,
};
use crate::error::PaymentError;
use crate::profile::{Profile, ProfileStore};
use crate::referral;
use crate::store::KeyValueStore;
use crate::wallet::{TxReceipt, Wallet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerState {
    Idle,
    Accruing,
}

/// How the session started.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Boot {
    /// No usable record existed; the welcome package was granted.
    FirstRun,
    Resumed(CatchUp),
}

/// Owns the live [`Profile`] and the accrual clock. All mutation goes through
/// `&mut self`, so a claim can never interleave with a tick.
#[derive(Debug)]
pub struct Miner {
    profile: Profile,
    clock: AccrualClock,
    base_rate: f64,
    dirty: bool,
}

impl Miner {
    /// Seeds the session from the stored record. Offline catch-up happens
    /// here and nowhere else, before the first tick can run.
    pub fn boot(loaded: Option<Profile>, config: &Config, now: DateTime<Utc>) -> (Self, Boot) {
        let base_rate = config.mining.base_rate;
        let mut clock = AccrualClock::new(config.mining.tick_period());

        let (profile, boot) = match loaded {
            Some(mut profile) => {
                let caught_up = accrual::catch_up(&mut profile, base_rate, clock.period(), now);
                tracing::info!(
                    elapsed_secs = caught_up.elapsed_secs,
                    earned = caught_up.earned,
                    "credited offline mining"
                );
                if config.mining.auto_start {
                    clock.start();
                }
                (profile, Boot::Resumed(caught_up))
            }
            None => {
                let mut profile = Profile::new(config, now);
                if !profile.has_received_welcome_bonus {
                    profile.accrual_rate = config.mining.welcome_rate;
                    profile.has_received_welcome_bonus = true;
                }
                tracing::info!(rate = profile.accrual_rate, "first run, welcome package granted");
                clock.start();
                (profile, Boot::FirstRun)
            }
        };

        let miner = Self {
            profile,
            clock,
            base_rate,
            dirty: true,
        };
        (miner, boot)
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn state(&self) -> MinerState {
        if self.clock.is_running() {
            MinerState::Accruing
        } else {
            MinerState::Idle
        }
    }

    /// TON earned per second at the current rate.
    pub fn rate_per_sec(&self) -> f64 {
        accrual::per_second(self.base_rate, self.profile.accrual_rate, self.clock.period())
    }

    pub fn toggle(&mut self) -> MinerState {
        if self.clock.is_running() {
            self.clock.stop();
        } else {
            self.clock.start();
        }
        tracing::info!(state = ?self.state(), "mining toggled");
        self.state()
    }

    /// Feeds elapsed wall time to the clock and applies the whole ticks.
    pub fn advance(&mut self, dt: Duration) -> f64 {
        let ticks = self.clock.advance(dt);
        if ticks == 0 {
            return 0.0;
        }
        let earned = accrual::apply_ticks(&mut self.profile, self.base_rate, ticks);
        if earned > 0.0 {
            self.dirty = true;
        }
        earned
    }

    pub fn claim(&mut self, minimum: f64) -> Result<f64, ClaimRejected> {
        let amount = economy::claim(&mut self.profile, minimum)?;
        self.dirty = true;
        tracing::info!(amount, balance = self.profile.spendable_balance, "claimed earnings");
        Ok(amount)
    }

    pub fn upgrade(
        &mut self,
        economy: &EconomyConfig,
        tier: usize,
        wallet: &mut dyn Wallet,
    ) -> Result<UpgradeReceipt, UpgradeBlocked> {
        match economy::purchase_upgrade(&mut self.profile, economy, tier, wallet) {
            Ok(receipt) => {
                self.dirty = true;
                tracing::info!(
                    tier = %receipt.tier.label,
                    price = receipt.price,
                    previous_rate = receipt.previous_rate,
                    rate = self.profile.accrual_rate,
                    tx = ?receipt.tx.as_ref().map(|t| t.id.as_str()),
                    "upgrade purchased"
                );
                Ok(receipt)
            }
            Err(UpgradeBlocked::PaymentFailed(e)) => {
                tracing::warn!("upgrade payment failed: {e}");
                Err(UpgradeBlocked::PaymentFailed(e))
            }
            Err(blocked) => Err(blocked),
        }
    }

    pub fn deposit(
        &mut self,
        economy: &EconomyConfig,
        wallet: &mut dyn Wallet,
    ) -> Result<TxReceipt, PaymentError> {
        match economy::pay_deposit(&mut self.profile, economy, wallet) {
            Ok(tx) => {
                self.dirty = true;
                tracing::info!(
                    tx = %tx.id,
                    amount = tx.amount,
                    sent_at = %tx.sent_at,
                    "deposit confirmed"
                );
                Ok(tx)
            }
            Err(e) => {
                tracing::warn!("deposit payment failed: {e}");
                Err(e)
            }
        }
    }

    pub fn withdraw(
        &mut self,
        economy: &EconomyConfig,
        destination: &str,
    ) -> Result<WithdrawReceipt, WithdrawBlocked> {
        let receipt = economy::withdraw(&mut self.profile, economy, destination, Utc::now())?;
        self.dirty = true;
        tracing::info!(
            amount = receipt.amount,
            destination,
            requested_at = %receipt.requested_at,
            "withdrawal requested"
        );
        Ok(receipt)
    }

    pub fn withdraw_status(&self, economy: &EconomyConfig) -> Result<(), WithdrawBlocked> {
        economy::check_withdraw(&self.profile, economy)
    }

    pub fn reward(&mut self, amount: f64) -> f64 {
        let credited = economy::credit_reward(&mut self.profile, amount);
        if credited > 0.0 {
            self.dirty = true;
        }
        credited
    }

    pub fn record_referral(&mut self, reward: f64) -> f64 {
        let credited = referral::record_referral(&mut self.profile, reward);
        self.dirty = true;
        tracing::info!(count = self.profile.referral_count, credited, "referral recorded");
        credited
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes the profile. A failed write is logged and the profile stays
    /// dirty so the next save retries it.
    pub fn persist<S: KeyValueStore>(&mut self, store: &ProfileStore<S>) -> bool {
        match store.save(&mut self.profile) {
            Ok(()) => {
                self.dirty = false;
                tracing::debug!(
                    pending = self.profile.pending_earnings,
                    "profile saved"
                );
                true
            }
            Err(e) => {
                tracing::warn!("profile save failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn first_run_grants_welcome_rate_and_starts() {
        let config = Config::default();
        let (miner, boot) = Miner::boot(None, &config, t0());
        assert_eq!(boot, Boot::FirstRun);
        assert_eq!(miner.profile().accrual_rate, config.mining.welcome_rate);
        assert!(miner.profile().has_received_welcome_bonus);
        assert_eq!(miner.state(), MinerState::Accruing);
        assert!(miner.is_dirty());
    }

    #[test]
    fn resume_credits_offline_time_once() {
        let config = Config::default();
        let mut stored = Profile::new(&config, t0());
        stored.accrual_rate = 0.1;
        stored.has_received_welcome_bonus = true;

        let now = t0() + chrono::Duration::seconds(3600);
        let (miner, boot) = Miner::boot(Some(stored), &config, now);
        match boot {
            Boot::Resumed(c) => assert!((c.earned - 0.000_36).abs() < 1e-12),
            Boot::FirstRun => panic!("expected resume"),
        }
        assert!((miner.profile().pending_earnings - 0.000_36).abs() < 1e-12);
        // The welcome grant is never repeated.
        assert_eq!(miner.profile().accrual_rate, 0.1);
    }

    #[test]
    fn auto_start_off_resumes_idle() {
        let mut config = Config::default();
        config.mining.auto_start = false;
        let stored = Profile::new(&config, t0());
        let (mut miner, _) = Miner::boot(Some(stored), &config, t0());
        assert_eq!(miner.state(), MinerState::Idle);
        assert_eq!(miner.advance(Duration::from_secs(10)), 0.0);
        assert_eq!(miner.toggle(), MinerState::Accruing);
        assert!(miner.advance(Duration::from_secs(10)) > 0.0);
    }

    #[test]
    fn claim_across_ticks_loses_nothing() {
        let mut config = Config::default();
        config.mining.base_rate = 0.1;
        let (mut miner, _) = Miner::boot(None, &config, t0());

        let mut claimed = 0.0;
        for step in 0..10 {
            miner.advance(Duration::from_millis(500));
            if step % 3 == 2 {
                claimed += miner.claim(0.0).unwrap_or(0.0);
            }
        }
        let p = miner.profile();
        assert!((claimed + p.pending_earnings - p.cumulative_mined).abs() < 1e-12);
        assert!((p.spendable_balance - claimed).abs() < 1e-12);
        assert!((p.cumulative_mined - 5.0 * 0.1 * 0.1).abs() < 1e-12);
    }

    #[test]
    fn persist_clears_dirty_and_round_trips() {
        let config = Config::default();
        let store = ProfileStore::new(MemoryStore::new());
        let (mut miner, _) = Miner::boot(None, &config, t0());
        miner.record_referral(config.economy.referral_reward);

        assert!(miner.persist(&store));
        assert!(!miner.is_dirty());
        assert_eq!(store.load().as_ref(), Some(miner.profile()));
    }

    #[test]
    fn rate_per_sec_follows_tick_period() {
        let mut config = Config::default();
        config.mining.tick_millis = 500;
        config.mining.base_rate = 1.0;
        let (miner, _) = Miner::boot(None, &config, t0());
        assert!((miner.rate_per_sec() - 2.0 * config.mining.welcome_rate).abs() < 1e-12);
    }

    #[test]
    fn resume_pays_live_rate_for_short_ticks() {
        let mut config = Config::default();
        config.mining.tick_millis = 500;
        let mut stored = Profile::new(&config, t0());
        stored.accrual_rate = 1.0;
        stored.has_received_welcome_bonus = true;

        let (mut live, _) = Miner::boot(Some(stored.clone()), &config, t0());
        live.advance(Duration::from_secs(10));

        let later = t0() + chrono::Duration::seconds(10);
        let (resumed, _) = Miner::boot(Some(stored), &config, later);

        let expected = 10.0 * live.rate_per_sec();
        assert!((live.profile().pending_earnings - expected).abs() < 1e-15);
        assert!((resumed.profile().pending_earnings - expected).abs() < 1e-15);
    }
}
