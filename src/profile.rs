use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::StoreError;
use crate::store::KeyValueStore;

pub const PROFILE_KEY: &str = "ton-mining-profile";

/// The player's persisted mining record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub spendable_balance: f64,
    pub accrual_rate: f64,
    pub pending_earnings: f64,
    pub cumulative_mined: f64,
    pub deposit_satisfied: bool,
    pub has_received_welcome_bonus: bool,
    pub referral_count: u32,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_persisted_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(config: &Config, now: DateTime<Utc>) -> Self {
        Self {
            spendable_balance: config.economy.starting_balance,
            accrual_rate: config.mining.default_rate,
            pending_earnings: 0.0,
            cumulative_mined: 0.0,
            deposit_satisfied: false,
            has_received_welcome_bonus: false,
            referral_count: 0,
            last_persisted_at: now,
        }
    }

    /// Adds freshly mined TON to both the pending pot and the lifetime counter.
    /// Non-positive amounts are ignored so neither value can shrink.
    pub fn credit_mined(&mut self, amount: f64) {
        if amount > 0.0 && amount.is_finite() {
            self.pending_earnings += amount;
            self.cumulative_mined += amount;
        }
    }
}

/// Reads and writes the [`Profile`] under [`PROFILE_KEY`].
pub struct ProfileStore<S> {
    store: S,
}

impl<S: KeyValueStore> ProfileStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Absent, unreadable and unparsable records all come back as `None`.
    pub fn load(&self) -> Option<Profile> {
        let raw = match self.store.get(PROFILE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("profile unreadable, starting fresh: {e}");
                return None;
            }
        };
        match serde_json::from_str::<Profile>(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!("ignoring malformed profile record: {e}");
                None
            }
        }
    }

    pub fn save(&self, profile: &mut Profile) -> Result<(), StoreError> {
        self.save_at(profile, Utc::now())
    }

    /// Stamps `last_persisted_at` only once the write has gone through.
    pub fn save_at(&self, profile: &mut Profile, now: DateTime<Utc>) -> Result<(), StoreError> {
        // The record keeps millisecond precision, so keep memory in step with it.
        let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        let mut stamped = profile.clone();
        stamped.last_persisted_at = now;
        let json = serde_json::to_string(&stamped)?;
        self.store.set(PROFILE_KEY, &json)?;
        profile.last_persisted_at = now;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(PROFILE_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn sample() -> Profile {
        Profile {
            spendable_balance: 0.731_25,
            accrual_rate: 2.5,
            pending_earnings: 0.000_36,
            cumulative_mined: 1.234_567_891,
            deposit_satisfied: true,
            has_received_welcome_bonus: true,
            referral_count: 4,
            last_persisted_at: Utc.timestamp_millis_opt(0).unwrap(),
        }
    }

    #[test]
    fn load_returns_what_was_saved_with_fresh_stamp() {
        let store = ProfileStore::new(MemoryStore::new());
        let mut profile = sample();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        store.save_at(&mut profile, now).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, profile);
        assert_eq!(loaded.last_persisted_at, now);
    }

    #[test]
    fn record_uses_camel_case_and_epoch_millis() {
        let kv = MemoryStore::new();
        let store = ProfileStore::new(kv.clone());
        let mut profile = sample();
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        store.save_at(&mut profile, now).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&kv.get(PROFILE_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(raw["lastPersistedAt"], 1_700_000_000_123_i64);
        assert_eq!(raw["referralCount"], 4);
        assert_eq!(raw["hasReceivedWelcomeBonus"], true);
    }

    #[test]
    fn missing_or_corrupt_record_is_first_run() {
        let kv = MemoryStore::new();
        let store = ProfileStore::new(kv.clone());
        assert!(store.load().is_none());

        kv.set(PROFILE_KEY, "{not json").unwrap();
        assert!(store.load().is_none());

        kv.set(PROFILE_KEY, r#"{"spendableBalance": 1.0}"#).unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn clear_forgets_the_profile() {
        let store = ProfileStore::new(MemoryStore::new());
        let mut profile = sample();
        store.save(&mut profile).unwrap();
        store.clear().unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn credit_ignores_non_positive_amounts() {
        let mut profile = sample();
        let before = profile.clone();
        profile.credit_mined(0.0);
        profile.credit_mined(-1.0);
        profile.credit_mined(f64::NAN);
        assert_eq!(profile, before);
    }
}
