//! Game tunables.
//!
//! Everything that differed between releases of the mining game (claim
//! minimum, payment path for upgrades, the tier table) lives here so a
//! deployment picks its values explicitly. The file is JSON and every field
//! has a default, so a partial file is a valid config.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::economy::UpgradeTier;

const DEFAULT_DIR: &str = ".tonrig";
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the profile, task records and log file live.
    pub data_dir: Option<PathBuf>,
    pub user_id: String,
    pub mining: MiningConfig,
    pub economy: EconomyConfig,
    pub wallet: WalletConfig,
    pub tasks: TaskConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// TON generated per second at an accrual rate of 1.0.
    pub base_rate: f64,
    pub default_rate: f64,
    /// Rate granted once on first launch.
    pub welcome_rate: f64,
    pub tick_millis: u64,
    pub auto_start: bool,
    pub autosave_secs: u64,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            base_rate: 0.000_001,
            default_rate: 0.05,
            welcome_rate: 0.1,
            tick_millis: 1000,
            auto_start: true,
            autosave_secs: 5,
        }
    }
}

impl MiningConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    /// Upgrades are debited from the spendable balance.
    Balance,
    /// Upgrades are paid through the connected wallet.
    Wallet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    pub claim_minimum: f64,
    pub starting_balance: f64,
    pub payment_mode: PaymentMode,
    pub discount_percent: f64,
    pub tiers: Vec<UpgradeTier>,
    pub withdraw_min_balance: f64,
    pub withdraw_min_referrals: u32,
    pub deposit_amount: f64,
    pub referral_reward: f64,
    /// Destination for wallet payments (upgrades and deposits).
    pub treasury_address: String,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            claim_minimum: 0.2,
            starting_balance: 0.0,
            payment_mode: PaymentMode::Balance,
            discount_percent: 50.0,
            tiers: UpgradeTier::default_table(),
            withdraw_min_balance: 1.0,
            withdraw_min_referrals: 3,
            deposit_amount: 0.1,
            referral_reward: 0.05,
            treasury_address: "UQCiVNm22dMF9S3YsHPcgrmqXEQHt4MIdk_N7VJu88NrLr4R".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Probability in [0, 1] that the simulated wallet rejects a payment.
    pub rejection_rate: f64,
    pub start_connected: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            rejection_rate: 0.1,
            start_connected: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TaskBackend {
    Memory,
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub backend: TaskBackend,
    /// REST endpoint of the remote task table, e.g. `https://x.supabase.co/rest/v1`.
    pub remote_url: Option<String>,
    pub api_key: Option<String>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config {}", path.as_ref().display()))?;
        let config: Config =
            serde_json::from_str(&content).context("failed to parse config JSON")?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path.as_ref(), json).context("failed to write config file")?;
        Ok(())
    }

    pub fn default_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        Ok(home.join(DEFAULT_DIR))
    }

    /// Loads `path`, or the default location when `path` is `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_dir()?.join(CONFIG_FILE),
        };
        if path.exists() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::default_dir(),
        }
    }

    pub fn user_id(&self) -> &str {
        if self.user_id.is_empty() {
            "local-player"
        } else {
            &self.user_id
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.mining.base_rate <= 0.0 {
            bail!("mining.base_rate must be positive");
        }
        if self.mining.tick_millis == 0 {
            bail!("mining.tick_millis must be positive");
        }
        if self.economy.tiers.is_empty() {
            bail!("economy.tiers must contain at least one tier");
        }
        if self.economy.tiers.iter().any(|t| t.price < 0.0 || t.multiplier <= 0.0) {
            bail!("every tier needs a non-negative price and a positive multiplier");
        }
        if self.economy.claim_minimum < 0.0 || self.economy.withdraw_min_balance < 0.0 {
            bail!("thresholds cannot be negative");
        }
        if !(0.0..100.0).contains(&self.economy.discount_percent) {
            bail!("economy.discount_percent must be in [0, 100)");
        }
        if !(0.0..=1.0).contains(&self.wallet.rejection_rate) {
            bail!("wallet.rejection_rate must be in [0, 1]");
        }
        if self.tasks.backend == TaskBackend::Remote && self.tasks.remote_url.is_none() {
            bail!("tasks.remote_url is required for the remote backend");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "economy": { "claim_minimum": 0.0, "payment_mode": "wallet" } }"#)
            .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.economy.claim_minimum, 0.0);
        assert_eq!(config.economy.payment_mode, PaymentMode::Wallet);
        assert_eq!(config.economy.withdraw_min_referrals, 3);
        assert_eq!(config.mining.tick_millis, 1000);
        assert!(!config.economy.tiers.is_empty());
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config.economy.claim_minimum, 0.2);
        assert_eq!(config.user_id(), "local-player");
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = Config::default();
        config.mining.base_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.economy.tiers.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tasks.backend = TaskBackend::Remote;
        assert!(config.validate().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.user_id = "alice".into();
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.user_id(), "alice");
    }
}
