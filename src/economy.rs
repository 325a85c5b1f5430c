//! Rules for moving TON around a [`Profile`]: claiming, upgrades, deposits,
//! withdrawals and rewards.
//!
//! Every guard failure comes back as a value describing what is missing. None
//! of these functions touch the profile unless the whole transition succeeds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{EconomyConfig, PaymentMode};
use crate::error::PaymentError;
use crate::profile::Profile;
use crate::wallet::{TxReceipt, Wallet};

/// Slack for comparing balances that went through float arithmetic.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeTier {
    pub label: String,
    pub price: f64,
    /// Accrual rate granted by the tier. Replaces the current rate.
    pub multiplier: f64,
}

impl UpgradeTier {
    fn new(label: &str, price: f64, multiplier: f64) -> Self {
        Self {
            label: label.to_string(),
            price,
            multiplier,
        }
    }

    pub fn default_table() -> Vec<UpgradeTier> {
        vec![
            UpgradeTier::new("Starter Rig", 0.5, 1.0),
            UpgradeTier::new("Turbo Rig", 1.0, 2.5),
            UpgradeTier::new("Quantum Rig", 2.5, 5.0),
            UpgradeTier::new("Galaxy Rig", 5.0, 10.0),
        ]
    }

    pub fn discounted_price(&self, discount_percent: f64) -> f64 {
        self.price * (1.0 - discount_percent / 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ClaimRejected {
    #[error("{pending:.6} TON pending, at least {minimum:.4} TON needed to claim")]
    BelowMinimum { pending: f64, minimum: f64 },
}

/// Moves all pending earnings into the spendable balance.
pub fn claim(profile: &mut Profile, minimum: f64) -> Result<f64, ClaimRejected> {
    let pending = profile.pending_earnings;
    if pending <= 0.0 || pending + EPSILON < minimum {
        return Err(ClaimRejected::BelowMinimum { pending, minimum });
    }
    profile.spendable_balance += pending;
    profile.pending_earnings = 0.0;
    Ok(pending)
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UpgradeBlocked {
    #[error("no upgrade tier #{0}")]
    UnknownTier(usize),
    #[error("this speed is already active")]
    AlreadyActive,
    #[error("you have {balance:.4} TON, this upgrade costs {price:.4} TON")]
    InsufficientBalance { price: f64, balance: f64 },
    #[error("connect a wallet to pay")]
    WalletNotConnected,
    #[error(transparent)]
    PaymentFailed(PaymentError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeReceipt {
    pub tier: UpgradeTier,
    pub price: f64,
    pub previous_rate: f64,
    pub tx: Option<TxReceipt>,
}

/// Buys tier `index` of the configured table.
///
/// In [`PaymentMode::Balance`] the discounted price is debited from the
/// spendable balance. In [`PaymentMode::Wallet`] the price goes out through
/// the wallet and the balance is not touched; the rate only changes once the
/// payment is confirmed.
pub fn purchase_upgrade(
    profile: &mut Profile,
    economy: &EconomyConfig,
    index: usize,
    wallet: &mut dyn Wallet,
) -> Result<UpgradeReceipt, UpgradeBlocked> {
    let tier = economy
        .tiers
        .get(index)
        .ok_or(UpgradeBlocked::UnknownTier(index))?;
    if (profile.accrual_rate - tier.multiplier).abs() < EPSILON {
        return Err(UpgradeBlocked::AlreadyActive);
    }
    let price = tier.discounted_price(economy.discount_percent);

    let tx = match economy.payment_mode {
        PaymentMode::Balance => {
            if profile.spendable_balance + EPSILON < price {
                return Err(UpgradeBlocked::InsufficientBalance {
                    price,
                    balance: profile.spendable_balance,
                });
            }
            profile.spendable_balance = (profile.spendable_balance - price).max(0.0);
            None
        }
        PaymentMode::Wallet => {
            if !wallet.is_connected() {
                return Err(UpgradeBlocked::WalletNotConnected);
            }
            let tx = wallet
                .send_payment(&economy.treasury_address, price)
                .map_err(UpgradeBlocked::PaymentFailed)?;
            Some(tx)
        }
    };

    let previous_rate = profile.accrual_rate;
    profile.accrual_rate = tier.multiplier;
    Ok(UpgradeReceipt {
        tier: tier.clone(),
        price,
        previous_rate,
        tx,
    })
}

/// Pays the withdrawal deposit through the wallet and marks it satisfied.
pub fn pay_deposit(
    profile: &mut Profile,
    economy: &EconomyConfig,
    wallet: &mut dyn Wallet,
) -> Result<TxReceipt, PaymentError> {
    let tx = wallet.send_payment(&economy.treasury_address, economy.deposit_amount)?;
    profile.deposit_satisfied = true;
    Ok(tx)
}

/// The first unmet withdrawal condition, checked balance → referrals → deposit.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum WithdrawBlocked {
    #[error("minimum {required:.1} TON required ({balance:.4}/{required:.1})")]
    InsufficientBalance { balance: f64, required: f64 },
    #[error(
        "invite {} more friends to enable withdrawal ({have}/{required})",
        missing_friends(.have, .required)
    )]
    NotEnoughReferrals { have: u32, required: u32 },
    #[error("deposit {amount:.1} TON to enable withdrawal")]
    DepositRequired { amount: f64 },
}

fn missing_friends(have: &u32, required: &u32) -> u32 {
    required.saturating_sub(*have)
}

pub fn check_withdraw(profile: &Profile, economy: &EconomyConfig) -> Result<(), WithdrawBlocked> {
    if profile.spendable_balance + EPSILON < economy.withdraw_min_balance {
        return Err(WithdrawBlocked::InsufficientBalance {
            balance: profile.spendable_balance,
            required: economy.withdraw_min_balance,
        });
    }
    if profile.referral_count < economy.withdraw_min_referrals {
        return Err(WithdrawBlocked::NotEnoughReferrals {
            have: profile.referral_count,
            required: economy.withdraw_min_referrals,
        });
    }
    if !profile.deposit_satisfied {
        return Err(WithdrawBlocked::DepositRequired {
            amount: economy.deposit_amount,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawReceipt {
    pub amount: f64,
    pub destination: String,
    pub requested_at: DateTime<Utc>,
}

/// Records a withdrawal request for the whole spendable balance. Settlement
/// happens outside the game.
pub fn withdraw(
    profile: &mut Profile,
    economy: &EconomyConfig,
    destination: &str,
    now: DateTime<Utc>,
) -> Result<WithdrawReceipt, WithdrawBlocked> {
    check_withdraw(profile, economy)?;
    let amount = profile.spendable_balance;
    profile.spendable_balance = 0.0;
    Ok(WithdrawReceipt {
        amount,
        destination: destination.to_string(),
        requested_at: now,
    })
}

/// Credits a task or referral reward to the spendable balance.
pub fn credit_reward(profile: &mut Profile, amount: f64) -> f64 {
    if amount > 0.0 && amount.is_finite() {
        profile.spendable_balance += amount;
        amount
    } else {
        0.0
    }
}
