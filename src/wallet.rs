use chrono::{DateTime, Utc};
use nanoid::nanoid;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::PaymentError;

const ADDRESS_ALPHABET: &[char] = &[
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S',
    'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l',
    'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4',
    '5', '6', '7', '8', '9', '-', '_',
];

#[derive(Debug, Clone, PartialEq)]
pub struct TxReceipt {
    pub id: String,
    pub destination: String,
    pub amount: f64,
    pub sent_at: DateTime<Utc>,
}

pub type ConnectionListener = Box<dyn FnMut(bool)>;

/// The wallet-connection surface the game consumes.
pub trait Wallet {
    fn is_connected(&self) -> bool;
    fn address(&self) -> Option<&str>;
    fn open_connect_modal(&mut self);
    fn disconnect(&mut self);
    fn send_payment(&mut self, destination: &str, amount: f64) -> Result<TxReceipt, PaymentError>;
    fn on_connection_change(&mut self, listener: ConnectionListener);
}

/// Stand-in for a TON Connect session. Connecting always succeeds; each
/// payment is rejected with probability `rejection_rate`.
pub struct SimulatedWallet {
    address: Option<String>,
    rejection_rate: f64,
    rng: StdRng,
    listeners: Vec<ConnectionListener>,
}

impl SimulatedWallet {
    pub fn new(rejection_rate: f64) -> Self {
        Self::with_rng(rejection_rate, StdRng::from_entropy())
    }

    pub fn with_rng(rejection_rate: f64, rng: StdRng) -> Self {
        Self {
            address: None,
            rejection_rate: rejection_rate.clamp(0.0, 1.0),
            rng,
            listeners: Vec::new(),
        }
    }

    fn set_address(&mut self, address: Option<String>) {
        let was = self.address.is_some();
        self.address = address;
        let now = self.address.is_some();
        if was != now {
            for listener in self.listeners.iter_mut() {
                listener(now);
            }
        }
    }
}

impl Wallet for SimulatedWallet {
    fn is_connected(&self) -> bool {
        self.address.is_some()
    }

    fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    fn open_connect_modal(&mut self) {
        if self.address.is_none() {
            let address = format!("UQ{}", nanoid!(46, ADDRESS_ALPHABET));
            tracing::info!(%address, "wallet connected");
            self.set_address(Some(address));
        }
    }

    fn disconnect(&mut self) {
        if self.address.is_some() {
            tracing::info!("wallet disconnected");
        }
        self.set_address(None);
    }

    fn send_payment(&mut self, destination: &str, amount: f64) -> Result<TxReceipt, PaymentError> {
        if !self.is_connected() {
            return Err(PaymentError::NotConnected);
        }
        if !(amount.is_finite() && amount > 0.0) {
            return Err(PaymentError::InvalidAmount(amount));
        }
        if self.rng.gen_bool(self.rejection_rate) {
            return Err(PaymentError::Rejected { amount });
        }
        Ok(TxReceipt {
            id: nanoid!(12),
            destination: destination.to_string(),
            amount,
            sent_at: Utc::now(),
        })
    }

    fn on_connection_change(&mut self, listener: ConnectionListener) {
        self.listeners.push(listener);
    }
}
