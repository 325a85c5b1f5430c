use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("remote task service failed: {0}")]
    Remote(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PaymentError {
    #[error("wallet is not connected")]
    NotConnected,
    #[error("payment of {amount:.4} TON was rejected by the wallet")]
    Rejected { amount: f64 },
    #[error("invalid payment amount {0}")]
    InvalidAmount(f64),
}
