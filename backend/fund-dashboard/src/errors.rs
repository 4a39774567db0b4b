//! Application-wide error types.

use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::TxAction;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ABI error: {0}")]
    Abi(#[from] alloy_sol_types::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The node answered with a JSON-RPC error object (reverts land here).
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Remote read failed: {0}")]
    RemoteRead(String),

    #[error("Transaction submission failed: {0}")]
    RemoteWrite(String),

    #[error("Confirmation failed: {0}")]
    Confirmation(String),

    #[error("Confirmation timed out after {0:?}")]
    ConfirmationTimeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A {0} transaction is already in flight")]
    Busy(TxAction),

    #[error("Only the contract owner may withdraw")]
    NotOwner,
}

pub type Result<T> = std::result::Result<T, DashboardError>;
