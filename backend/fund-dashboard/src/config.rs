//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;

use crate::errors::{DashboardError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-RPC endpoint of the node (e.g. http://127.0.0.1:8545)
    pub rpc_url: String,
    /// The crowdfunding contract address
    pub contract_address: Address,
    /// Chain id the endpoint is expected to serve
    pub chain_id: u64,
    /// Port for the REST API server
    pub api_port: u16,
    /// Account announced as the active identity at start-up
    pub default_account: Option<Address>,
    /// Maximum number of balance reads in flight while aggregating
    pub balance_read_concurrency: usize,
    /// Deadline for a transaction confirmation; `None` waits forever
    pub confirmation_timeout: Option<Duration>,
    /// How often to poll for a transaction receipt
    pub receipt_poll_interval: Duration,
    /// How many times a rate-limited RPC request is retried
    pub rate_limit_retries: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let contract_address = lookup("CONTRACT_ADDRESS").ok_or_else(|| {
            DashboardError::Config("CONTRACT_ADDRESS environment variable is required".to_string())
        })?;

        let timeout_secs: u64 = parse(&var("CONFIRMATION_TIMEOUT_SECS", "300"), "CONFIRMATION_TIMEOUT_SECS")?;

        Ok(Config {
            rpc_url: var("RPC_URL", "http://127.0.0.1:8545"),
            contract_address: parse(&contract_address, "CONTRACT_ADDRESS")?,
            chain_id: parse(&var("CHAIN_ID", "31337"), "CHAIN_ID")?,
            api_port: parse(&var("API_PORT", "3001"), "API_PORT")?,
            default_account: lookup("DEFAULT_ACCOUNT")
                .filter(|s| !s.trim().is_empty())
                .map(|s| parse(&s, "DEFAULT_ACCOUNT"))
                .transpose()?,
            balance_read_concurrency: parse(
                &var("BALANCE_READ_CONCURRENCY", "8"),
                "BALANCE_READ_CONCURRENCY",
            )?,
            confirmation_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            receipt_poll_interval: Duration::from_millis(parse(
                &var("RECEIPT_POLL_INTERVAL_MS", "1000"),
                "RECEIPT_POLL_INTERVAL_MS",
            )?),
            rate_limit_retries: parse(&var("RPC_RATE_LIMIT_RETRIES", "5"), "RPC_RATE_LIMIT_RETRIES")?,
        })
    }
}

fn parse<T: FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| DashboardError::Config(format!("Invalid {key}")))
}
