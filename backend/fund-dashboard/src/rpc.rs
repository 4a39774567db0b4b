//! Ethereum JSON-RPC client implementing the read, write and confirmation ports.
//!
//! ## Resilience
//!
//! * HTTP 429 responses are retried with exponential back-off, up to
//!   [`MAX_BACKOFF_SECS`] seconds between attempts, because the node never
//!   executed the request.
//! * Transport failures and JSON-RPC error objects are returned as-is. A
//!   failed `eth_call` is meaningful to callers (it ends funder probing) and
//!   must not be retried behind their back.

use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::{DashboardError, Result};
use crate::ports::{CallContext, Confirmation, Receipt, RemoteRead, RemoteWrite, TxHandle};

const MAX_BACKOFF_SECS: u64 = 60;
const INITIAL_BACKOFF_SECS: u64 = 2;

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<U64>,
    /// `0x1` on success, `0x0` on revert. Absent on pre-Byzantium chains.
    pub status: Option<U64>,
}

impl From<RawReceipt> for Receipt {
    fn from(raw: RawReceipt) -> Self {
        Receipt {
            tx_hash: raw.transaction_hash,
            block_number: raw.block_number.map(|n| n.to::<u64>()),
            success: raw.status.map_or(true, |s| s == U64::from(1u64)),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    url: String,
    chain_id: u64,
    receipt_poll_interval: Duration,
    rate_limit_retries: u32,
}

impl RpcClient {
    pub fn new(
        client: Client,
        url: impl Into<String>,
        chain_id: u64,
        receipt_poll_interval: Duration,
        rate_limit_retries: u32,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            chain_id,
            receipt_poll_interval,
            rate_limit_retries,
        }
    }

    /// Issue a JSON-RPC request whose `result` may legitimately be `null`.
    async fn request_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>> {
        let mut backoff = INITIAL_BACKOFF_SECS;
        let mut retries = 0;

        loop {
            let resp = self
                .client
                .post(&self.url)
                .json(&json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": method,
                    "params": params,
                }))
                .send()
                .await?;

            if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS
                && retries < self.rate_limit_retries
            {
                warn!("Rate-limited by RPC on {method} (will retry in {backoff}s)");
                tokio::time::sleep(Duration::from_secs(backoff)).await;
                backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
                retries += 1;
                continue;
            }

            let body: RpcResponse<T> = resp.error_for_status()?.json().await?;
            if let Some(err) = body.error {
                debug!("{method} returned RPC error {}: {}", err.code, err.message);
                return Err(DashboardError::Rpc {
                    code: err.code,
                    message: err.message,
                });
            }
            return Ok(body.result);
        }
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        self.request_optional(method, params).await?.ok_or_else(|| {
            DashboardError::RemoteRead(format!("Empty result from {method}"))
        })
    }

    /// Calls are only served for the chain this endpoint was configured for.
    fn check_chain(&self, ctx: &CallContext) -> std::result::Result<(), String> {
        if ctx.chain_id != self.chain_id {
            return Err(format!(
                "no RPC endpoint configured for chain {} (this endpoint serves {})",
                ctx.chain_id, self.chain_id
            ));
        }
        Ok(())
    }

    /// Ask the node which chain it serves.
    pub async fn chain_id(&self) -> Result<u64> {
        let id: U64 = self.request("eth_chainId", json!([])).await?;
        Ok(id.to::<u64>())
    }

    pub async fn call(&self, from: Option<Address>, to: Address, data: &Bytes) -> Result<Bytes> {
        let mut tx = json!({ "to": to, "data": data });
        if let Some(from) = from {
            tx["from"] = json!(from);
        }
        self.request("eth_call", json!([tx, "latest"])).await
    }

    pub async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: &Bytes,
        value: U256,
    ) -> Result<B256> {
        let tx = json!({
            "from": from,
            "to": to,
            "data": data,
            "value": value,
            "chainId": U64::from(self.chain_id),
        });
        self.request("eth_sendTransaction", json!([tx])).await
    }

    pub async fn transaction_receipt(&self, hash: B256) -> Result<Option<RawReceipt>> {
        self.request_optional("eth_getTransactionReceipt", json!([hash]))
            .await
    }
}

// ─────────────────────────────────────────────────────────
// Ports
// ─────────────────────────────────────────────────────────

#[async_trait]
impl RemoteRead for RpcClient {
    async fn read(&self, ctx: &CallContext, calldata: Bytes) -> Result<Bytes> {
        self.check_chain(ctx).map_err(DashboardError::RemoteRead)?;
        self.call(ctx.account, ctx.contract, &calldata).await
    }
}

#[async_trait]
impl RemoteWrite for RpcClient {
    async fn write(&self, ctx: &CallContext, calldata: Bytes, value: U256) -> Result<TxHandle> {
        self.check_chain(ctx).map_err(DashboardError::RemoteWrite)?;
        let from = ctx
            .account
            .ok_or_else(|| DashboardError::RemoteWrite("no account connected".to_string()))?;

        let hash = self
            .send_transaction(from, ctx.contract, &calldata, value)
            .await
            .map_err(|e| DashboardError::RemoteWrite(e.to_string()))?;
        Ok(TxHandle(hash))
    }
}

#[async_trait]
impl Confirmation for RpcClient {
    async fn confirm(&self, handle: &TxHandle) -> Result<Receipt> {
        loop {
            let receipt = self
                .transaction_receipt(handle.0)
                .await
                .map_err(|e| DashboardError::Confirmation(e.to_string()))?;
            if let Some(receipt) = receipt {
                return Ok(receipt.into());
            }
            debug!("No receipt yet for {}", handle.0);
            tokio::time::sleep(self.receipt_poll_interval).await;
        }
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
