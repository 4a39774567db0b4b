//! Boundaries between the dashboard core and the chain.
//!
//! Every call carries an explicit [`CallContext`] (contract, chain, active
//! account) so nothing in the core reads wallet or chain state ambiently.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::Serialize;

use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub contract: Address,
    pub chain_id: u64,
    /// The active account, `None` when no wallet is connected.
    pub account: Option<Address>,
}

/// Handle of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TxHandle(pub B256);

/// Terminal result of waiting on a [`TxHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// Single request/response read against contract state.
///
/// `calldata` is the function selector followed by the ABI encoded arguments;
/// the returned bytes are the ABI encoded return value.
#[async_trait]
pub trait RemoteRead: Send + Sync {
    async fn read(&self, ctx: &CallContext, calldata: Bytes) -> Result<Bytes>;
}

/// Submits a state-mutating call, attaching `value` wei.
#[async_trait]
pub trait RemoteWrite: Send + Sync {
    async fn write(&self, ctx: &CallContext, calldata: Bytes, value: U256) -> Result<TxHandle>;
}

/// Resolves a submitted transaction to its receipt.
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn confirm(&self, handle: &TxHandle) -> Result<Receipt>;
}

/// The three ports bundled together.
#[derive(Clone)]
pub struct Ports {
    pub reader: Arc<dyn RemoteRead>,
    pub writer: Arc<dyn RemoteWrite>,
    pub confirmer: Arc<dyn Confirmation>,
}

impl Ports {
    /// Use one backend for reads, writes and confirmations.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: RemoteRead + RemoteWrite + Confirmation + 'static,
    {
        Ports {
            reader: backend.clone(),
            writer: backend.clone(),
            confirmer: backend,
        }
    }
}
