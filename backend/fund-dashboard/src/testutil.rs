//! In-memory chain implementing every port, for tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolInterface, SolValue};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::contract::IFundContract::IFundContractCalls;
use crate::errors::{DashboardError, Result};
use crate::ports::{CallContext, Confirmation, Receipt, RemoteRead, RemoteWrite, TxHandle};

pub const CONTRACT: Address = Address::new([0xc0; 20]);
pub const CHAIN_ID: u64 = 31337;

pub fn ctx() -> CallContext {
    CallContext {
        contract: CONTRACT,
        chain_id: CHAIN_ID,
        account: Some(Address::repeat_byte(0x01)),
    }
}

pub fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptMode {
    Success,
    Revert,
    Error,
    Hang,
}

#[derive(Debug, Clone)]
enum PendingEffect {
    Fund { from: Address, value: U256 },
    Withdraw,
}

struct ChainState {
    owner: Option<Address>,
    funders: Vec<Address>,
    balances: HashMap<Address, U256>,
    failing_balances: HashSet<Address>,
    write_fails: bool,
    receipt_mode: ReceiptMode,
    pending: HashMap<B256, PendingEffect>,
    read_delay: Duration,
}

pub struct MockChain {
    state: Mutex<ChainState>,
    funder_reads: AtomicUsize,
    balance_reads: AtomicUsize,
    owner_reads: AtomicUsize,
    writes: AtomicUsize,
    confirmations: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ChainState {
                owner: None,
                funders: Vec::new(),
                balances: HashMap::new(),
                failing_balances: HashSet::new(),
                write_fails: false,
                receipt_mode: ReceiptMode::Success,
                pending: HashMap::new(),
                read_delay: Duration::ZERO,
            }),
            funder_reads: AtomicUsize::new(0),
            balance_reads: AtomicUsize::new(0),
            owner_reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            confirmations: AtomicUsize::new(0),
        })
    }

    pub async fn set_owner(&self, owner: Address) {
        self.state.lock().await.owner = Some(owner);
    }

    /// Record a funding as the contract would: append to the funder list and
    /// credit the balance.
    pub async fn add_funding(&self, funder: Address, amount: U256) {
        let mut state = self.state.lock().await;
        state.funders.push(funder);
        *state.balances.entry(funder).or_default() += amount;
    }

    pub async fn fail_balance_of(&self, funder: Address) {
        self.state.lock().await.failing_balances.insert(funder);
    }

    pub async fn set_write_fails(&self, fails: bool) {
        self.state.lock().await.write_fails = fails;
    }

    pub async fn set_receipt_mode(&self, mode: ReceiptMode) {
        self.state.lock().await.receipt_mode = mode;
    }

    /// Reads answer with the state at request time but arrive `delay` later.
    pub async fn set_read_delay(&self, delay: Duration) {
        self.state.lock().await.read_delay = delay;
    }

    pub fn funder_reads(&self) -> usize {
        self.funder_reads.load(Ordering::SeqCst)
    }

    pub fn balance_reads(&self) -> usize {
        self.balance_reads.load(Ordering::SeqCst)
    }

    pub fn owner_reads(&self) -> usize {
        self.owner_reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn confirmations(&self) -> usize {
        self.confirmations.load(Ordering::SeqCst)
    }
}

fn reverted() -> DashboardError {
    DashboardError::Rpc {
        code: 3,
        message: "execution reverted".to_string(),
    }
}

impl MockChain {
    fn answer(&self, state: &ChainState, calldata: &Bytes) -> Result<Bytes> {
        let encoded = match IFundContractCalls::abi_decode(calldata, true)? {
            IFundContractCalls::getOwner(_) => {
                self.owner_reads.fetch_add(1, Ordering::SeqCst);
                state.owner.ok_or_else(reverted)?.abi_encode()
            }
            IFundContractCalls::getFunder(call) => {
                self.funder_reads.fetch_add(1, Ordering::SeqCst);
                let index: usize = call.index.to();
                state.funders.get(index).copied().ok_or_else(reverted)?.abi_encode()
            }
            IFundContractCalls::getAddressToAmountFunded(call) => {
                self.balance_reads.fetch_add(1, Ordering::SeqCst);
                if state.failing_balances.contains(&call.funder) {
                    return Err(DashboardError::RemoteRead("connection reset".to_string()));
                }
                state
                    .balances
                    .get(&call.funder)
                    .copied()
                    .unwrap_or_default()
                    .abi_encode()
            }
            IFundContractCalls::fund(_) | IFundContractCalls::withdraw(_) => {
                return Err(DashboardError::RemoteRead("not a view function".to_string()))
            }
        };
        Ok(encoded.into())
    }
}

#[async_trait]
impl RemoteRead for MockChain {
    async fn read(&self, ctx: &CallContext, calldata: Bytes) -> Result<Bytes> {
        assert_eq!(ctx.contract, CONTRACT);
        let (answer, delay) = {
            let state = self.state.lock().await;
            (self.answer(&state, &calldata), state.read_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        answer
    }
}

#[async_trait]
impl RemoteWrite for MockChain {
    async fn write(&self, ctx: &CallContext, calldata: Bytes, value: U256) -> Result<TxHandle> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock().await;
        if state.write_fails {
            return Err(DashboardError::RemoteWrite(
                "user rejected the request".to_string(),
            ));
        }
        let from = ctx
            .account
            .ok_or_else(|| DashboardError::RemoteWrite("no active account".to_string()))?;

        let effect = match IFundContractCalls::abi_decode(&calldata, true) {
            Ok(IFundContractCalls::withdraw(_)) => PendingEffect::Withdraw,
            _ => PendingEffect::Fund { from, value },
        };
        let hash = B256::with_last_byte(n as u8);
        state.pending.insert(hash, effect);
        Ok(TxHandle(hash))
    }
}

#[async_trait]
impl Confirmation for MockChain {
    async fn confirm(&self, handle: &TxHandle) -> Result<Receipt> {
        self.confirmations.fetch_add(1, Ordering::SeqCst);
        let mode = self.state.lock().await.receipt_mode;
        match mode {
            ReceiptMode::Hang => std::future::pending().await,
            ReceiptMode::Error => Err(DashboardError::Confirmation(
                "receipt wait failed".to_string(),
            )),
            ReceiptMode::Revert => Ok(Receipt {
                tx_hash: handle.0,
                block_number: Some(1),
                success: false,
            }),
            ReceiptMode::Success => {
                let mut state = self.state.lock().await;
                match state.pending.remove(&handle.0) {
                    Some(PendingEffect::Fund { from, value }) => {
                        state.funders.push(from);
                        *state.balances.entry(from).or_default() += value;
                    }
                    Some(PendingEffect::Withdraw) => {
                        state.funders.clear();
                        state.balances.clear();
                    }
                    None => {}
                }
                Ok(Receipt {
                    tx_hash: handle.0,
                    block_number: Some(1),
                    success: true,
                })
            }
        }
    }
}
