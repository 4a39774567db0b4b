//! The UI-facing snapshot of contract state.
//!
//! Only the dashboard core writes it; the presentation layer reads snapshots.
//! Every identity change starts a new epoch. Within an epoch each read
//! pipeline hands out increasing [`Ticket`]s, and only the newest ticket of
//! the current epoch may write, so an older read can never overwrite a newer
//! one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::Address;
use serde::Serialize;
use tokio::sync::watch;

use crate::aggregator::AggregateStats;
use crate::amount::Amount;
use crate::lifecycle::{TxAction, TxStatus};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ViewState {
    pub account: Option<Address>,
    pub owner: Option<Address>,
    pub user_balance: Option<Amount>,
    pub stats: AggregateStats,
    pub is_fetching_balance: bool,
    pub is_loading_stats: bool,
    pub fund: TxStatus,
    pub withdraw: TxStatus,
}

impl ViewState {
    /// Withdrawing is offered only to the owner. Until the owner is known
    /// the answer is no.
    pub fn can_withdraw(&self) -> bool {
        matches!((self.account, self.owner), (Some(account), Some(owner)) if account == owner)
    }

    pub fn tx_mut(&mut self, action: TxAction) -> &mut TxStatus {
        match action {
            TxAction::Fund => &mut self.fund,
            TxAction::Withdraw => &mut self.withdraw,
        }
    }
}

/// Read pipelines whose results land in the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    Balance,
    Owner,
    Stats,
}

impl Pipeline {
    fn slot(self) -> usize {
        match self {
            Pipeline::Balance => 0,
            Pipeline::Owner => 1,
            Pipeline::Stats => 2,
        }
    }
}

/// Issued when a pipeline run starts; grants write access while it is the
/// newest run of its pipeline in the current epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pipeline: Pipeline,
    epoch: u64,
    seq: u64,
}

#[derive(Clone)]
pub struct ViewStore {
    state: Arc<watch::Sender<ViewState>>,
    epoch: Arc<AtomicU64>,
    requests: Arc<[AtomicU64; 3]>,
}

impl ViewStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ViewState::default());
        Self {
            state: Arc::new(state),
            epoch: Arc::new(AtomicU64::new(0)),
            requests: Arc::new([AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)]),
        }
    }

    pub fn snapshot(&self) -> ViewState {
        self.state.borrow().clone()
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Apply `f` unconditionally.
    pub fn update(&self, f: impl FnOnce(&mut ViewState)) {
        self.state.send_modify(f);
    }

    /// Start a run of `pipeline` on behalf of `epoch`. Every earlier ticket
    /// of the same pipeline loses its write access.
    pub fn begin(&self, pipeline: Pipeline, epoch: u64) -> Ticket {
        let seq = self.requests[pipeline.slot()].fetch_add(1, Ordering::SeqCst) + 1;
        Ticket {
            pipeline,
            epoch,
            seq,
        }
    }

    /// Whether `ticket` is the newest run of its pipeline for the active
    /// identity.
    pub fn is_latest(&self, ticket: Ticket) -> bool {
        self.epoch.load(Ordering::SeqCst) == ticket.epoch
            && self.requests[ticket.pipeline.slot()].load(Ordering::SeqCst) == ticket.seq
    }

    /// Apply `f` only while `ticket` is the newest run of its pipeline.
    /// Returns whether the write was applied.
    pub fn update_if_latest(&self, ticket: Ticket, f: impl FnOnce(&mut ViewState)) -> bool {
        self.state.send_if_modified(|view| {
            if !self.is_latest(ticket) {
                return false;
            }
            f(view);
            true
        })
    }

    /// Switch the active identity and return the new epoch. Identity-bound
    /// data of the previous account is cleared.
    pub fn switch_account(&self, account: Option<Address>) -> u64 {
        let mut epoch = 0;
        self.state.send_modify(|view| {
            epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            view.account = account;
            view.user_balance = None;
            view.is_fetching_balance = false;
        });
        epoch
    }
}

impl Default for ViewStore {
    fn default() -> Self {
        Self::new()
    }
}
