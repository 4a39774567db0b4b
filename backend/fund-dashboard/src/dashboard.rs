//! Keeps the [`ViewState`] in sync with the contract.
//!
//! Three read pipelines feed the view: the active account's funded balance,
//! the contract owner and the aggregate funding statistics. They run
//! concurrently whenever the identity changes and none of them waits on, or
//! is invalidated by, a failure of another. A confirmed fund or withdraw
//! re-runs the balance and statistics pipelines; the owner is not expected
//! to change and is left alone.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, U256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::aggregator::aggregate;
use crate::amount::Amount;
use crate::config::Config;
use crate::contract::FundContract;
use crate::errors::{DashboardError, Result};
use crate::lifecycle::{InFlight, TxAction, TxLifecycle, TxOutcome};
use crate::notify::{Notification, NotificationSink};
use crate::ports::{CallContext, Ports};
use crate::prober::{self, StopPredicate};
use crate::view::{Pipeline, Ticket, ViewState, ViewStore};

#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub contract: Address,
    pub chain_id: u64,
    pub balance_read_concurrency: usize,
    pub confirmation_timeout: Option<Duration>,
    /// Which failed `getFunder` reads mark the end of the funder list.
    pub probe_stop: StopPredicate,
}

impl DashboardSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            contract: config.contract_address,
            chain_id: config.chain_id,
            balance_read_concurrency: config.balance_read_concurrency,
            confirmation_timeout: config.confirmation_timeout,
            probe_stop: prober::any_error,
        }
    }
}

/// A validated mutation holding its action's busy slot.
pub struct PreparedTx {
    flight: InFlight,
    ctx: CallContext,
    calldata: Bytes,
    value: U256,
}

impl PreparedTx {
    pub fn action(&self) -> TxAction {
        self.flight.action()
    }

    pub fn correlation_id(&self) -> Uuid {
        self.flight.correlation_id()
    }
}

pub struct Dashboard {
    settings: DashboardSettings,
    contract: FundContract,
    store: ViewStore,
    notifier: Arc<dyn NotificationSink>,
    fund_tx: TxLifecycle,
    withdraw_tx: TxLifecycle,
    shutdown: CancellationToken,
}

impl Dashboard {
    pub fn new(
        ports: Ports,
        settings: DashboardSettings,
        notifier: Arc<dyn NotificationSink>,
        shutdown: CancellationToken,
    ) -> Self {
        let store = ViewStore::new();
        let lifecycle = |action| {
            TxLifecycle::new(
                action,
                ports.writer.clone(),
                ports.confirmer.clone(),
                notifier.clone(),
                store.clone(),
                settings.confirmation_timeout,
            )
        };
        let fund_tx = lifecycle(TxAction::Fund);
        let withdraw_tx = lifecycle(TxAction::Withdraw);

        Self {
            contract: FundContract::new(ports.reader.clone()),
            settings,
            store,
            notifier,
            fund_tx,
            withdraw_tx,
            shutdown,
        }
    }

    pub fn snapshot(&self) -> ViewState {
        self.store.snapshot()
    }

    fn context(&self) -> CallContext {
        CallContext {
            contract: self.settings.contract,
            chain_id: self.settings.chain_id,
            account: self.store.snapshot().account,
        }
    }

    // ─────────────────────────────────────────────────────
    // Read pipelines
    // ─────────────────────────────────────────────────────

    /// Switch the active identity and re-derive everything for it.
    pub async fn set_account(&self, account: Option<Address>) {
        let epoch = self.store.switch_account(account);
        match account {
            Some(account) => info!("Active account changed to {account}"),
            None => info!("Active account cleared"),
        }
        self.run_pipelines(epoch).await;
    }

    /// Re-run all three pipelines for the current identity.
    pub async fn refresh(&self) {
        self.run_pipelines(self.store.epoch()).await;
    }

    async fn run_pipelines(&self, epoch: u64) {
        tokio::join!(
            self.refresh_balance(epoch),
            self.refresh_owner(epoch),
            self.refresh_stats(epoch),
        );
    }

    async fn refresh_balance(&self, epoch: u64) {
        let ctx = self.context();
        let Some(account) = ctx.account else {
            return;
        };

        let ticket = self.store.begin(Pipeline::Balance, epoch);
        self.store
            .update_if_latest(ticket, |view| view.is_fetching_balance = true);
        match self.contract.amount_funded(&ctx, account).await {
            Ok(balance) => {
                self.apply(ticket, |view| {
                    view.user_balance = Some(balance);
                    view.is_fetching_balance = false;
                });
            }
            Err(e) => {
                self.store
                    .update_if_latest(ticket, |view| view.is_fetching_balance = false);
                self.report(ticket, format!("Couldn't fetch balance: {e}")).await;
            }
        }
    }

    async fn refresh_owner(&self, epoch: u64) {
        let ctx = self.context();
        let ticket = self.store.begin(Pipeline::Owner, epoch);
        match self.contract.owner(&ctx).await {
            Ok(owner) => self.apply(ticket, |view| view.owner = Some(owner)),
            Err(e) => self.report(ticket, format!("Failed to fetch owner: {e}")).await,
        }
    }

    async fn refresh_stats(&self, epoch: u64) {
        let ctx = self.context();
        let contract = &self.contract;

        let ticket = self.store.begin(Pipeline::Stats, epoch);
        self.store
            .update_if_latest(ticket, |view| view.is_loading_stats = true);
        let probed = prober::probe_all(
            |index| contract.funder(&ctx, index),
            self.settings.probe_stop,
        )
        .await;

        match probed {
            Ok(funders) => {
                debug!("Probed {} funder records", funders.len());
                let stats = aggregate(
                    &funders,
                    |funder| contract.amount_funded(&ctx, funder),
                    self.settings.balance_read_concurrency,
                )
                .await;
                self.apply(ticket, |view| {
                    view.stats = stats;
                    view.is_loading_stats = false;
                });
            }
            Err(e) => {
                self.store
                    .update_if_latest(ticket, |view| view.is_loading_stats = false);
                self.report(ticket, format!("Failed to fetch stats: {e}")).await;
            }
        }
    }

    fn apply(&self, ticket: Ticket, f: impl FnOnce(&mut ViewState)) {
        if !self.store.update_if_latest(ticket, f) {
            debug!("Discarding superseded {ticket:?} read");
        }
    }

    async fn report(&self, ticket: Ticket, message: String) {
        if !self.store.is_latest(ticket) {
            debug!("Discarding failure of superseded {ticket:?} read: {message}");
            return;
        }
        self.notifier.notify(Notification::error(message)).await;
    }

    // ─────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────

    /// Validate a funding request and claim the fund slot.
    ///
    /// Nothing is sent and no state changes when the amount is not a
    /// positive ether value.
    pub fn prepare_fund(&self, amount: &str) -> Result<PreparedTx> {
        let value = Amount::parse_positive_ether(amount)?;
        let flight = self.fund_tx.try_begin()?;
        Ok(PreparedTx {
            flight,
            ctx: self.context(),
            calldata: FundContract::fund_calldata(),
            value: value.wei(),
        })
    }

    /// Claim the withdraw slot. Only offered to the contract owner.
    pub fn prepare_withdraw(&self) -> Result<PreparedTx> {
        if !self.store.snapshot().can_withdraw() {
            return Err(DashboardError::NotOwner);
        }
        let flight = self.withdraw_tx.try_begin()?;
        Ok(PreparedTx {
            flight,
            ctx: self.context(),
            calldata: FundContract::withdraw_calldata(),
            value: U256::ZERO,
        })
    }

    /// Drive a prepared mutation to its terminal outcome, refreshing the
    /// balance and statistics when it is confirmed.
    pub async fn execute(&self, tx: PreparedTx) -> TxOutcome {
        let PreparedTx {
            flight,
            ctx,
            calldata,
            value,
        } = tx;
        let outcome = flight
            .run(ctx, calldata, value, self.shutdown.child_token())
            .await;

        if outcome.is_confirmed() {
            let epoch = self.store.epoch();
            tokio::join!(self.refresh_balance(epoch), self.refresh_stats(epoch));
        }
        outcome
    }

    /// Run a prepared mutation in the background and return its correlation id.
    pub fn spawn(self: &Arc<Self>, tx: PreparedTx) -> Uuid {
        let id = tx.correlation_id();
        let action = tx.action();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = this.execute(tx).await;
            debug!("Background {action} finished: {outcome:?}");
        });
        id
    }
}

/// Foreground variants of the mutation entry points.
#[cfg(test)]
impl Dashboard {
    pub fn store(&self) -> &ViewStore {
        &self.store
    }

    pub async fn fund(&self, amount: &str) -> Result<TxOutcome> {
        let tx = self.prepare_fund(amount)?;
        Ok(self.execute(tx).await)
    }

    pub async fn withdraw(&self) -> Result<TxOutcome> {
        let tx = self.prepare_withdraw()?;
        Ok(self.execute(tx).await)
    }
}
