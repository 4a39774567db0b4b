//! Drives a state-mutating contract call from submission to a terminal outcome.
//!
//! ```text
//! Idle → Submitting → AwaitingConfirmation → Confirmed | Reverted
//!              └────→ SubmissionFailed
//! ```
//!
//! Every terminal outcome returns the action to `Idle`. The busy flag is held
//! by an [`InFlight`] guard, so it is released on every exit path including
//! cancellation and panics. A second submission of the same action while one
//! is in flight is rejected with [`DashboardError::Busy`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Bytes, B256, U256};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{DashboardError, Result};
use crate::notify::{Level, Notification, NotificationSink};
use crate::ports::{CallContext, Confirmation, Receipt, RemoteWrite, TxHandle};
use crate::view::ViewStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxAction {
    Fund,
    Withdraw,
}

impl TxAction {
    fn pending_message(self) -> &'static str {
        match self {
            TxAction::Fund => "Sending transaction...",
            TxAction::Withdraw => "Withdrawing funds...",
        }
    }

    fn success_message(self) -> &'static str {
        match self {
            TxAction::Fund => "Transaction complete!",
            TxAction::Withdraw => "Withdraw complete!",
        }
    }

    fn failure_prefix(self) -> &'static str {
        match self {
            TxAction::Fund => "Funding failed",
            TxAction::Withdraw => "Withdraw failed",
        }
    }
}

impl fmt::Display for TxAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxAction::Fund => write!(f, "fund"),
            TxAction::Withdraw => write!(f, "withdraw"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxPhase {
    #[default]
    Idle,
    Submitting,
    AwaitingConfirmation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxOutcome {
    Pending { tx_hash: B256 },
    Confirmed { tx_hash: B256, block_number: Option<u64> },
    Reverted { tx_hash: B256, reason: String },
    SubmissionFailed { reason: String },
}

impl TxOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, TxOutcome::Confirmed { .. })
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            TxOutcome::Reverted { reason, .. } | TxOutcome::SubmissionFailed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Per-action slice of the view state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TxStatus {
    pub busy: bool,
    pub phase: TxPhase,
    /// Correlation id of the current or most recent submission.
    pub correlation_id: Option<Uuid>,
    pub outcome: Option<TxOutcome>,
}

#[derive(Clone)]
pub struct TxLifecycle {
    action: TxAction,
    writer: Arc<dyn RemoteWrite>,
    confirmer: Arc<dyn Confirmation>,
    notifier: Arc<dyn NotificationSink>,
    store: ViewStore,
    in_flight: Arc<AtomicBool>,
    confirmation_timeout: Option<Duration>,
}

impl TxLifecycle {
    pub fn new(
        action: TxAction,
        writer: Arc<dyn RemoteWrite>,
        confirmer: Arc<dyn Confirmation>,
        notifier: Arc<dyn NotificationSink>,
        store: ViewStore,
        confirmation_timeout: Option<Duration>,
    ) -> Self {
        Self {
            action,
            writer,
            confirmer,
            notifier,
            store,
            in_flight: Arc::new(AtomicBool::new(false)),
            confirmation_timeout,
        }
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Claim the action. Fails with `Busy` while another submission of the
    /// same action is still running.
    pub fn try_begin(&self) -> Result<InFlight> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DashboardError::Busy(self.action));
        }

        let correlation_id = Uuid::new_v4();
        let action = self.action;
        self.store.update(|view| {
            *view.tx_mut(action) = TxStatus {
                busy: true,
                phase: TxPhase::Idle,
                correlation_id: Some(correlation_id),
                outcome: None,
            };
        });

        Ok(InFlight {
            lifecycle: self.clone(),
            correlation_id,
        })
    }

    fn set_phase(&self, phase: TxPhase, outcome: Option<TxOutcome>) {
        let action = self.action;
        self.store.update(|view| {
            let status = view.tx_mut(action);
            status.phase = phase;
            status.outcome = outcome;
        });
    }

    async fn wait_for_receipt(&self, handle: &TxHandle, cancel: &CancellationToken) -> Result<Receipt> {
        let wait = async {
            match self.confirmation_timeout {
                Some(limit) => tokio::time::timeout(limit, self.confirmer.confirm(handle))
                    .await
                    .map_err(|_| DashboardError::ConfirmationTimeout(limit))
                    .and_then(|receipt| receipt),
                None => self.confirmer.confirm(handle).await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(DashboardError::Cancelled),
            receipt = wait => receipt,
        }
    }
}

/// A claimed submission slot. Dropping it clears the busy flag and returns
/// the action to `Idle`.
pub struct InFlight {
    lifecycle: TxLifecycle,
    correlation_id: Uuid,
}

impl InFlight {
    pub fn action(&self) -> TxAction {
        self.lifecycle.action
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    /// Submit the call and wait for its terminal outcome.
    pub async fn run(
        self,
        ctx: CallContext,
        calldata: Bytes,
        value: U256,
        cancel: CancellationToken,
    ) -> TxOutcome {
        let lc = &self.lifecycle;
        let action = lc.action;
        lc.notifier
            .notify(Notification::new(
                self.correlation_id,
                Level::Loading,
                action.pending_message(),
            ))
            .await;

        lc.set_phase(TxPhase::Submitting, None);
        debug!("{action} submitting (value {value} wei)");

        let submitted = lc.writer.write(&ctx, calldata, value).await;
        let handle = match submitted {
            Ok(handle) => handle,
            Err(e) => {
                return self
                    .finish(TxOutcome::SubmissionFailed {
                        reason: e.to_string(),
                    })
                    .await
            }
        };

        let tx_hash = handle.0;
        info!("{action} submitted: {tx_hash}");
        lc.set_phase(
            TxPhase::AwaitingConfirmation,
            Some(TxOutcome::Pending { tx_hash }),
        );

        let waited = lc.wait_for_receipt(&handle, &cancel).await;
        let outcome = match waited {
            Ok(receipt) if receipt.success => TxOutcome::Confirmed {
                tx_hash,
                block_number: receipt.block_number,
            },
            Ok(_) => TxOutcome::Reverted {
                tx_hash,
                reason: "transaction reverted on-chain".to_string(),
            },
            Err(e) => TxOutcome::Reverted {
                tx_hash,
                reason: e.to_string(),
            },
        };
        self.finish(outcome).await
    }

    async fn finish(self, outcome: TxOutcome) -> TxOutcome {
        let lc = &self.lifecycle;
        let action = lc.action;

        let notification = match outcome.failure_reason() {
            None => {
                info!("{action} confirmed: {outcome:?}");
                Notification::new(self.correlation_id, Level::Success, action.success_message())
            }
            Some(reason) => {
                warn!("{action} failed: {outcome:?}");
                Notification::new(
                    self.correlation_id,
                    Level::Error,
                    format!("{}: {reason}", action.failure_prefix()),
                )
            }
        };
        lc.notifier.notify(notification).await;

        let recorded = outcome.clone();
        lc.store.update(|view| view.tx_mut(action).outcome = Some(recorded));
        outcome
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let action = self.lifecycle.action;
        self.lifecycle.store.update(|view| {
            let status = view.tx_mut(action);
            status.busy = false;
            status.phase = TxPhase::Idle;
        });
        self.lifecycle.in_flight.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Toasts;
    use crate::testutil::{ctx, MockChain, ReceiptMode};

    fn lifecycle(chain: &Arc<MockChain>, timeout: Option<Duration>) -> (TxLifecycle, ViewStore, Arc<Toasts>) {
        let store = ViewStore::new();
        let toasts = Arc::new(Toasts::new());
        let lc = TxLifecycle::new(
            TxAction::Fund,
            chain.clone(),
            chain.clone(),
            toasts.clone(),
            store.clone(),
            timeout,
        );
        (lc, store, toasts)
    }

    async fn submit(lc: &TxLifecycle) -> TxOutcome {
        lc.try_begin()
            .unwrap()
            .run(ctx(), Bytes::new(), U256::from(1u64), CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn busy_flag_is_cleared_for_every_outcome() {
        let cases = [
            (false, ReceiptMode::Success),
            (false, ReceiptMode::Revert),
            (false, ReceiptMode::Error),
            (true, ReceiptMode::Success),
            (true, ReceiptMode::Revert),
            (true, ReceiptMode::Error),
        ];

        for (write_fails, receipt) in cases {
            let chain = MockChain::new();
            chain.set_write_fails(write_fails).await;
            chain.set_receipt_mode(receipt).await;
            let (lc, store, _) = lifecycle(&chain, None);

            let outcome = submit(&lc).await;

            assert!(!matches!(outcome, TxOutcome::Pending { .. }));
            assert!(!lc.is_busy());
            let status = store.snapshot().fund;
            assert!(!status.busy, "busy left set for {write_fails} / {receipt:?}");
            assert_eq!(status.phase, TxPhase::Idle);
            assert_eq!(status.outcome, Some(outcome.clone()));

            match (write_fails, receipt) {
                (true, _) => assert!(matches!(outcome, TxOutcome::SubmissionFailed { .. })),
                (false, ReceiptMode::Success) => assert!(outcome.is_confirmed()),
                (false, _) => assert!(matches!(outcome, TxOutcome::Reverted { .. })),
            }
        }
    }

    #[tokio::test]
    async fn submission_failure_keeps_the_underlying_message() {
        let chain = MockChain::new();
        chain.set_write_fails(true).await;
        let (lc, _, toasts) = lifecycle(&chain, None);

        let outcome = submit(&lc).await;

        assert_eq!(
            outcome,
            TxOutcome::SubmissionFailed {
                reason: "Transaction submission failed: user rejected the request".to_string()
            }
        );
        let recent = toasts.recent().await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].level, Level::Error);
        assert!(recent[0].message.starts_with("Funding failed: "));
        assert_eq!(chain.confirmations(), 0);
    }

    #[tokio::test]
    async fn second_submission_is_rejected_while_in_flight() {
        let chain = MockChain::new();
        let (lc, store, _) = lifecycle(&chain, None);

        let first = lc.try_begin().unwrap();
        assert!(store.snapshot().fund.busy);
        assert!(matches!(lc.try_begin(), Err(DashboardError::Busy(TxAction::Fund))));

        drop(first);
        assert!(!store.snapshot().fund.busy);
        assert!(lc.try_begin().is_ok());
    }

    #[tokio::test]
    async fn hung_confirmation_times_out_as_reverted() {
        let chain = MockChain::new();
        chain.set_receipt_mode(ReceiptMode::Hang).await;
        let (lc, store, _) = lifecycle(&chain, Some(Duration::from_millis(50)));

        let outcome = submit(&lc).await;

        match outcome {
            TxOutcome::Reverted { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("expected a reverted outcome, got {other:?}"),
        }
        assert!(!store.snapshot().fund.busy);
    }

    #[tokio::test]
    async fn cancellation_ends_the_wait() {
        let chain = MockChain::new();
        chain.set_receipt_mode(ReceiptMode::Hang).await;
        let (lc, store, _) = lifecycle(&chain, None);
        let cancel = CancellationToken::new();

        let flight = lc.try_begin().unwrap();
        let task = tokio::spawn(flight.run(ctx(), Bytes::new(), U256::from(1u64), cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.snapshot().fund.phase, TxPhase::AwaitingConfirmation);
        assert!(matches!(
            store.snapshot().fund.outcome,
            Some(TxOutcome::Pending { .. })
        ));

        cancel.cancel();
        let outcome = task.await.unwrap();

        assert_eq!(
            outcome,
            TxOutcome::Reverted {
                tx_hash: B256::with_last_byte(1),
                reason: "Operation cancelled".to_string()
            }
        );
        assert!(!lc.is_busy());
    }
}
