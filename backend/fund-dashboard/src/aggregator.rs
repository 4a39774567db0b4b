//! Funding statistics derived from the probed funder list.

use std::future::Future;

use alloy_primitives::Address;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use crate::amount::Amount;
use crate::errors::Result;
use crate::prober::Probed;

/// A funder found at a position of the contract's funder array.
pub type FunderRecord = Probed<Address>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub funder_count: u64,
    pub total_funded: Amount,
}

/// Sum the funded amount of every probed record.
///
/// Every record counts as a funder, duplicates included. A record whose
/// balance cannot be read contributes zero to the total without aborting the
/// rest. At most `concurrency` reads are in flight at once and the result is
/// only produced once all of them have settled.
pub async fn aggregate<F, Fut>(
    funders: &[FunderRecord],
    balance_of: F,
    concurrency: usize,
) -> AggregateStats
where
    F: Fn(Address) -> Fut,
    Fut: Future<Output = Result<Amount>>,
{
    let total_funded = stream::iter(funders.iter().copied())
        .map(|record| {
            let read = balance_of(record.value);
            async move { (record, read.await) }
        })
        .buffer_unordered(concurrency.max(1))
        .fold(Amount::ZERO, |total, (record, read)| async move {
            match read {
                Ok(amount) => total.saturating_add(amount),
                Err(e) => {
                    warn!(
                        "Balance read failed for funder #{} ({}); counting it as zero: {e}",
                        record.index, record.value
                    );
                    total
                }
            }
        })
        .await;

    let stats = AggregateStats {
        funder_count: funders.len() as u64,
        total_funded,
    };
    debug!(
        "Aggregated {} funders → {}",
        stats.funder_count, stats.total_funded
    );
    stats
}
