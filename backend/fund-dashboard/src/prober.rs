//! Enumerates a remote array that has no length accessor.
//!
//! Index 0, 1, 2, … is read strictly one after another until a read fails.
//! The failing read marks the end of the collection. This costs one request
//! per element plus the terminating one, and a transient failure at index
//! `k` is indistinguishable from a collection of length `k`.

use std::future::Future;

use futures_util::stream::{self, Stream, TryStreamExt};
use tracing::debug;

use crate::errors::{DashboardError, Result};

/// Decides whether a failed read ends the collection (`true`) or fails the
/// whole probe (`false`).
pub type StopPredicate = fn(&DashboardError) -> bool;

/// Treat every failure as "index out of range".
pub fn any_error(_: &DashboardError) -> bool {
    true
}

/// An element found by probing, with its position in the remote collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probed<T> {
    pub index: u64,
    pub value: T,
}

/// Lazily probe the collection starting at index 0.
///
/// Each call starts over; there is no resumable cursor.
pub fn probe<T, F, Fut>(read: F, stop: StopPredicate) -> impl Stream<Item = Result<Probed<T>>>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    stream::unfold(Some((read, 0u64)), move |state| async move {
        let Some((mut read, index)) = state else {
            return None;
        };
        match read(index).await {
            Ok(value) => Some((Ok(Probed { index, value }), Some((read, index + 1)))),
            Err(e) if stop(&e) => {
                debug!("Probe ended at index {index}: {e}");
                None
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// Probe the whole collection and collect it in index order.
pub async fn probe_all<T, F, Fut>(read: F, stop: StopPredicate) -> Result<Vec<Probed<T>>>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    probe(read, stop).try_collect().await
}
