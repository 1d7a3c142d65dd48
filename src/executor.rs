//! Bounded concurrent execution of atomic sub-requests.
//!
//! One failed fetch never cancels its siblings: each sub-request ends in an
//! explicit success or failure outcome, and the batch returns only once
//! every outcome is in. Completion order is unconstrained; the keys carried
//! on the outcomes let reassembly restore a deterministic order.

use std::fmt::Display;
use std::future::Future;

use futures_util::{stream, StreamExt};
use log::{debug, warn};

/// Terminal state of one sub-request.
#[derive(Debug)]
pub struct BatchOutcome<K, T, E> {
    pub key: K,
    pub result: Result<T, E>,
}

/// Runs every item through `fetch` with at most `worker_limit` in flight.
///
/// Failures are logged and captured in the returned outcomes; there is no
/// per-item retry. The returned vector is in completion order.
pub async fn fetch_all<I, K, T, E, F, Fut>(
    items: Vec<I>,
    worker_limit: usize,
    fetch: F,
) -> Vec<BatchOutcome<K, T, E>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = (K, Result<T, E>)>,
    K: Display,
    E: Display,
{
    let limit = worker_limit.max(1);
    let total = items.len();

    let outcomes: Vec<BatchOutcome<K, T, E>> = stream::iter(items.into_iter().map(fetch))
        .buffer_unordered(limit)
        .map(|(key, result)| {
            if let Err(err) = &result {
                warn!("sub-request {key} failed: {err}");
            }
            BatchOutcome { key, result }
        })
        .collect()
        .await;

    let succeeded = outcomes.iter().filter(|o| o.result.is_ok()).count();
    debug!("batch complete: {succeeded}/{total} sub-requests succeeded");
    outcomes
}
