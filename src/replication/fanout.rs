//! Fan-out Executor
//!
//! Runs one operation against every replica concurrently and waits for all
//! of them, collecting per-peer outcomes into an [`AggregatedResult`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::ReplicaSet;
use crate::error::{Error, PeerFailures, Result};
use crate::network::Location;

/// Outcome reported by a single peer
#[derive(Debug)]
pub struct PeerResult {
    /// Peer url the operation was sent to
    pub host: String,
    pub error: Option<Error>,
}

/// Outcomes of one fan-out, in the order peers reported
#[derive(Debug, Default)]
pub struct AggregatedResult {
    results: Vec<PeerResult>,
}

impl AggregatedResult {
    /// True iff every peer succeeded
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.error.is_none())
    }

    /// Number of peers that reported
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// The error a given peer reported, if any
    pub fn error_for(&self, host: &str) -> Option<&Error> {
        self.results
            .iter()
            .find(|r| r.host == host)
            .and_then(|r| r.error.as_ref())
    }

    pub fn results(&self) -> &[PeerResult] {
        &self.results
    }

    /// Failing peers as `[host]: message` lines, or `None` when all succeeded
    pub fn failures(&self) -> Option<PeerFailures> {
        let failures: Vec<(String, String)> = self
            .results
            .iter()
            .filter_map(|r| r.error.as_ref().map(|e| (r.host.clone(), e.to_string())))
            .collect();

        if failures.is_empty() {
            None
        } else {
            Some(PeerFailures::new(failures))
        }
    }
}

/// Dispatch `op` to every location in `replicas` at once and wait for all of
/// them. A failing peer never cuts the wait short.
///
/// There is no timeout here: a peer call that never returns stalls the whole
/// fan-out, so the transport behind `op` must bound its own calls.
pub async fn fan_out<F, Fut>(replicas: &ReplicaSet, op: F) -> AggregatedResult
where
    F: Fn(Location) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let expected = replicas.len();
    if expected == 0 {
        return AggregatedResult::default();
    }

    let op = Arc::new(op);
    let (tx, mut rx) = mpsc::channel::<PeerResult>(expected);

    for location in replicas.iter().cloned() {
        let tx = tx.clone();
        let op = Arc::clone(&op);
        tokio::spawn(async move {
            let host = location.url.clone();
            let error = op(location).await.err();
            let _ = tx.send(PeerResult { host, error }).await;
        });
    }
    drop(tx);

    let mut results = Vec::with_capacity(expected);
    while let Some(result) = rx.recv().await {
        if let Some(e) = &result.error {
            tracing::warn!("Replica {} failed: {}", result.host, e);
        }
        results.push(result);
    }

    // A task that panicked dropped its sender without reporting
    if results.len() < expected {
        for location in replicas.iter() {
            if !results.iter().any(|r| r.host == location.url) {
                tracing::error!("Replication task for {} ended without reporting", location.url);
                results.push(PeerResult {
                    host: location.url.clone(),
                    error: Some(Error::TaskAborted(location.url.clone())),
                });
            }
        }
    }

    AggregatedResult { results }
}
