//! Round scheduler and transport shim: parallel threads with cooperative
//! cancellation.
//!
//! Drives periodic `Tick` calls across an arbitrary number of
//! [`LinearEngine`] slots without any single lock serializing ticks
//! across items — each item's engine owns its own per-item lock. A
//! `tokio::time::interval` races against a shutdown signal via
//! `tokio::select!`, and each tick spawns independent per-item work.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::engines::linear::{Decision, LinearEngine};
use crate::ids::NodeId;
use crate::sampler::Sampler;

/// Drives concurrent ticks for a dynamic set of linear-chain items, each
/// backed by its own [`LinearEngine`]. Items register and deregister
/// independently of the scheduler's run loop.
pub struct Scheduler<T: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static> {
    engines: RwLock<HashMap<T, Arc<LinearEngine<T>>>>,
    sampler: Arc<dyn Sampler>,
    k: usize,
    period: Duration,
    shutdown: broadcast::Sender<()>,
}

impl<T: Clone + Eq + Hash + Send + Sync + std::fmt::Debug + 'static> Scheduler<T> {
    pub fn new(sampler: Arc<dyn Sampler>, k: usize, period: Duration) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            engines: RwLock::new(HashMap::new()),
            sampler,
            k,
            period,
            shutdown,
        }
    }

    /// Registers a new item for scheduling. A later tick notices it on the
    /// next pass; no ordering is implied relative to already-registered
    /// items — across items there is no ordering requirement.
    pub async fn register(&self, item: T, engine: Arc<LinearEngine<T>>) {
        self.engines.write().await.insert(item, engine);
    }

    /// Stops scheduling `item`. Idempotent.
    pub async fn deregister(&self, item: &T) {
        self.engines.write().await.remove(item);
    }

    /// Signals the run loop to stop after its current pass. Safe to call
    /// more than once.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Drives ticks on `self.period` until [`Scheduler::shutdown`] fires.
    /// Each pass fans out one concurrent tick per registered, not-yet-
    /// finalized item — no single global lock serializes ticks across
    /// items; finalized items are dropped from the active set once their
    /// decision is observed.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.period);
        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick_all().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }
    }

    /// One scheduling pass: snapshot the active item set, then tick each
    /// concurrently. Items that finalize this pass are removed so future
    /// passes don't re-tick decided slots.
    async fn tick_all(&self) {
        let snapshot: Vec<(T, Arc<LinearEngine<T>>)> = self
            .engines
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let peers = self.sampler.sample(self.k, "votes").await;
        let peers = Arc::new(peers);

        let mut handles = Vec::with_capacity(snapshot.len());
        for (item, engine) in snapshot {
            let peers = peers.clone();
            handles.push(tokio::spawn(async move {
                let result = engine.tick(&peers).await;
                (item, result)
            }));
        }

        for handle in handles {
            match handle.await {
                Ok((item, Ok(Decision::Pending))) => {
                    debug!(?item, "tick pending");
                }
                Ok((item, Ok(decision))) => {
                    info!(?item, ?decision, "item decided, deregistering");
                    self.deregister(&item).await;
                }
                Ok((item, Err(e))) => {
                    warn!(?item, error = %e, "tick returned an error");
                }
                Err(join_err) => {
                    warn!(error = %join_err, "tick task panicked");
                }
            }
        }
    }

    pub async fn active_count(&self) -> usize {
        self.engines.read().await.len()
    }
}

/// Convenience helper: asks the sampler for `k` peers under `topic`. Kept
/// as a free function since both `Scheduler` and callers driving a single
/// [`LinearEngine`] by hand need the same shape.
pub async fn sample_peers(sampler: &dyn Sampler, k: usize, topic: &str) -> Vec<NodeId> {
    sampler.sample(k, topic).await
}
