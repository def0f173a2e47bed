//! Quasar: dual-certificate finality bundling into the append-only
//! finalized log.

use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::NovaResult;
use crate::ids::NodeId;

/// A dual-certificate finality bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateBundle<V> {
    pub vertex: V,
    pub round: u64,
    pub height: u64,
    pub classical_agg: Vec<u8>,
    pub pq_cert: Vec<u8>,
    pub signers: Vec<NodeId>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<V> CertificateBundle<V> {
    /// Dual-certificate validity: both aggregates verify over their
    /// digests and the signer set is a validator-set subset with total
    /// weight ≥ quorum.
    pub fn verify(
        &self,
        classical_digest: &[u8],
        pq_digest: &crate::ids::Digest,
        classical: &dyn crate::external::ClassicalCrypto,
        pq: &dyn crate::external::PqCrypto,
        validators: &dyn crate::external::ValidatorSet,
    ) -> bool {
        if !classical.verify_aggregate(&self.classical_agg, &self.signers, classical_digest) {
            return false;
        }
        if !pq.verify_cert(&self.pq_cert, &self.signers, pq_digest) {
            return false;
        }
        let signer_weight: u64 = self
            .signers
            .iter()
            .map(|id| validators.weight_of(id, self.height))
            .sum();
        signer_weight >= validators.quorum(self.height)
    }
}

/// Callback invoked once a bundle is durably appended.
pub type OnFinalized<V> = Box<dyn Fn(&V, &CertificateBundle<V>) + Send + Sync>;

/// Append-only, authoritative store of finality decisions. "Is v final?"
/// is always answered here, never by inspecting (possibly pruned) Wave
/// state.
#[async_trait]
pub trait FinalizedLog<V: Send + Sync>: Send + Sync {
    /// Durable append. Idempotent: appending an already-logged vertex is a
    /// no-op that returns the existing bundle.
    async fn append(&self, bundle: CertificateBundle<V>) -> NovaResult<CertificateBundle<V>>;

    async fn lookup(&self, vertex: &V) -> Option<CertificateBundle<V>>;
}

/// In-memory reference implementation. Real deployments back this with
/// fsync'd storage (out of scope here); this is what the crate's own
/// tests exercise end-to-end.
pub struct MemoryFinalizedLog<V: Eq + Hash + Clone> {
    bundles: tokio::sync::Mutex<HashMap<V, CertificateBundle<V>>>,
    ordered: tokio::sync::Mutex<Vec<V>>,
    bundle_size: usize,
    on_finalized: tokio::sync::Mutex<Vec<OnFinalized<V>>>,
}

impl<V: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static> MemoryFinalizedLog<V> {
    pub fn new(bundle_size: usize) -> Self {
        Self {
            bundles: tokio::sync::Mutex::new(HashMap::new()),
            ordered: tokio::sync::Mutex::new(Vec::new()),
            bundle_size,
            on_finalized: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub async fn subscribe(&self, callback: OnFinalized<V>) {
        self.on_finalized.lock().await.push(callback);
    }

    /// Checkpoint boundary: `true` every `bundle_size` appends, matching
    /// the checkpoint file's (height, digest) record cadence.
    async fn at_checkpoint_boundary(&self) -> bool {
        let ordered = self.ordered.lock().await;
        !ordered.is_empty() && ordered.len() % self.bundle_size == 0
    }
}

#[async_trait]
impl<V: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static> FinalizedLog<V>
    for MemoryFinalizedLog<V>
{
    async fn append(&self, bundle: CertificateBundle<V>) -> NovaResult<CertificateBundle<V>> {
        let mut bundles = self.bundles.lock().await;
        if let Some(existing) = bundles.get(&bundle.vertex) {
            return Ok(existing.clone());
        }
        bundles.insert(bundle.vertex.clone(), bundle.clone());
        self.ordered.lock().await.push(bundle.vertex.clone());
        drop(bundles);

        let callbacks = self.on_finalized.lock().await;
        for cb in callbacks.iter() {
            cb(&bundle.vertex, &bundle);
        }
        if self.at_checkpoint_boundary().await {
            info!(height = bundle.height, round = bundle.round, "checkpoint boundary reached");
        }
        Ok(bundle)
    }

    async fn lookup(&self, vertex: &V) -> Option<CertificateBundle<V>> {
        self.bundles.lock().await.get(vertex).cloned()
    }
}
