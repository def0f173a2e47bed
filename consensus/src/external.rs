//! Trait seams for every external collaborator this crate talks to:
//! transports, validator sets, classical/PQ cryptography,
//! proposer/committer/store, and the finalized log. None of these are
//! implemented by this crate — a deployment wires in its own transport,
//! staking layer, database, and signature schemes.

use async_trait::async_trait;

use crate::ids::{Digest, NodeId};

/// A single vote observed from a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vote<T> {
    pub item: T,
    pub prefer: bool,
}

/// Requests and local-vote fabrication for a linear-engine item `T`.
#[async_trait]
pub trait Transport<T>: Send + Sync {
    /// Streams votes from `peers` for `item`, honoring `deadline`. Must
    /// return whatever arrived before the deadline rather than erroring —
    /// partial returns on a missed deadline, not an error.
    async fn request_votes(
        &self,
        peers: &[NodeId],
        item: &T,
        deadline: std::time::Duration,
    ) -> Vec<Vote<T>>;

    /// Produces this node's own vote, e.g. from local verification state.
    async fn make_local_vote(&self, item: &T, prefer: bool) -> Vote<T>;

    /// Gossips a Ringtail proposal digest for `round`.
    async fn broadcast_proposal(&self, round: u64, digest: Digest);

    /// Gossips a Ringtail threshold share for `round`.
    async fn broadcast_share(&self, round: u64, share: Vec<u8>);
}

/// Validator set membership and weights, as of a given height.
pub trait ValidatorSet: Send + Sync {
    fn weight_of(&self, id: &NodeId, height: u64) -> u64;
    fn total_weight(&self, height: u64) -> u64;
    fn iter(&self, height: u64) -> Vec<(NodeId, u64)>;

    /// `2f+1` under the usual one-third byzantine-weight bound.
    fn quorum(&self, height: u64) -> u64 {
        let total = self.total_weight(height);
        total - (total - 1) / 3
    }
}

/// Classical (non-PQ) aggregate signature capability.
pub trait ClassicalCrypto: Send + Sync {
    fn sign(&self, msg: &[u8]) -> Vec<u8>;
    fn verify(&self, msg: &[u8], sig: &[u8], signer: &NodeId) -> bool;
    fn aggregate(&self, sigs: &[Vec<u8>]) -> Vec<u8>;
    fn verify_aggregate(&self, agg: &[u8], signers: &[NodeId], msg: &[u8]) -> bool;
}

/// Post-quantum threshold-share capability.
pub trait PqCrypto: Send + Sync {
    fn share(&self, digest: &Digest) -> Vec<u8>;
    fn verify_share(&self, share: &[u8], signer: &NodeId, digest: &Digest) -> bool;
    fn aggregate(&self, shares: &[(NodeId, Vec<u8>)]) -> Vec<u8>;
    fn verify_cert(&self, cert: &[u8], validators: &[NodeId], digest: &Digest) -> bool;
}

/// Proposes a new DAG vertex extending `parents`. Failures are non-fatal
/// for the calling tick.
#[async_trait]
pub trait Proposer<V>: Send + Sync {
    async fn propose(&self, parents: Vec<V>) -> anyhow::Result<V>;
}

/// Applies a causally-ordered batch of finalized vertices. Failures here
/// are fatal — the engine halts.
#[async_trait]
pub trait Committer<V>: Send + Sync {
    async fn commit(&self, ordered: Vec<V>) -> anyhow::Result<()>;
}

/// Persists vertex payloads keyed by id; orthogonal to Horizon, which only
/// tracks graph shape.
#[async_trait]
pub trait Store<V>: Send + Sync {
    async fn put(&self, vertex: V, payload: Vec<u8>) -> anyhow::Result<()>;
    async fn get(&self, vertex: &V) -> anyhow::Result<Option<Vec<u8>>>;
}
