//! Ringtail: the post-quantum two-phase commit overlay.
//!
//! One [`Round`] drives a single frontier vertex through
//! `Idle → Proposal → Commit → Done`, timing out back to `Idle` (round
//! increments) if either phase stalls. Share/proposal collection and the
//! timeout race via `tokio::select!`, the same pattern a heartbeat/
//! response race uses against a deadline.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::{NovaError, NovaResult};
use crate::external::{ClassicalCrypto, PqCrypto, ValidatorSet};
use crate::ids::{commit_digest, proposal_digest, Digest, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Proposal,
    Commit,
    Done,
}

/// One node's threshold share, carried alongside its id for deterministic
/// aggregation ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    pub voter: NodeId,
    pub bytes: Vec<u8>,
}

struct RoundState {
    round: u64,
    phase: Phase,
    proposal_digest: Option<Digest>,
    proposals: HashMap<NodeId, Digest>,
    commit_digest: Option<Digest>,
    shares: HashMap<NodeId, Share>,
}

impl RoundState {
    fn new(round: u64) -> Self {
        Self {
            round,
            phase: Phase::Idle,
            proposal_digest: None,
            proposals: HashMap::new(),
            commit_digest: None,
            shares: HashMap::new(),
        }
    }

    fn reset_to_idle(&mut self, next_round: u64) {
        *self = RoundState::new(next_round);
    }
}

/// Runs the two-phase commit protocol for a single frontier vertex,
/// across however many rounds it takes to either succeed or be abandoned
/// by the caller. Never overlaps another round for the same vertex.
pub struct Ringtail<V> {
    vertex: V,
    height: u64,
    state: Mutex<RoundState>,
    round_timeout: Duration,
}

impl<V: Clone + std::fmt::Debug> Ringtail<V> {
    pub fn new(vertex: V, height: u64, round_timeout: Duration) -> Self {
        Self {
            vertex,
            height,
            state: Mutex::new(RoundState::new(0)),
            round_timeout,
        }
    }

    pub async fn current_round(&self) -> u64 {
        self.state.lock().await.round
    }

    pub async fn phase(&self) -> Phase {
        self.state.lock().await.phase
    }

    /// Local node broadcasts its own proposal and enters `Proposal` from
    /// `Idle`. `vertex_bytes` backs the proposal digest.
    pub async fn begin_proposal(&self, vertex_bytes: &[u8]) -> Digest {
        let digest = proposal_digest(vertex_bytes, self.height);
        let mut state = self.state.lock().await;
        state.phase = Phase::Proposal;
        state.proposal_digest = Some(digest);
        digest
    }

    /// Records a remote proposal for this round. Duplicate submissions
    /// from the same node are ignored after the first.
    /// Returns `true` once `quorum` matching proposals have accumulated,
    /// at which point the caller should call [`Ringtail::begin_commit`].
    pub async fn record_proposal(&self, voter: NodeId, digest: Digest, quorum: u64, weight_of: impl Fn(&NodeId) -> u64) -> bool {
        let mut state = self.state.lock().await;
        if state.phase != Phase::Proposal || state.proposals.contains_key(&voter) {
            return false;
        }
        state.proposals.insert(voter, digest);
        let matching_weight: u64 = state
            .proposals
            .iter()
            .filter(|(_, d)| **d == digest)
            .map(|(id, _)| weight_of(id))
            .sum();
        matching_weight >= quorum
    }

    /// `Proposal → Commit`: generates this node's threshold share for the
    /// commit digest and enters `Commit`.
    pub async fn begin_commit(&self, pq: &dyn PqCrypto, local: NodeId) -> NovaResult<Share> {
        let mut state = self.state.lock().await;
        let proposal_digest = state.proposal_digest.ok_or_else(|| {
            NovaError::VerificationFailed("begin_commit called before a proposal digest was set".into())
        })?;
        let digest = commit_digest(&proposal_digest, state.round, self.height);
        state.commit_digest = Some(digest);
        state.phase = Phase::Commit;
        let bytes = pq.share(&digest);
        let share = Share { voter: local, bytes };
        state.shares.insert(local, share.clone());
        Ok(share)
    }

    /// Records a remote share. Ignored if the voter already submitted one
    /// this round, isn't in the validator set, or fails PQ verification.
    /// Returns `true` once `2f+1` valid shares have accumulated.
    pub async fn record_share(
        &self,
        share: Share,
        validators: &dyn ValidatorSet,
        pq: &dyn PqCrypto,
    ) -> bool {
        let mut state = self.state.lock().await;
        if state.phase != Phase::Commit {
            return false;
        }
        if state.shares.contains_key(&share.voter) {
            return false;
        }
        if validators.weight_of(&share.voter, self.height) == 0 {
            return false;
        }
        let Some(digest) = state.commit_digest else {
            return false;
        };
        if !pq.verify_share(&share.bytes, &share.voter, &digest) {
            warn!(voter = %share.voter, "dropping share with invalid PQ verification");
            return false;
        }
        state.shares.insert(share.voter, share);
        let weight: u64 = state
            .shares
            .keys()
            .map(|id| validators.weight_of(id, self.height))
            .sum();
        weight >= validators.quorum(self.height)
    }

    /// `Commit → Done`: aggregates the collected shares into a PQ
    /// certificate, sorted by voter id for deterministic aggregation.
    /// Also returns the classical aggregate over the same commit digest,
    /// bundling both certificates for Quasar.
    pub async fn finish(
        &self,
        classical: &dyn ClassicalCrypto,
        pq: &dyn PqCrypto,
        classical_sigs: &[(NodeId, Vec<u8>)],
    ) -> NovaResult<(Digest, Vec<u8>, Vec<u8>, Vec<NodeId>)> {
        let mut state = self.state.lock().await;
        let digest = state.commit_digest.ok_or_else(|| {
            NovaError::VerificationFailed("finish called before a commit digest was set".into())
        })?;
        let mut ordered_shares: Vec<_> = state.shares.values().cloned().collect();
        ordered_shares.sort_by(|a, b| a.voter.cmp(&b.voter));
        let pq_shares: Vec<(NodeId, Vec<u8>)> = ordered_shares
            .iter()
            .map(|s| (s.voter, s.bytes.clone()))
            .collect();
        let pq_cert = pq.aggregate(&pq_shares);

        let mut signers: Vec<NodeId> = classical_sigs.iter().map(|(id, _)| *id).collect();
        signers.sort();
        let sigs_only: Vec<Vec<u8>> = {
            let mut pairs = classical_sigs.to_vec();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            pairs.into_iter().map(|(_, sig)| sig).collect()
        };
        let classical_agg = classical.aggregate(&sigs_only);

        state.phase = Phase::Done;
        info!(round = state.round, "ringtail round done");
        Ok((digest, classical_agg, pq_cert, signers))
    }

    /// Races `fut` against the round timeout; on timeout, resets to Idle
    /// and increments the round (`Any → Idle`).
    pub async fn run_with_timeout<F, T>(&self, fut: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        match timeout(self.round_timeout, fut).await {
            Ok(value) => Some(value),
            Err(_) => {
                let mut state = self.state.lock().await;
                let next_round = state.round + 1;
                warn!(next_round, "ringtail round timed out, resetting to idle");
                state.reset_to_idle(next_round);
                None
            }
        }
    }

    pub fn vertex(&self) -> &V {
        &self.vertex
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakePq;
    impl PqCrypto for FakePq {
        fn share(&self, digest: &Digest) -> Vec<u8> {
            digest.as_bytes().to_vec()
        }
        fn verify_share(&self, share: &[u8], _signer: &NodeId, digest: &Digest) -> bool {
            share == digest.as_bytes()
        }
        fn aggregate(&self, shares: &[(NodeId, Vec<u8>)]) -> Vec<u8> {
            shares.iter().flat_map(|(_, s)| s.clone()).collect()
        }
        fn verify_cert(&self, _cert: &[u8], _validators: &[NodeId], _digest: &Digest) -> bool {
            true
        }
    }

    struct FakeClassical;
    impl ClassicalCrypto for FakeClassical {
        fn sign(&self, msg: &[u8]) -> Vec<u8> {
            msg.to_vec()
        }
        fn verify(&self, _msg: &[u8], _sig: &[u8], _signer: &NodeId) -> bool {
            true
        }
        fn aggregate(&self, sigs: &[Vec<u8>]) -> Vec<u8> {
            sigs.concat()
        }
        fn verify_aggregate(&self, _agg: &[u8], _signers: &[NodeId], _msg: &[u8]) -> bool {
            true
        }
    }

    struct FakeValidators(Vec<(NodeId, u64)>);
    impl ValidatorSet for FakeValidators {
        fn weight_of(&self, id: &NodeId, _height: u64) -> u64 {
            self.0.iter().find(|(n, _)| n == id).map(|(_, w)| *w).unwrap_or(0)
        }
        fn total_weight(&self, _height: u64) -> u64 {
            self.0.iter().map(|(_, w)| w).sum()
        }
        fn iter(&self, _height: u64) -> Vec<(NodeId, u64)> {
            self.0.clone()
        }
    }

    fn node(byte: u8) -> NodeId {
        let mut bytes = [0u8; 32];
        bytes[0] = byte;
        NodeId::from_bytes(bytes)
    }

    /// Ringtail single-round finality: a round produces at most one
    /// certificate bundle — here, `finish` succeeds exactly once per round
    /// and transitions to Done.
    #[tokio::test]
    async fn happy_path_reaches_done_with_one_certificate() {
        let validators = FakeValidators(vec![(node(1), 1), (node(2), 1), (node(3), 1)]);
        let pq = FakePq;
        let classical = FakeClassical;
        let ring: Ringtail<&str> = Ringtail::new("v", 1, Duration::from_millis(200));

        let digest = ring.begin_proposal(b"v").await;
        assert_eq!(ring.phase().await, Phase::Proposal);

        for id in [node(1), node(2), node(3)] {
            ring.record_proposal(id, digest, 2, |id| validators.weight_of(id, 1)).await;
        }

        let share1 = ring.begin_commit(&pq, node(1)).await.unwrap();
        assert_eq!(ring.phase().await, Phase::Commit);
        let share2 = Share {
            voter: node(2),
            bytes: pq.share(&commit_digest(&digest, 0, 1)),
        };
        ring.record_share(share2, &validators, &pq).await;
        let _ = share1;

        let (_, classical_agg, pq_cert, signers) = ring
            .finish(&classical, &pq, &[(node(1), vec![9]), (node(2), vec![8])])
            .await
            .unwrap();
        assert_eq!(ring.phase().await, Phase::Done);
        assert!(!classical_agg.is_empty());
        assert!(!pq_cert.is_empty());
        assert_eq!(signers, vec![node(1), node(2)]);
    }

    #[tokio::test]
    async fn duplicate_share_from_same_voter_is_ignored() {
        let validators = FakeValidators(vec![(node(1), 1), (node(2), 1)]);
        let pq = FakePq;
        let ring: Ringtail<&str> = Ringtail::new("v", 1, Duration::from_millis(200));
        let digest = ring.begin_proposal(b"v").await;
        ring.begin_commit(&pq, node(1)).await.unwrap();
        let commit = commit_digest(&digest, 0, 1);
        let dup = Share { voter: node(1), bytes: pq.share(&commit) };
        assert!(!ring.record_share(dup.clone(), &validators, &pq).await);
        assert!(!ring.record_share(dup, &validators, &pq).await);
    }

    /// Scenario F: round 0 times out with only partial shares collected;
    /// round 1 then succeeds.
    #[tokio::test]
    async fn round_timeout_resets_and_retry_succeeds() {
        let ring: Ringtail<&str> = Ringtail::new("v", 1, Duration::from_millis(20));
        let timed_out: Option<()> = ring
            .run_with_timeout(async {
                tokio::time::sleep(Duration::from_millis(100)).await;
            })
            .await;
        assert!(timed_out.is_none());
        assert_eq!(ring.current_round().await, 1);
        assert_eq!(ring.phase().await, Phase::Idle);
    }
}
