//! DAG engine (Nebula): polyadic Photon+Wave over the frontier, Flare
//! fast-path tallies, and safe-prefix commit through Ringtail/Quasar.
//!
//! Generalizes the round-driving poll → tally → advance → maybe-finalize
//! shape from a single slot to an antichain of vertices, with the
//! per-vertex confidence/status-machine split that Wave/Flare already
//! model here.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::Parameters;
use crate::error::{NovaError, NovaResult};
use crate::external::{ClassicalCrypto, Committer, PqCrypto, Proposer, ValidatorSet};
use crate::flare::Flare;
use crate::horizon::Horizon;
use crate::ids::NodeId;
use crate::photon::PolyadicPhoton;
use crate::quasar::{CertificateBundle, FinalizedLog};
use crate::ringtail::Ringtail;
use crate::sampler::frontier;
use crate::wave::{ConstantSelector, Selector, TerminationCondition, Wave};

/// Per-vertex Wave state the DAG engine drives over `{accept, reject}`, a
/// polyadic Photon restricted to the two-outcome case.
struct VertexWave {
    wave: Wave<PolyadicPhoton<u8>>,
}

impl VertexWave {
    fn new(conditions: &[TerminationCondition]) -> Self {
        Self {
            wave: Wave::new(PolyadicPhoton::new(0u8), conditions),
        }
    }
}

/// Drives the antichain-of-vertices decision loop: Wave-poll the frontier,
/// propose new vertices, and commit the safe prefix once its entire
/// ancestry is Wave-finalized.
pub struct DagEngine<V: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static> {
    params: Parameters,
    horizon: RwLock<Horizon<V>>,
    flare: Flare<V>,
    waves: RwLock<HashMap<V, VertexWave>>,
    tips: RwLock<Vec<V>>,
    validators: Arc<dyn ValidatorSet>,
    proposer: Arc<dyn Proposer<V>>,
    committer: Arc<dyn Committer<V>>,
    log: Arc<dyn FinalizedLog<V>>,
    classical: Arc<dyn ClassicalCrypto>,
    pq: Arc<dyn PqCrypto>,
    epoch_fenced: std::sync::atomic::AtomicBool,
    halted: std::sync::atomic::AtomicBool,
}

impl<V: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static> DagEngine<V> {
    pub fn new(
        params: Parameters,
        retention_window: u64,
        validators: Arc<dyn ValidatorSet>,
        proposer: Arc<dyn Proposer<V>>,
        committer: Arc<dyn Committer<V>>,
        log: Arc<dyn FinalizedLog<V>>,
        classical: Arc<dyn ClassicalCrypto>,
        pq: Arc<dyn PqCrypto>,
    ) -> NovaResult<Self> {
        params.validate()?;
        let quorum = validators.quorum(0);
        Ok(Self {
            horizon: RwLock::new(Horizon::new(retention_window)),
            flare: Flare::new(quorum),
            waves: RwLock::new(HashMap::new()),
            tips: RwLock::new(Vec::new()),
            validators,
            proposer,
            committer,
            log,
            classical,
            pq,
            epoch_fenced: std::sync::atomic::AtomicBool::new(false),
            halted: std::sync::atomic::AtomicBool::new(false),
            params,
        })
    }

    /// Inserts the genesis vertex. Must be called once before any ticks.
    pub async fn add_genesis(&self, genesis: V) -> NovaResult<()> {
        self.horizon.write().await.add_vertex(genesis.clone(), vec![])?;
        self.tips.write().await.push(genesis);
        Ok(())
    }

    /// Inserts `v` with `parents`, extending the known vertex set. Callers
    /// feed votes and eventual frontier membership separately.
    pub async fn observe_vertex(&self, v: V, parents: Vec<V>) -> NovaResult<()> {
        self.horizon.write().await.add_vertex(v.clone(), parents.clone())?;
        let mut tips = self.tips.write().await;
        // Cited parents are no longer tips; uncited ones remain separate
        // frontier branches until something else cites them.
        tips.retain(|t| !parents.contains(t));
        tips.push(v);
        Ok(())
    }

    /// Raises or lowers the epoch fence. This is global, not per-item:
    /// while fenced, Flare upgrades are suppressed and new Ringtail rounds
    /// must not start.
    pub async fn set_epoch_fenced(&self, fenced: bool) {
        self.epoch_fenced.store(fenced, std::sync::atomic::Ordering::SeqCst);
        self.flare.set_epoch_fenced(fenced);
    }

    pub fn halted(&self) -> bool {
        self.halted.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn termination_conditions(&self) -> Vec<TerminationCondition> {
        vec![TerminationCondition {
            alpha_conf: self.params.alpha_conf,
            beta: self.params.beta,
        }]
    }

    /// One round of the DAG engine:
    /// 1. read the frontier,
    /// 2. Wave-poll each frontier vertex against `votes_for`,
    /// 3. propose a new vertex extending the frontier,
    /// 4. compute the safe prefix,
    /// 5. hand it to Ringtail/Quasar and, on success, the Committer.
    ///
    /// `votes_for(v)` supplies this round's weighted `(accept, reject)`
    /// tally for vertex `v`, e.g. gathered via `Sampler::sample` +
    /// `Transport::request_votes` by the caller (kept out of this method
    /// so the engine stays transport-agnostic, matching `LinearEngine`).
    ///
    /// This drives Wave only. Flare's fast path needs the individual
    /// per-voter ballots behind this tally to dedup correctly, which this
    /// method's aggregated `(accept, reject)` input can't reconstruct; feed
    /// Flare directly via [`DagEngine::record_flare_vote`] as votes arrive.
    ///
    /// Returns the vertices newly committed this tick (a subset of the
    /// safe prefix — vertices the safe prefix already contained from a
    /// prior tick are not re-handed to the Committer; commit, like the log
    /// append beneath it, is idempotent).
    pub async fn tick(&self, votes_for: impl Fn(&V) -> (usize, usize)) -> NovaResult<Vec<V>> {
        if self.halted() {
            return Err(NovaError::Cancelled);
        }

        let frontier_vertices = self.current_frontier().await;
        if frontier_vertices.is_empty() {
            return Ok(Vec::new());
        }

        let selector = ConstantSelector::new(self.params.alpha_pref);
        let conditions = self.termination_conditions();

        for v in &frontier_vertices {
            let (n_accept, n_reject) = votes_for(v);
            let (alpha_pref, alpha_confs) =
                selector.select(0, self.params.k, self.params.majority(), &[self.params.alpha_conf]);
            let dominant = if n_accept >= alpha_pref {
                Some((1u8, n_accept))
            } else if n_reject >= alpha_pref {
                Some((0u8, n_reject))
            } else {
                None
            };

            let mut waves = self.waves.write().await;
            let entry = waves
                .entry(v.clone())
                .or_insert_with(|| VertexWave::new(&conditions));
            match dominant {
                Some((choice, n)) => {
                    entry.wave.record_poll(n, choice, alpha_pref, &alpha_confs);
                }
                None => {
                    entry.wave.record_unsuccessful_poll();
                }
            }
        }

        if let Err(e) = self.try_propose(&frontier_vertices).await {
            warn!(error = %e, "proposer failed this tick, continuing without a proposal");
        }

        let safe_prefix = self.safe_prefix(&frontier_vertices).await;
        if safe_prefix.is_empty() {
            return Ok(Vec::new());
        }

        match self.commit_safe_prefix(safe_prefix).await {
            Ok(newly_committed) => Ok(newly_committed),
            Err(e @ NovaError::CommitterFailed(_)) | Err(e @ NovaError::LogAppendFailed(_)) => {
                error!(error = %e, "fatal error in commit path, halting engine");
                self.halted.store(true, std::sync::atomic::Ordering::SeqCst);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// The current frontier: the tips with any tip that is itself an
    /// ancestor of another tip filtered out.
    pub async fn current_frontier(&self) -> Vec<V> {
        let tips = self.tips.read().await;
        let horizon = self.horizon.read().await;
        frontier(&tips, |a, b| horizon.is_ancestor(a, b))
    }

    /// Records one voter's ballot on `vertex` toward Flare's fast-path
    /// tally. Call this as votes arrive over the transport, independently
    /// of [`DagEngine::tick`] — Flare dedups per voter, so it needs the
    /// individual `(voter, weight)` pairs `tick`'s aggregated input can't
    /// supply.
    pub fn record_flare_vote(&self, vertex: V, voter: NodeId, weight: u64) {
        self.flare.record_vote(vertex, voter, weight);
    }

    /// The fast-path status Flare has reached for `vertex` from whatever
    /// votes have been recorded via [`DagEngine::record_flare_vote`].
    pub fn flare_status(&self, vertex: &V) -> crate::flare::Status {
        self.flare.status(vertex)
    }

    async fn try_propose(&self, frontier_vertices: &[V]) -> NovaResult<()> {
        if self.epoch_fenced.load(std::sync::atomic::Ordering::SeqCst) {
            return Ok(());
        }
        let parents: Vec<V> = frontier_vertices
            .iter()
            .take(self.params.max_parents)
            .cloned()
            .collect();
        if parents.is_empty() {
            return Ok(());
        }
        let proposed = self
            .proposer
            .propose(parents.clone())
            .await
            .map_err(NovaError::ProposerFailed)?;
        self.observe_vertex(proposed, parents).await
    }

    /// The subset of the frontier that is itself Wave-finalized *and*
    /// whose entire ancestry is also Wave-finalized, ordered topologically
    /// (parents before children), ties broken by `(height asc, vertex-id)`
    /// — here approximated by the order Horizon discovers ancestors in
    /// plus a stable sort on height, since `V` has no required total
    /// ordering of its own (the engine's own tests order by height then
    /// the `Debug` representation, which is stable for any `V`).
    async fn safe_prefix(&self, frontier_vertices: &[V]) -> Vec<V> {
        let waves = self.waves.read().await;
        let horizon = self.horizon.read().await;

        let mut candidates: Vec<V> = Vec::new();
        for v in frontier_vertices {
            if !self.is_settled(v, &waves, &horizon).await {
                continue;
            }
            let mut ancestors_finalized = true;
            if let Some(ancestors) = horizon.ancestors(v) {
                for a in &ancestors {
                    if !self.is_settled(a, &waves, &horizon).await {
                        ancestors_finalized = false;
                        break;
                    }
                }
            }
            if ancestors_finalized {
                candidates.push(v.clone());
            }
        }

        // Expand to the full causal set: a finalized frontier vertex pulls
        // in any not-yet-committed ancestor, all of which are finalized by
        // construction above. Genesis (no parents) is excluded here: it
        // never goes through Ringtail/Quasar and has nothing to commit.
        let mut full_set: std::collections::HashSet<V> = std::collections::HashSet::new();
        for v in &candidates {
            full_set.insert(v.clone());
            if let Some(ancestors) = horizon.ancestors(v) {
                for a in ancestors {
                    let has_parents = horizon.parents(&a).map(|p| !p.is_empty()).unwrap_or(false);
                    if has_parents {
                        full_set.insert(a);
                    }
                }
            }
        }

        let mut ordered: Vec<V> = full_set.into_iter().collect();
        ordered.sort_by(|a, b| {
            let ha = horizon.height(a).unwrap_or(0);
            let hb = horizon.height(b).unwrap_or(0);
            ha.cmp(&hb).then_with(|| format!("{a:?}").cmp(&format!("{b:?}")))
        });
        ordered
    }

    /// A vertex is settled for ancestry purposes if it's itself
    /// Wave-finalized, already sits in the finalized log (the log is
    /// authoritative over Wave state — see `quasar`), or has no parents at
    /// all. Genesis is never Wave-polled and never appears in `waves`, so
    /// without that last case it would stay permanently unfinalized and no
    /// vertex citing it (directly or transitively) could ever reach a
    /// non-empty safe prefix.
    async fn is_settled(&self, v: &V, waves: &HashMap<V, VertexWave>, horizon: &Horizon<V>) -> bool {
        if waves.get(v).map(|w| w.wave.finalized()).unwrap_or(false) {
            return true;
        }
        if horizon.parents(v).map(|p| p.is_empty()).unwrap_or(false) {
            return true;
        }
        self.log.lookup(v).await.is_some()
    }

    /// Runs each safe-prefix vertex through Ringtail, then Quasar, then
    /// the Committer, in causal order.
    async fn commit_safe_prefix(&self, ordered: Vec<V>) -> NovaResult<Vec<V>> {
        if self.epoch_fenced.load(std::sync::atomic::Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        let mut newly_committed: Vec<V> = Vec::new();
        for v in &ordered {
            if self.log.lookup(v).await.is_some() {
                continue;
            }
            let height = self.horizon.read().await.height(v).unwrap_or(0);
            let ring = Ringtail::new(v.clone(), height, self.params.round_timeout);
            let vertex_bytes = format!("{v:?}").into_bytes();

            let digest = ring.begin_proposal(&vertex_bytes).await;
            let quorum = self.validators.quorum(height);
            ring.record_proposal(NodeId::from_bytes([0u8; 32]), digest, quorum, |id| {
                self.validators.weight_of(id, height)
            })
            .await;

            let local = NodeId::from_bytes([0u8; 32]);
            let share = ring.begin_commit(self.pq.as_ref(), local).await?;
            ring.record_share(share, self.validators.as_ref(), self.pq.as_ref()).await;

            let classical_sig = self.classical.sign(&vertex_bytes);
            let (_, classical_agg, pq_cert, signers) = ring
                .finish(self.classical.as_ref(), self.pq.as_ref(), &[(local, classical_sig)])
                .await?;

            let bundle = CertificateBundle {
                vertex: v.clone(),
                round: ring.current_round().await,
                height,
                classical_agg,
                pq_cert,
                signers,
                timestamp: chrono::Utc::now(),
            };
            self.log
                .append(bundle.clone())
                .await
                .map_err(|e| NovaError::LogAppendFailed(anyhow::anyhow!(e.to_string())))?;

            self.flare.mark_final(v.clone());
            newly_committed.push(v.clone());
        }

        if newly_committed.is_empty() {
            return Ok(Vec::new());
        }
        self.committer
            .commit(newly_committed.clone())
            .await
            .map_err(NovaError::CommitterFailed)?;
        info!("safe prefix committed");
        Ok(newly_committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{ClassicalCrypto, Committer, PqCrypto, Proposer};
    use async_trait::async_trait;

    struct FixedValidators(Vec<(NodeId, u64)>);
    impl ValidatorSet for FixedValidators {
        fn weight_of(&self, id: &NodeId, _height: u64) -> u64 {
            self.0.iter().find(|(n, _)| n == id).map(|(_, w)| *w).unwrap_or(0)
        }
        fn total_weight(&self, _height: u64) -> u64 {
            self.0.iter().map(|(_, w)| w).sum()
        }
        fn iter(&self, _height: u64) -> Vec<(NodeId, u64)> {
            self.0.clone()
        }
        fn quorum(&self, _height: u64) -> u64 {
            1
        }
    }

    struct NoopProposer;
    #[async_trait]
    impl Proposer<&'static str> for NoopProposer {
        async fn propose(&self, _parents: Vec<&'static str>) -> anyhow::Result<&'static str> {
            Err(anyhow::anyhow!("no proposals in this test"))
        }
    }

    struct RecordingCommitter {
        committed: tokio::sync::Mutex<Vec<Vec<&'static str>>>,
    }
    #[async_trait]
    impl Committer<&'static str> for RecordingCommitter {
        async fn commit(&self, ordered: Vec<&'static str>) -> anyhow::Result<()> {
            self.committed.lock().await.push(ordered);
            Ok(())
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

    struct FakePq;
    impl PqCrypto for FakePq {
        fn share(&self, digest: &crate::ids::Digest) -> Vec<u8> {
            digest.as_bytes().to_vec()
        }
        fn verify_share(&self, share: &[u8], _signer: &NodeId, digest: &crate::ids::Digest) -> bool {
            share == digest.as_bytes()
        }
        fn aggregate(&self, shares: &[(NodeId, Vec<u8>)]) -> Vec<u8> {
            shares.iter().flat_map(|(_, s)| s.clone()).collect()
        }
        fn verify_cert(&self, _cert: &[u8], _validators: &[NodeId], _digest: &crate::ids::Digest) -> bool {
            true
        }
    }

    fn node(byte: u8) -> NodeId {
        let mut bytes = [0u8; 32];
        bytes[0] = byte;
        NodeId::from_bytes(bytes)
    }

    /// g -> a, b; c -> (a,b). Once a and b are Wave-finalized but c is
    /// still pending, the committed set is [a, b] ordered by height then
    /// id, not [c].
    #[tokio::test]
    async fn safe_prefix_excludes_pending_descendant() {
        let validators = Arc::new(FixedValidators(vec![(node(1), 1)]));
        let committer = Arc::new(RecordingCommitter {
            committed: tokio::sync::Mutex::new(Vec::new()),
        });
        let mut params = Parameters::default();
        params.k = 1;
        params.alpha_pref = 1;
        params.alpha_conf = 1;
        params.beta = 1;
        let engine: DagEngine<&'static str> = DagEngine::new(
            params,
            100,
            validators,
            Arc::new(NoopProposer),
            committer.clone(),
            Arc::new(crate::quasar::MemoryFinalizedLog::new(100)),
            Arc::new(FakeClassical),
            Arc::new(FakePq),
        )
        .unwrap();

        engine.add_genesis("g").await.unwrap();
        engine.observe_vertex("a", vec!["g"]).await.unwrap();
        engine.observe_vertex("b", vec!["g"]).await.unwrap();
        // "a" and "b" are siblings; tips after both inserted: both remain
        // (neither cites the other), "g" is consumed.
        let frontier_now = engine.current_frontier().await;
        assert_eq!(frontier_now.len(), 2);

        // Vote a and b to finality; c isn't inserted yet so doesn't show up.
        let committed = engine.tick(|_v| (1, 0)).await.unwrap();
        let mut committed_sorted = committed.clone();
        committed_sorted.sort();
        assert_eq!(committed_sorted, vec!["a", "b"]);

        engine.observe_vertex("c", vec!["a", "b"]).await.unwrap();
        let committed2 = engine.tick(|_v| (1, 0)).await.unwrap();
        assert_eq!(committed2, vec!["c"]);

        let log = committer.committed.lock().await;
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn committer_failure_halts_the_engine() {
        struct FailingCommitter;
        #[async_trait]
        impl Committer<&'static str> for FailingCommitter {
            async fn commit(&self, _ordered: Vec<&'static str>) -> anyhow::Result<()> {
                Err(anyhow::anyhow!("disk full"))
            }
        }

        let validators = Arc::new(FixedValidators(vec![(node(1), 1)]));
        let mut params = Parameters::default();
        params.k = 1;
        params.alpha_pref = 1;
        params.alpha_conf = 1;
        params.beta = 1;
        let engine: DagEngine<&'static str> = DagEngine::new(
            params,
            100,
            validators,
            Arc::new(NoopProposer),
            Arc::new(FailingCommitter),
            Arc::new(crate::quasar::MemoryFinalizedLog::new(100)),
            Arc::new(FakeClassical),
            Arc::new(FakePq),
        )
        .unwrap();

        engine.add_genesis("g").await.unwrap();
        engine.observe_vertex("a", vec!["g"]).await.unwrap();

        let result = engine.tick(|_v| (1, 0)).await;
        assert!(result.is_err());
        assert!(engine.halted());

        let result2 = engine.tick(|_v| (1, 0)).await;
        assert!(matches!(result2, Err(NovaError::Cancelled)));
    }

    /// Flare's fast path is driven independently of `tick`: each distinct
    /// voter recorded via `record_flare_vote` contributes once toward
    /// `flare_status`, and `tick` itself never touches Flare.
    #[tokio::test]
    async fn flare_status_tracks_votes_recorded_out_of_band() {
        // FixedValidators::quorum is fixed at 1, so the first distinct
        // voter is already enough to cross it.
        let validators = Arc::new(FixedValidators(vec![(node(1), 1), (node(2), 1)]));
        let mut params = Parameters::default();
        params.k = 1;
        params.alpha_pref = 1;
        params.alpha_conf = 1;
        params.beta = 1;
        let engine: DagEngine<&'static str> = DagEngine::new(
            params,
            100,
            validators,
            Arc::new(NoopProposer),
            Arc::new(RecordingCommitter { committed: tokio::sync::Mutex::new(Vec::new()) }),
            Arc::new(crate::quasar::MemoryFinalizedLog::new(100)),
            Arc::new(FakeClassical),
            Arc::new(FakePq),
        )
        .unwrap();

        engine.add_genesis("g").await.unwrap();
        engine.observe_vertex("a", vec!["g"]).await.unwrap();

        assert_eq!(engine.flare_status(&"a"), crate::flare::Status::Pending);
        engine.record_flare_vote("a", node(1), 1);
        assert_eq!(engine.flare_status(&"a"), crate::flare::Status::Executable);
        engine.record_flare_vote("a", node(1), 1); // duplicate voter, no effect

        // tick()'s votes_for closure feeds Wave only; it never calls into
        // Flare, so flare_status is unaffected by how many ticks run.
        let _ = engine.tick(|_v| (0, 0)).await.unwrap();
        assert_eq!(engine.flare_status(&"a"), crate::flare::Status::Executable);
    }
}
