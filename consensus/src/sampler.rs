//! Sampler (Prism): weighted k-of-N peer sampling, plus the Frontier/Cut/
//! Refract DAG-geometry helpers.
//!
//! `Sample` is exposed both as a concrete, in-process [`WeightedPool`] and
//! through the [`Sampler`] trait
//! seam so engines stay generic over who actually supplies peers — a
//! deployment may prefer to sample from a remote validator-set service
//! instead. `WeightedPool` is the reference implementation engines use by
//! default.

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::ids::NodeId;

/// Weighted k-of-N sampling, independent of where peer weights come from.
/// The engine calls this once per tick; nothing here may cache a prior
/// draw — every call samples afresh.
#[async_trait]
pub trait Sampler: Send + Sync {
    async fn sample(&self, k: usize, topic: &str) -> Vec<NodeId>;
}

/// An in-memory weighted peer pool. Weight mutations (validator-set
/// changes) take the exclusive path through [`WeightedPool::set_weights`];
/// `sample` only ever reads, since the pool is read-mostly.
pub struct WeightedPool {
    peers: tokio::sync::RwLock<Vec<(NodeId, u64)>>,
    rng_seed: std::sync::atomic::AtomicU64,
}

impl WeightedPool {
    pub fn new(peers: Vec<(NodeId, u64)>) -> Self {
        Self {
            peers: tokio::sync::RwLock::new(peers),
            rng_seed: std::sync::atomic::AtomicU64::new(0x9E3779B97F4A7C15),
        }
    }

    pub async fn set_weights(&self, peers: Vec<(NodeId, u64)>) {
        *self.peers.write().await = peers;
    }

    pub async fn total_weight(&self) -> u64 {
        self.peers.read().await.iter().map(|(_, w)| *w).sum()
    }

    fn next_seed(&self) -> u64 {
        // Each call advances the seed with a fixed odd increment (splitmix
        // style) so successive draws use independent, reproducible RNG
        // streams without a shared mutable RNG object.
        self.rng_seed
            .fetch_add(0x9E3779B97F4A7C15, std::sync::atomic::Ordering::Relaxed)
    }

    /// Weighted reservoir sampling without replacement: draws `min(k,
    /// |peers|)` distinct peers with selection probability proportional to
    /// weight (A-ES algorithm shape). Zero-weight peers are never
    /// selected.
    pub async fn sample(&self, k: usize, _topic: &str) -> Vec<NodeId> {
        let peers = self.peers.read().await;
        if peers.is_empty() || k == 0 {
            return Vec::new();
        }
        let mut rng = SmallRng::seed_from_u64(self.next_seed());
        let mut reservoir: Vec<(f64, NodeId)> = Vec::with_capacity(k.min(peers.len()));
        for (id, weight) in peers.iter() {
            if *weight == 0 {
                continue;
            }
            // Key_i = U_i^(1/w_i); the k largest keys form the sample.
            let u: f64 = rng.gen_range(f64::EPSILON..1.0);
            let key = u.powf(1.0 / *weight as f64);
            if reservoir.len() < k {
                reservoir.push((key, *id));
                if reservoir.len() == k {
                    reservoir.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
                }
            } else if key > reservoir[0].0 {
                reservoir[0] = (key, *id);
                reservoir.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
            }
        }
        reservoir.into_iter().map(|(_, id)| id).collect()
    }
}

#[async_trait]
impl Sampler for WeightedPool {
    async fn sample(&self, k: usize, topic: &str) -> Vec<NodeId> {
        WeightedPool::sample(self, k, topic).await
    }
}

/// Returns the current antichain of `tips` that has no descendant among
/// `tips` itself — i.e. the maximal frontier. `is_ancestor` answers
/// whether its first argument is a (possibly indirect) ancestor of the
/// second, typically backed by [`crate::horizon::Horizon::is_ancestor`].
pub fn frontier<V: Clone + Eq>(tips: &[V], is_ancestor: impl Fn(&V, &V) -> bool) -> Vec<V> {
    let mut result = Vec::new();
    for (i, v) in tips.iter().enumerate() {
        let has_descendant = tips
            .iter()
            .enumerate()
            .any(|(j, other)| i != j && is_ancestor(v, other));
        if !has_descendant {
            result.push(v.clone());
        }
    }
    result
}

/// Filters a vertex set by a caller-supplied predicate.
pub fn cut<V: Clone>(vertices: &[V], predicate: impl Fn(&V) -> bool) -> Vec<V> {
    vertices.iter().filter(|v| predicate(v)).cloned().collect()
}

/// Partitions `vertices` into buckets keyed by `slice_fn`, preserving the
/// relative order vertices were given in within each bucket — used to
/// shard parallel round execution.
pub fn refract<V: Clone, K: std::hash::Hash + Eq>(
    vertices: &[V],
    slice_fn: impl Fn(&V) -> K,
) -> std::collections::HashMap<K, Vec<V>> {
    let mut buckets: std::collections::HashMap<K, Vec<V>> = std::collections::HashMap::new();
    for v in vertices {
        buckets.entry(slice_fn(v)).or_default().push(v.clone());
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(byte: u8) -> NodeId {
        let mut bytes = [0u8; 32];
        bytes[0] = byte;
        NodeId::from_bytes(bytes)
    }

    #[tokio::test]
    async fn sample_never_exceeds_k_or_pool_size() {
        let pool = WeightedPool::new(vec![(node(1), 1), (node(2), 1), (node(3), 1)]);
        let sample = pool.sample(2, "votes").await;
        assert_eq!(sample.len(), 2);
        let sample = pool.sample(10, "votes").await;
        assert_eq!(sample.len(), 3);
    }

    #[tokio::test]
    async fn sample_excludes_zero_weight_peers() {
        let pool = WeightedPool::new(vec![(node(1), 1), (node(2), 0)]);
        for _ in 0..20 {
            let sample = pool.sample(1, "votes").await;
            assert_eq!(sample, vec![node(1)]);
        }
    }

    #[tokio::test]
    async fn sample_has_no_duplicates() {
        let pool = WeightedPool::new(vec![(node(1), 5), (node(2), 1), (node(3), 1), (node(4), 1)]);
        let sample = pool.sample(3, "votes").await;
        let mut unique = sample.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), sample.len());
    }

    /// Sampler uniformity: over many draws, a peer's heavy weight should
    /// make it appear in the sample far more often than light peers (a
    /// coarse statistical smoke test, not a convergence proof).
    #[tokio::test]
    async fn heavier_peers_are_selected_more_often() {
        let pool = WeightedPool::new(vec![(node(1), 100), (node(2), 1)]);
        let mut heavy_hits = 0;
        for _ in 0..200 {
            if pool.sample(1, "votes").await == vec![node(1)] {
                heavy_hits += 1;
            }
        }
        assert!(heavy_hits > 150, "heavy peer selected {heavy_hits}/200 times");
    }

    #[test]
    fn frontier_excludes_ancestors() {
        // g -> a -> c, g -> b; frontier of {a,b,c} given c descends from a.
        let is_ancestor = |x: &&str, y: &&str| matches!((*x, *y), ("a", "c"));
        let tips = vec!["a", "b", "c"];
        let mut result = frontier(&tips, is_ancestor);
        result.sort();
        assert_eq!(result, vec!["b", "c"]);
    }

    #[test]
    fn refract_groups_preserve_order() {
        let vertices = vec![1, 2, 3, 4, 5, 6];
        let buckets = refract(&vertices, |v| v % 2);
        assert_eq!(buckets[&0], vec![2, 4, 6]);
        assert_eq!(buckets[&1], vec![1, 3, 5]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        // Exactness: for any pool of (weight) peers and any k, a sample
        // never exceeds min(k, nonzero-weight peers), never duplicates a
        // peer, and never includes a zero-weight peer.
        proptest! {
            #[test]
            fn sample_is_exact(
                weights in proptest::collection::vec(0u64..5, 0..12),
                k in 0usize..8,
            ) {
                let peers: Vec<(NodeId, u64)> = weights
                    .iter()
                    .enumerate()
                    .map(|(i, w)| (node(i as u8 + 1), *w))
                    .collect();
                let nonzero = peers.iter().filter(|(_, w)| *w > 0).count();
                let pool = WeightedPool::new(peers.clone());
                let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
                let sample = rt.block_on(pool.sample(k, "votes"));

                prop_assert!(sample.len() <= k.min(nonzero));
                let mut unique = sample.clone();
                unique.sort();
                unique.dedup();
                prop_assert_eq!(unique.len(), sample.len());

                let zero_weight: std::collections::HashSet<NodeId> = peers
                    .iter()
                    .filter(|(_, w)| *w == 0)
                    .map(|(id, _)| *id)
                    .collect();
                prop_assert!(sample.iter().all(|id| !zero_weight.contains(id)));
            }
        }
    }
}
