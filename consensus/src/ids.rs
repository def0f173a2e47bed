//! Opaque identifier and digest newtypes.
//!
//! These are the minimal stand-ins for what a real deployment gets from its
//! identity and cryptography layers (out of scope here); `NodeId` carries
//! no key material and `Digest` is a bare BLAKE3 output, not a signature.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A validator/peer identifier. `Ord` is load-bearing: Ringtail share
/// aggregation and Flare vote bookkeeping both require a deterministic
/// ordering over voter ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..8])
    }
}

/// A 32-byte BLAKE3 digest, used for vote/proposal/commit digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..8])
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Builds a domain-separated BLAKE3 digest over a sequence of byte
/// segments. Every wire digest here (vote / proposal / commit) is built
/// this way: a fixed domain tag followed by big-endian-encoded fields.
pub fn hash_segments(domain: &str, segments: &[&[u8]]) -> Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain.as_bytes());
    for seg in segments {
        hasher.update(seg);
    }
    Digest(*hasher.finalize().as_bytes())
}

/// Vote digest: `H(item-id || uint64-BE(round) || byte(prefer?1:0))`.
pub fn vote_digest(item_bytes: &[u8], round: u64, prefer: bool) -> Digest {
    hash_segments(
        "nova.vote.v1",
        &[item_bytes, &round.to_be_bytes(), &[prefer as u8]],
    )
}

/// Proposal digest: `H(vertex-id || uint64-BE(height))`.
pub fn proposal_digest(vertex_bytes: &[u8], height: u64) -> Digest {
    hash_segments("nova.proposal.v1", &[vertex_bytes, &height.to_be_bytes()])
}

/// Commit digest: `H(proposalDigest || uint64-BE(round) || uint64-BE(height))`.
pub fn commit_digest(proposal_digest: &Digest, round: u64, height: u64) -> Digest {
    hash_segments(
        "nova.commit.v1",
        &[
            proposal_digest.as_bytes(),
            &round.to_be_bytes(),
            &height.to_be_bytes(),
        ],
    )
}
