//! Error taxonomy for the consensus kernel.
//!
//! Transient errors (`PollIncomplete`, `InvalidVote`, `DuplicateShare`,
//! `RoundTimeout`) never surface through this type — callers that would
//! otherwise raise them instead feed an unsuccessful poll back into Wave or
//! drop the offending message. Only the structural failures that halt an
//! engine or a round are represented here.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type NovaResult<T> = Result<T, NovaError>;

/// Errors a caller of this crate may observe.
#[derive(Debug, Error)]
pub enum NovaError {
    /// A vertex was inserted before one of its parents.
    #[error("dangling parent: vertex {vertex} references missing parent {parent}")]
    DanglingParent { vertex: String, parent: String },

    /// Parameters failed validation at engine construction.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// `Committer::commit` returned an error; fatal, halts the engine.
    #[error("committer failed: {0}")]
    CommitterFailed(#[source] anyhow::Error),

    /// Appending to the finalized log failed before `onFinalized` ran.
    #[error("finalized log append failed: {0}")]
    LogAppendFailed(#[source] anyhow::Error),

    /// `Proposer::propose` failed. Non-fatal in the DAG engine but still
    /// surfaced so callers can log or retry.
    #[error("proposer failed: {0}")]
    ProposerFailed(#[source] anyhow::Error),

    /// The operation was cancelled; no state was mutated.
    #[error("operation cancelled")]
    Cancelled,

    /// Cryptographic verification failed; fatal for the Ringtail round it
    /// occurred in.
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
