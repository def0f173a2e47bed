//! Nova Consensus Kernel
//!
//! A sampling-based probabilistic consensus kernel: repeated k-peer random
//! sampling turns into finalized decisions on opaque items through four
//! composable primitives — Photon (per-item preference), Wave (per-round
//! threshold tally), Focus (β-consecutive-success confidence), and
//! Prism/Horizon (DAG geometry). Two engine shapes compose them: a linear
//! chain engine for one-of-two-choices-per-slot decisions, and a DAG
//! engine (Nebula) over vertex antichains with a Flare fast-path and a
//! Ringtail/Quasar post-quantum dual-certificate finality overlay.
//!
//! Transports, validator-set staking, storage, networking, and
//! cryptographic primitives below the aggregation layer are external
//! collaborators, reached only through the traits in [`external`].

pub mod config;
pub mod engines;
pub mod error;
pub mod external;
pub mod flare;
pub mod focus;
pub mod horizon;
pub mod ids;
pub mod item;
pub mod photon;
pub mod quasar;
pub mod ringtail;
pub mod sampler;
pub mod scheduler;
pub mod wave;

pub use config::{FpcConfig, Parameters};
pub use engines::{DagEngine, Decision, LinearEngine};
pub use error::{NovaError, NovaResult};
pub use ids::{Digest, NodeId};
pub use item::Item;
pub use scheduler::Scheduler;

