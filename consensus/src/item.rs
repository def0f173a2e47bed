//! The generic item type consensus decides over.

use std::fmt::Debug;
use std::hash::Hash;

/// Anything the kernel can decide on: a block id, a DAG vertex id, or a
/// transaction id. The only required capability is equality;
/// `Clone + Hash + Debug + Send + Sync` follow from storing items as map
/// keys across thread-driven ticks.
pub trait Item: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> Item for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}
