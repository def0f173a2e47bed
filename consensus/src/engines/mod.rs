//! The two engine shapes built on Photon/Wave/Focus: a linear chain
//! engine deciding one of two preferences per slot, and a DAG engine
//! deciding over an antichain of vertices.

pub mod dag;
pub mod linear;

pub use dag::DagEngine;
pub use linear::{Decision, LinearEngine};
