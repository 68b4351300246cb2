#![allow(clippy::too_many_arguments)]

//! Ring attention: exact softmax attention over sequences sharded across a ring of workers.
//!
//! Every worker keeps its query chunk resident and folds the key/value chunks that travel
//! around the ring into a running `(max, sum, output)` triple with the online-softmax
//! recurrence. After `world_size` rounds the triple is normalized into the attention output
//! and its log-sum-exp.

mod base;
/// Components for ring attention
pub mod components;
/// Settings used when launching ring attention
pub mod config;
/// Point-to-point exchange between ring neighbours
pub mod exchange;
/// Contains ring attention kernels
pub mod kernels;

#[cfg(test)]
mod tests;

pub use base::*;
