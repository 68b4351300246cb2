//! Leaf of the computation: one query block against one key/value block.

mod attention;
mod scratch;
mod softmax;
mod state;

pub use attention::*;
pub use scratch::*;
pub use softmax::*;
pub use state::*;
