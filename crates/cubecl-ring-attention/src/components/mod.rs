pub mod tile;

mod accumulator;
mod error;
mod ident;
mod layout;
mod mask;
mod memory;
mod problem;
mod ring;
mod ring_buffer;
mod selection;
mod spec;
mod tensor;

pub use accumulator::*;
pub use error::*;
pub use ident::*;
pub use layout::*;
pub use mask::*;
pub use memory::*;
pub use problem::*;
pub use ring::*;
pub use ring_buffer::*;
pub use selection::*;
pub use spec::*;
pub use tensor::*;
