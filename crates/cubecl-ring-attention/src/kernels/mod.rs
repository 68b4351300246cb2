mod dispatch;
mod ring;
mod unit;

pub use dispatch::*;
pub use ring::*;
pub use unit::*;
