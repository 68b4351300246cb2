mod global;
mod settings;

pub use global::*;
pub use settings::*;
