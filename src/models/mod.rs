pub mod candidate;
pub mod chunk;

pub use candidate::*;
pub use chunk::*;
