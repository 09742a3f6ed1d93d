pub mod executor;
pub mod orchestrator;
pub mod processor;
pub mod shutdown;

pub use executor::*;
pub use orchestrator::*;
pub use processor::*;
pub use shutdown::*;
