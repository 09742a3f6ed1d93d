pub mod client;
pub mod error;
pub mod parser;
pub mod prompts;
pub mod tokens;
pub mod validation;

pub use client::*;
pub use error::*;
pub use parser::*;
pub use prompts::*;
pub use tokens::*;
pub use validation::*;
