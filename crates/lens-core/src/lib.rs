pub mod error;
pub mod indicators;
pub mod types;

pub use error::*;
pub use types::*;
