//! LORD Core - data model and error taxonomy shared by the heartbeat crates

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
