//! Error types for the LORD heartbeat

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or inconsistent topology/registry. Fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// An engine invariant was violated. Faults the scheduler.
    #[error("computation error: {0}")]
    Computation(String),

    /// Content bus persistence failed after every retry.
    #[error("bus io error after {attempts} attempt(s): {message}")]
    BusIo { attempts: u32, message: String },

    #[error("scheduler is faulted: {0}")]
    Faulted(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn computation(message: impl Into<String>) -> Self {
        Self::Computation(message.into())
    }

    pub fn bus_io(attempts: u32, message: impl Into<String>) -> Self {
        Self::BusIo {
            attempts,
            message: message.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Computation(_) | Self::BusIo { .. } | Self::Faulted(_) => 3,
            Self::IoError(_) | Self::JsonError(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_config_from_fault() {
        assert_eq!(Error::config("bad tier").exit_code(), 2);
        assert_eq!(Error::computation("weights").exit_code(), 3);
        assert_eq!(Error::bus_io(3, "disk full").exit_code(), 3);
        assert_ne!(Error::config("x").exit_code(), 0);
    }

    #[test]
    fn bus_io_message_names_attempts() {
        let e = Error::bus_io(3, "permission denied");
        assert_eq!(
            e.to_string(),
            "bus io error after 3 attempt(s): permission denied"
        );
    }
}
