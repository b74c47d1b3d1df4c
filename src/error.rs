//! Crate error types

use crate::engine::EngineError;
use crate::registry::RegistryError;

/// Error type for restreamer operations
#[derive(Debug)]
pub enum Error {
    /// Socket or file I/O failed
    Io(std::io::Error),
    /// The WebRTC engine rejected an operation
    Engine(EngineError),
    /// Session registry refused an operation
    Registry(RegistryError),
    /// Start was called on a component that is already running
    AlreadyRunning,
    /// Operation requires a running component
    NotRunning,
    /// Signaling transport failure
    Transport(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Engine(e) => write!(f, "Engine error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::AlreadyRunning => write!(f, "Already running"),
            Error::NotRunning => write!(f, "Not running"),
            Error::Transport(msg) => write!(f, "Transport error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Engine(e) => Some(e),
            Error::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        Error::Engine(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
