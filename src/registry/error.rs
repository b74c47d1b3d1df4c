//! Registry error types

use super::frame::SessionId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The connection handle is already registered
    AlreadyRegistered,
    /// Session limit reached
    SessionLimit(usize),
    /// No session with this id
    UnknownSession(SessionId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::AlreadyRegistered => write!(f, "Connection already registered"),
            RegistryError::SessionLimit(max) => write!(f, "Session limit reached: {}", max),
            RegistryError::UnknownSession(id) => write!(f, "Unknown session: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}
