//! Viewer session state machine
//!
//! Maps engine connection states onto registry transitions. Every state
//! change for one connection is applied here in order, so a late `connected`
//! can never re-arm a session that already failed or closed.

use std::time::{Duration, Instant};

use crate::engine::ConnectionState;
use crate::registry::SessionId;

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Registered, ICE/DTLS not finished
    Negotiating,
    /// Connected and armed
    Streaming,
    /// Failed, close requested from the engine
    Closing,
    /// Connection closed
    Closed,
}

/// Registry action produced by a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to do
    None,
    /// Arm the session
    Activate,
    /// Disarm the session
    Deactivate,
    /// Disarm the session and close the connection
    DeactivateAndClose,
}

/// Lifecycle state of one viewer session
#[derive(Debug)]
pub struct SessionState {
    /// Registry id
    pub id: SessionId,

    /// Current phase
    pub phase: SessionPhase,

    /// Registration time
    pub created_at: Instant,

    /// Time the connection first reached `connected`
    pub connected_at: Option<Instant>,

    /// Last engine state observed
    pub last_state: ConnectionState,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            phase: SessionPhase::Negotiating,
            created_at: Instant::now(),
            connected_at: None,
            last_state: ConnectionState::New,
        }
    }

    /// Apply an engine state change
    pub fn on_connection_state(&mut self, state: ConnectionState) -> Transition {
        self.last_state = state;

        match (state, self.phase) {
            (_, SessionPhase::Closed) => Transition::None,

            (ConnectionState::Connected, SessionPhase::Closing) => Transition::None,
            (ConnectionState::Connected, _) => {
                self.phase = SessionPhase::Streaming;
                self.connected_at.get_or_insert_with(Instant::now);
                Transition::Activate
            }

            (ConnectionState::Failed, SessionPhase::Closing) => Transition::None,
            (ConnectionState::Failed, _) => {
                self.phase = SessionPhase::Closing;
                Transition::DeactivateAndClose
            }

            // Already disarmed when the failure was handled
            (ConnectionState::Closed, SessionPhase::Closing) => {
                self.phase = SessionPhase::Closed;
                Transition::None
            }
            (ConnectionState::Closed, _) => {
                self.phase = SessionPhase::Closed;
                Transition::Deactivate
            }

            (ConnectionState::New, _)
            | (ConnectionState::Connecting, _)
            | (ConnectionState::Disconnected, _) => Transition::None,
        }
    }

    /// Whether no further state changes matter
    pub fn is_finished(&self) -> bool {
        self.phase == SessionPhase::Closed
    }

    /// Time from registration to first `connected`
    pub fn setup_time(&self) -> Option<Duration> {
        self.connected_at
            .map(|at| at.duration_since(self.created_at))
    }

    /// Get session duration
    pub fn duration(&self) -> Duration {
        self.created_at.elapsed()
    }
}
