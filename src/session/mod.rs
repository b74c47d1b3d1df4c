//! Viewer session lifecycle
//!
//! [`PeerFactory`] creates one connection per signaling request and starts a
//! lifecycle task for it; [`SessionState`] is the state machine that task
//! runs.

pub mod factory;
pub mod state;

pub use factory::PeerFactory;
pub use state::{SessionPhase, SessionState, Transition};
