//! Session registry for viewer fan-out
//!
//! The registry owns every viewer session and routes frames from the single
//! frame source to all of them.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<SessionRegistry>
//!                   ┌──────────────────────────────┐
//!                   │ sessions: DashMap<SessionId, │
//!                   │   PeerSession {              │
//!                   │     armed,                   │
//!                   │     queue: mpsc::Sender,     │
//!                   │   }                          │
//!                   │ >                            │
//!                   └──────────────┬───────────────┘
//!                                  │
//!        ┌─────────────────────────┼─────────────────────────┐
//!        │                         │                         │
//!        ▼                         ▼                         ▼
//!   [FrameSource]            [writer task]             [writer task]
//!   on_frame()               rx.recv()                 rx.recv()
//!        │                         │                         │
//!        └──► registry.broadcast() ──► send_video() ──► engine
//! ```
//!
//! # Zero-Copy Design
//!
//! Frames carry `bytes::Bytes`, so every viewer queue holds a reference to
//! the same allocation rather than a copy.

pub mod config;
pub mod entry;
pub mod error;
pub mod frame;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{Delivery, PeerSession};
pub use error::RegistryError;
pub use frame::{Frame, FrameSink, SessionId};
pub use store::SessionRegistry;
