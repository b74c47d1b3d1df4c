//! RTP to WebRTC live video fan-out
//!
//! Takes a single low-latency RTP video stream coming off the air link and
//! multiplexes it to any number of WebRTC viewers, each negotiated and torn
//! down independently.
//!
//! # Architecture
//!
//! ```text
//!   [signaling transport] ──► Restreamer::create_session()
//!                                   │
//!                                   ▼
//!   [RtcEngine] ◄─── create ── SessionRegistry ◄── state changes (per-session task)
//!        ▲                          │
//!        │                          │ on_frame()
//!   send_video ◄── PeerSession ◄────┤
//!                  (per-peer queue) │
//!                                   │
//!                       [FrameSource: UDP/RTP]
//! ```
//!
//! The registry is the single shared piece of state. Broadcasting walks a
//! sharded map and pushes `Bytes` handles into bounded per-peer queues, so a
//! stalled viewer can never hold up the others.

pub mod engine;
pub mod error;
pub mod host;
pub mod registry;
pub mod restreamer;
pub mod session;
pub mod source;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{ConnectionState, PeerConnection, RtcConfig, RtcEngine, VideoCodec};
pub use error::{Error, Result};
pub use host::{MarkerFileMode, ModeSelector, RestreamHost, StaticMode};
pub use registry::{Frame, FrameSink, PeerSession, RegistryConfig, SessionId, SessionRegistry};
pub use restreamer::{ChannelTransport, Restreamer, RestreamerConfig, SignalingTransport};
pub use source::{FrameSource, SourceConfig, UdpRtpSource};
