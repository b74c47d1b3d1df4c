//! Frame and session identity types
//!
//! A frame is forwarded and discarded; it is never retained by the registry.

use std::net::SocketAddr;

use bytes::Bytes;

/// Opaque session identifier assigned at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) u64);

impl SessionId {
    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of video pushed by the frame source
///
/// Cheap to clone: the payload is reference counted.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Index of the stream on the source (0 = primary camera)
    pub stream_index: u32,
    /// Address the packet came from
    pub source: SocketAddr,
    /// Extended sequence number
    pub sequence: u32,
    /// Payload handed to each viewer unchanged
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(stream_index: u32, source: SocketAddr, sequence: u32, payload: Bytes) -> Self {
        Self {
            stream_index,
            source,
            sequence,
            payload,
        }
    }
}

/// Consumer of frame events
///
/// A source calls `on_frame` from a single task, one frame at a time.
pub trait FrameSink: Send + Sync + 'static {
    fn on_frame(&self, frame: Frame);
}
