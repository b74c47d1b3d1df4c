//! WebRTC engine abstraction
//!
//! ICE, DTLS/SRTP and SDP handling all live in an external engine. The
//! restreamer only needs to create connections, attach a single outbound
//! video track, watch the connection state and push payloads, so that is
//! the whole surface of these traits.
//!
//! The `webrtc` cargo feature provides an implementation backed by the
//! `webrtc` crate.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;

#[cfg(feature = "webrtc")]
pub mod webrtc_rs;

/// Connection state as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created, negotiation not started
    New,
    /// ICE/DTLS in progress
    Connecting,
    /// Media can flow
    Connected,
    /// Transport lost, may still recover
    Disconnected,
    /// Transport failed, will not recover
    Failed,
    /// Closed locally or remotely
    Closed,
}

impl ConnectionState {
    /// Whether a registry sweep may drop the connection.
    ///
    /// `Failed` is not included: a failed connection is closed first and is
    /// swept once the engine reports it as `Closed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Disconnected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Video codec carried by the outbound track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    H264,
    H265,
    Vp8,
    Vp9,
    Av1,
}

impl VideoCodec {
    /// MIME type used in SDP negotiation
    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "video/H264",
            VideoCodec::H265 => "video/H265",
            VideoCodec::Vp8 => "video/VP8",
            VideoCodec::Vp9 => "video/VP9",
            VideoCodec::Av1 => "video/AV1",
        }
    }

    /// RTP clock rate; every video payload format uses 90 kHz
    pub fn clock_rate(&self) -> u32 {
        90_000
    }
}

/// Direction of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackDirection {
    SendOnly,
    SendRecv,
}

/// Engine-assigned track handle, scoped to one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackId(pub u32);

/// Per-connection configuration handed to the engine
#[derive(Debug, Clone)]
pub struct RtcConfig {
    /// STUN/TURN server URLs
    pub ice_servers: Vec<String>,
    /// Codec of the single outbound video track
    pub codec: VideoCodec,
    /// Track id advertised in SDP
    pub track_id: String,
    /// Media stream id advertised in SDP
    pub stream_id: String,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: Vec::new(),
            codec: VideoCodec::H264,
            track_id: "video".to_string(),
            stream_id: "fpv".to_string(),
        }
    }
}

impl RtcConfig {
    /// Add a STUN/TURN server URL
    pub fn ice_server(mut self, url: impl Into<String>) -> Self {
        self.ice_servers.push(url.into());
        self
    }

    /// Set the outbound codec
    pub fn codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }
}

/// Error reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Connection is closed and cannot carry media
    ConnectionClosed,
    /// Track id does not belong to this connection
    UnknownTrack(TrackId),
    /// Engine-specific failure
    Backend(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::ConnectionClosed => write!(f, "Connection closed"),
            EngineError::UnknownTrack(id) => write!(f, "Unknown track: {}", id.0),
            EngineError::Backend(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// Callback invoked by the engine on every connection state change.
///
/// Engines may call it from any thread.
pub type StateChangeHandler = Box<dyn Fn(ConnectionState) + Send + Sync>;

/// One viewer's connection, owned by the engine
pub trait PeerConnection: Send + Sync + 'static {
    /// Engine-side identifier, used in logs only
    fn id(&self) -> &str;

    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// Attach an outbound video track
    fn add_video_track(
        &self,
        codec: VideoCodec,
        direction: TrackDirection,
    ) -> impl Future<Output = Result<TrackId, EngineError>> + Send;

    /// Install the state change handler, replacing any previous one
    fn on_state_change(&self, handler: StateChangeHandler);

    /// Send one payload on a video track
    ///
    /// May wait on the network; callers bound it with a timeout.
    fn send_video(
        &self,
        track: TrackId,
        payload: Bytes,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Close the connection
    fn close(&self, reason: &str) -> impl Future<Output = Result<(), EngineError>> + Send;
}

/// Factory for peer connections
pub trait RtcEngine: Send + Sync + 'static {
    type Connection: PeerConnection;

    /// Build a new connection object
    fn create_connection(
        &self,
        config: &RtcConfig,
    ) -> impl Future<Output = Result<Arc<Self::Connection>, EngineError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(ConnectionState::Closed.is_terminal());
        assert!(ConnectionState::Disconnected.is_terminal());

        assert!(!ConnectionState::New.is_terminal());
        assert!(!ConnectionState::Connecting.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
        assert!(!ConnectionState::Failed.is_terminal());
    }

    #[test]
    fn test_codec_mime_types() {
        assert_eq!(VideoCodec::H264.mime_type(), "video/H264");
        assert_eq!(VideoCodec::H265.mime_type(), "video/H265");
        assert_eq!(VideoCodec::Vp8.clock_rate(), 90_000);
    }

    #[test]
    fn test_rtc_config_builder() {
        let config = RtcConfig::default()
            .ice_server("stun:stun.l.google.com:19302")
            .codec(VideoCodec::H265);

        assert_eq!(config.ice_servers.len(), 1);
        assert_eq!(config.codec, VideoCodec::H265);
        assert_eq!(config.track_id, "video");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Failed.to_string(), "failed");
    }
}
