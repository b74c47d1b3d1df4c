//! Engine backed by the `webrtc` crate
//!
//! Each viewer track is a [`TrackLocalStaticRTP`]: the RTP packets coming off
//! the frame source are written as-is and the track rewrites SSRC and payload
//! type for the negotiated binding.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};

use super::{
    ConnectionState, EngineError, PeerConnection, RtcConfig, RtcEngine, StateChangeHandler,
    TrackDirection, TrackId, VideoCodec,
};

impl From<webrtc::Error> for EngineError {
    fn from(e: webrtc::Error) -> Self {
        EngineError::Backend(e.to_string())
    }
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => ConnectionState::New,
            RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
            RTCPeerConnectionState::Connected => ConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => ConnectionState::Failed,
            RTCPeerConnectionState::Closed => ConnectionState::Closed,
        }
    }
}

/// [`RtcEngine`] using default codecs and interceptors
pub struct WebRtcEngine {
    api: API,
}

impl WebRtcEngine {
    pub fn new() -> Result<Self, EngineError> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;

        // NACK, RTCP reports and TWCC
        let registry = register_default_interceptors(Registry::new(), &mut media)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api })
    }
}

impl RtcEngine for WebRtcEngine {
    type Connection = WebRtcConnection;

    async fn create_connection(&self, config: &RtcConfig) -> Result<Arc<WebRtcConnection>, EngineError> {
        let mut rtc = RTCConfiguration::default();
        if !config.ice_servers.is_empty() {
            rtc.ice_servers = vec![RTCIceServer {
                urls: config.ice_servers.clone(),
                ..Default::default()
            }];
        }

        let pc = Arc::new(self.api.new_peer_connection(rtc).await?);
        tracing::debug!(conn = pc.get_stats_id(), "Peer connection created");

        Ok(Arc::new(WebRtcConnection {
            id: pc.get_stats_id().to_owned(),
            pc,
            tracks: Mutex::new(Vec::new()),
            track_id: config.track_id.clone(),
            stream_id: config.stream_id.clone(),
        }))
    }
}

/// One viewer's peer connection
pub struct WebRtcConnection {
    id: String,
    pc: Arc<RTCPeerConnection>,
    tracks: Mutex<Vec<Arc<TrackLocalStaticRTP>>>,
    track_id: String,
    stream_id: String,
}

impl WebRtcConnection {
    /// Underlying `webrtc` peer connection
    pub fn inner(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }

    /// Answer a remote SDP offer
    ///
    /// Waits for ICE gathering to complete so the answer carries every
    /// candidate; transports exchange exactly one offer and one answer.
    pub async fn negotiate(&self, offer_sdp: String) -> Result<String, EngineError> {
        let offer = RTCSessionDescription::offer(offer_sdp)?;
        self.pc.set_remote_description(offer).await?;

        let answer = self.pc.create_answer(None).await?;
        let mut gather_complete = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(answer).await?;
        let _ = gather_complete.recv().await;

        self.pc
            .local_description()
            .await
            .map(|desc| desc.sdp)
            .ok_or_else(|| EngineError::Backend("no local description".into()))
    }

    fn track(&self, track: TrackId) -> Option<Arc<TrackLocalStaticRTP>> {
        let tracks = self.tracks.lock().unwrap_or_else(PoisonError::into_inner);
        tracks.get(track.0 as usize).cloned()
    }
}

fn codec_capability(codec: VideoCodec) -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: codec.mime_type().to_owned(),
        clock_rate: codec.clock_rate(),
        ..Default::default()
    }
}

impl PeerConnection for WebRtcConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> ConnectionState {
        self.pc.connection_state().into()
    }

    async fn add_video_track(
        &self,
        codec: VideoCodec,
        direction: TrackDirection,
    ) -> Result<TrackId, EngineError> {
        let track = Arc::new(TrackLocalStaticRTP::new(
            codec_capability(codec),
            self.track_id.clone(),
            self.stream_id.clone(),
        ));
        let local = Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>;

        let sender = match direction {
            TrackDirection::SendOnly => {
                let init = RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Sendonly,
                    send_encodings: vec![],
                };
                self.pc
                    .add_transceiver_from_track(local, Some(init))
                    .await?
                    .sender()
                    .await
            }
            TrackDirection::SendRecv => self.pc.add_track(local).await?,
        };

        // Drain RTCP so the interceptors keep running
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while sender.read(&mut rtcp_buf).await.is_ok() {}
        });

        let mut tracks = self.tracks.lock().unwrap_or_else(PoisonError::into_inner);
        tracks.push(track);
        Ok(TrackId(tracks.len() as u32 - 1))
    }

    fn on_state_change(&self, handler: StateChangeHandler) {
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                handler(state.into());
                Box::pin(async {})
            }));
    }

    async fn send_video(&self, track: TrackId, payload: Bytes) -> Result<(), EngineError> {
        let track = self.track(track).ok_or(EngineError::UnknownTrack(track))?;
        track.write(&payload).await?;
        Ok(())
    }

    async fn close(&self, reason: &str) -> Result<(), EngineError> {
        tracing::debug!(conn = %self.id, reason, "Closing peer connection");
        self.pc.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mapping() {
        assert_eq!(
            ConnectionState::from(RTCPeerConnectionState::Unspecified),
            ConnectionState::New
        );
        assert_eq!(
            ConnectionState::from(RTCPeerConnectionState::Failed),
            ConnectionState::Failed
        );
        assert!(ConnectionState::from(RTCPeerConnectionState::Disconnected).is_terminal());
    }

    #[tokio::test]
    async fn test_create_connection_and_track() {
        let engine = WebRtcEngine::new().unwrap();
        let conn = engine.create_connection(&RtcConfig::default()).await.unwrap();

        assert_eq!(conn.state(), ConnectionState::New);
        let track = conn
            .add_video_track(VideoCodec::H264, TrackDirection::SendOnly)
            .await
            .unwrap();
        assert_eq!(track, TrackId(0));

        let missing = conn.send_video(TrackId(7), Bytes::new()).await;
        assert!(matches!(missing, Err(EngineError::UnknownTrack(TrackId(7)))));

        conn.close("test").await.unwrap();
    }
}
