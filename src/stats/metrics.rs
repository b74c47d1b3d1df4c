//! Statistics for viewer sessions and the frame source
//!
//! These are point-in-time snapshots built from atomic counters. They are
//! reported only and never gate the broadcast path.

use std::time::Duration;

use crate::engine::ConnectionState;
use crate::registry::SessionId;

/// Per-viewer statistics
#[derive(Debug, Clone)]
pub struct PeerStats {
    /// Session id
    pub session_id: SessionId,
    /// Engine connection state at snapshot time
    pub state: ConnectionState,
    /// Whether frames are currently forwarded
    pub armed: bool,
    /// Time since registration
    pub age: Duration,
    /// Frames accepted into the peer queue
    pub frames_queued: u64,
    /// Frames handed to the engine successfully
    pub frames_sent: u64,
    /// Frames skipped because the session was not armed
    pub dropped_unarmed: u64,
    /// Frames skipped because the peer queue was full
    pub dropped_queue_full: u64,
    /// Frames skipped because the peer writer task had ended
    pub dropped_closed: u64,
    /// Engine sends that returned an error
    pub send_failures: u64,
    /// Engine sends that exceeded the send timeout
    pub send_timeouts: u64,
}

impl PeerStats {
    /// Total frames this viewer did not receive
    pub fn frames_lost(&self) -> u64 {
        self.dropped_queue_full + self.dropped_closed + self.send_failures + self.send_timeouts
    }

    /// Fraction of queued frames that made it to the engine
    pub fn delivery_ratio(&self) -> f64 {
        if self.frames_queued > 0 {
            self.frames_sent as f64 / self.frames_queued as f64
        } else {
            0.0
        }
    }
}

/// Registry-wide statistics
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Registered sessions, including ones awaiting cleanup
    pub registered: usize,
    /// Sessions whose connection is not closed or disconnected
    pub active: usize,
    /// Sessions currently armed
    pub armed: usize,
    /// Frames broadcast since creation
    pub frames_broadcast: u64,
    /// Sessions removed by cleanup since creation
    pub sessions_swept: u64,
    /// Per-session breakdown
    pub peers: Vec<PeerStats>,
}

impl RegistryStats {
    /// Sum of frames lost across all current viewers
    pub fn total_frames_lost(&self) -> u64 {
        self.peers.iter().map(PeerStats::frames_lost).sum()
    }
}

/// Frame source statistics
#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    /// Datagrams received
    pub packets_received: u64,
    /// Datagrams rejected as malformed RTP
    pub packets_malformed: u64,
    /// Receive calls that failed with a non-transient error
    pub recv_errors: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Frames handed to the sink
    pub frames_emitted: u64,
    /// Last extended sequence number seen
    pub last_sequence: Option<u32>,
}
