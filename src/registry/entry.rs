//! Per-viewer session
//!
//! A session couples one engine connection with a transmit gate. Frames pass
//! the gate only while the session is armed, and then go into a bounded queue
//! drained by a writer task that owns the (possibly slow) engine send.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::engine::{PeerConnection, TrackId};
use crate::stats::PeerStats;

use super::config::RegistryConfig;
use super::frame::SessionId;

/// Outcome of offering a frame to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Frame queued for the engine
    Queued,
    /// Session not armed, frame skipped
    NotArmed,
    /// Peer queue full, frame skipped
    QueueFull,
    /// Writer task is gone
    Closed,
}

#[derive(Debug, Default)]
struct PeerCounters {
    queued: AtomicU64,
    sent: AtomicU64,
    dropped_unarmed: AtomicU64,
    dropped_full: AtomicU64,
    dropped_closed: AtomicU64,
    send_failures: AtomicU64,
    send_timeouts: AtomicU64,
    arms: AtomicU64,
    disarms: AtomicU64,
}

/// One viewer in the registry
pub struct PeerSession<C: PeerConnection> {
    id: SessionId,
    connection: Arc<C>,
    armed: AtomicBool,
    queue: mpsc::Sender<Bytes>,
    counters: Arc<PeerCounters>,
    created_at: Instant,
}

impl<C: PeerConnection> PeerSession<C> {
    /// Create a session and spawn its writer task
    ///
    /// Must be called from within a Tokio runtime.
    pub(super) fn new(
        id: SessionId,
        connection: Arc<C>,
        track: TrackId,
        config: &RegistryConfig,
    ) -> Self {
        let (queue, rx) = mpsc::channel(config.peer_queue_depth.max(1));
        let counters = Arc::new(PeerCounters::default());

        tokio::spawn(run_writer(
            id,
            Arc::clone(&connection),
            track,
            rx,
            Arc::clone(&counters),
            config.send_timeout,
        ));

        Self {
            id,
            connection,
            armed: AtomicBool::new(false),
            queue,
            counters,
            created_at: Instant::now(),
        }
    }

    /// Session id
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Underlying engine connection
    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    /// Whether frames are currently forwarded
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Arm the session; returns true if it was not armed before
    pub fn start(&self) -> bool {
        let changed = !self.armed.swap(true, Ordering::AcqRel);
        if changed {
            self.counters.arms.fetch_add(1, Ordering::Relaxed);
        }
        changed
    }

    /// Disarm the session; returns true if it was armed before
    pub fn stop(&self) -> bool {
        let changed = self.armed.swap(false, Ordering::AcqRel);
        if changed {
            self.counters.disarms.fetch_add(1, Ordering::Relaxed);
        }
        changed
    }

    /// Offer a payload to this viewer
    ///
    /// Never blocks. Unarmed sessions silently skip the frame, and a full
    /// queue drops it rather than delaying the broadcast.
    pub fn send_frame(&self, payload: &Bytes) -> Delivery {
        if !self.is_armed() {
            self.counters.dropped_unarmed.fetch_add(1, Ordering::Relaxed);
            return Delivery::NotArmed;
        }

        match self.queue.try_send(payload.clone()) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                Delivery::Queued
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.counters.dropped_full.fetch_add(1, Ordering::Relaxed);
                if dropped == 0 {
                    tracing::warn!(session_id = %self.id, "Peer queue full, dropping frames");
                }
                Delivery::QueueFull
            }
            Err(TrySendError::Closed(_)) => {
                let dropped = self.counters.dropped_closed.fetch_add(1, Ordering::Relaxed);
                if dropped == 0 {
                    tracing::warn!(session_id = %self.id, "Peer writer gone, dropping frames");
                }
                Delivery::Closed
            }
        }
    }

    /// Number of armed -> disarmed transitions
    pub fn disarm_count(&self) -> u64 {
        self.counters.disarms.load(Ordering::Relaxed)
    }

    /// Number of disarmed -> armed transitions
    pub fn arm_count(&self) -> u64 {
        self.counters.arms.load(Ordering::Relaxed)
    }

    /// Snapshot of this session's counters
    pub fn stats(&self) -> PeerStats {
        let c = &self.counters;
        PeerStats {
            session_id: self.id,
            state: self.connection.state(),
            armed: self.is_armed(),
            age: self.created_at.elapsed(),
            frames_queued: c.queued.load(Ordering::Relaxed),
            frames_sent: c.sent.load(Ordering::Relaxed),
            dropped_unarmed: c.dropped_unarmed.load(Ordering::Relaxed),
            dropped_queue_full: c.dropped_full.load(Ordering::Relaxed),
            dropped_closed: c.dropped_closed.load(Ordering::Relaxed),
            send_failures: c.send_failures.load(Ordering::Relaxed),
            send_timeouts: c.send_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Drain the peer queue into the engine until the session is dropped
async fn run_writer<C: PeerConnection>(
    id: SessionId,
    connection: Arc<C>,
    track: TrackId,
    mut rx: mpsc::Receiver<Bytes>,
    counters: Arc<PeerCounters>,
    send_timeout: Duration,
) {
    while let Some(payload) = rx.recv().await {
        match tokio::time::timeout(send_timeout, connection.send_video(track, payload)).await {
            Ok(Ok(())) => {
                counters.sent.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                // Only the first failure is worth a warning, the rest are noise
                if counters.send_failures.fetch_add(1, Ordering::Relaxed) == 0 {
                    tracing::warn!(session_id = %id, error = %e, "Failed to send video");
                } else {
                    tracing::trace!(session_id = %id, error = %e, "Failed to send video");
                }
            }
            Err(_) => {
                if counters.send_timeouts.fetch_add(1, Ordering::Relaxed) == 0 {
                    tracing::warn!(
                        session_id = %id,
                        timeout_ms = send_timeout.as_millis() as u64,
                        "Video send timed out"
                    );
                }
            }
        }
    }

    tracing::debug!(session_id = %id, conn = connection.id(), "Peer writer finished");
}
