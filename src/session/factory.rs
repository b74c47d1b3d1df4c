//! Peer connection factory
//!
//! Builds one viewer connection per signaling request: create the connection,
//! attach the outbound video track, register it, and hand its state changes
//! to a per-session lifecycle task.

use std::sync::{Arc, Weak};

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::engine::{ConnectionState, PeerConnection, RtcConfig, RtcEngine, TrackDirection};
use crate::error::Result;
use crate::registry::{SessionId, SessionRegistry};
use crate::restreamer::transport::SessionFactory;

use super::state::{SessionState, Transition};

/// Creates and wires viewer connections
pub struct PeerFactory<E: RtcEngine> {
    engine: Arc<E>,
    registry: Arc<SessionRegistry<E::Connection>>,
    rtc: Arc<RtcConfig>,
}

impl<E: RtcEngine> Clone for PeerFactory<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            registry: Arc::clone(&self.registry),
            rtc: Arc::clone(&self.rtc),
        }
    }
}

impl<E: RtcEngine> PeerFactory<E> {
    pub fn new(
        engine: Arc<E>,
        registry: Arc<SessionRegistry<E::Connection>>,
        rtc: RtcConfig,
    ) -> Self {
        Self {
            engine,
            registry,
            rtc: Arc::new(rtc),
        }
    }

    /// Build, register and wire a new viewer connection
    ///
    /// On failure nothing stays registered and the fresh connection is closed.
    pub async fn create(&self) -> Result<Arc<E::Connection>> {
        let connection = self.engine.create_connection(&self.rtc).await?;

        let track = match connection
            .add_video_track(self.rtc.codec, TrackDirection::SendOnly)
            .await
        {
            Ok(track) => track,
            Err(e) => {
                tracing::warn!(conn = connection.id(), error = %e, "Failed to add video track");
                close_quietly(connection.as_ref(), "track setup failed").await;
                return Err(e.into());
            }
        };

        let session_id = match self.registry.register(Arc::clone(&connection), track) {
            Ok(id) => id,
            Err(e) => {
                close_quietly(connection.as_ref(), "registration refused").await;
                return Err(e.into());
            }
        };

        let (state_tx, state_rx) = mpsc::unbounded_channel();
        connection.on_state_change(Box::new(move |state| {
            // Receiver gone means the session already finished
            let _ = state_tx.send(state);
        }));

        let span = tracing::info_span!("viewer", session_id = %session_id, conn = connection.id());
        tokio::spawn(
            drive_lifecycle(
                session_id,
                Arc::downgrade(&connection),
                Arc::clone(&self.registry),
                state_rx,
            )
            .instrument(span),
        );

        Ok(connection)
    }

    /// Wrap this factory for a signaling transport
    pub fn session_factory(&self) -> SessionFactory<E::Connection> {
        let factory = self.clone();
        Arc::new(move || {
            let factory = factory.clone();
            async move { factory.create().await }.boxed()
        })
    }
}

async fn close_quietly<C: PeerConnection>(connection: &C, reason: &str) {
    if let Err(e) = connection.close(reason).await {
        tracing::debug!(conn = connection.id(), error = %e, "Close failed");
    }
}

/// Apply state changes for one session, in order, until it is closed
///
/// Holds the connection weakly so a dropped connection ends the task.
pub(crate) async fn drive_lifecycle<C: PeerConnection>(
    id: SessionId,
    connection: Weak<C>,
    registry: Arc<SessionRegistry<C>>,
    mut states: mpsc::UnboundedReceiver<ConnectionState>,
) {
    let mut session = SessionState::new(id);

    while let Some(state) = states.recv().await {
        match session.on_connection_state(state) {
            Transition::None => {
                tracing::debug!(state = %state, "Connection state changed");
            }
            Transition::Activate => {
                if !registry.contains(id) {
                    // Swept while disconnected; it would never get frames again
                    tracing::info!("Viewer reconnected after sweep, closing");
                    if let Some(connection) = connection.upgrade() {
                        close_quietly(connection.as_ref(), "session swept").await;
                    }
                    break;
                }
                tracing::info!(
                    setup_ms = session.setup_time().map(|d| d.as_millis() as u64),
                    "Viewer connected"
                );
                let _ = registry.activate(id);
            }
            Transition::Deactivate => {
                tracing::info!("Viewer connection closed");
                if registry.contains(id) {
                    let _ = registry.deactivate(id);
                } else {
                    tracing::debug!("Session already swept");
                }
            }
            Transition::DeactivateAndClose => {
                tracing::warn!("Viewer connection failed, closing");
                if registry.contains(id) {
                    let _ = registry.deactivate(id);
                }
                if let Some(connection) = connection.upgrade() {
                    close_quietly(connection.as_ref(), "connection failed").await;
                }
            }
        }

        if session.is_finished() {
            break;
        }
    }

    tracing::debug!(
        duration_ms = session.duration().as_millis() as u64,
        "Session lifecycle finished"
    );
}
