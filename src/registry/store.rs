//! Session registry implementation
//!
//! The central registry that owns every viewer session, fans frames out to
//! them, and sweeps the ones whose connections have gone away.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::engine::{ConnectionState, PeerConnection, TrackId};
use crate::stats::RegistryStats;

use super::config::RegistryConfig;
use super::entry::PeerSession;
use super::error::RegistryError;
use super::frame::{Frame, FrameSink, SessionId};

/// Central registry for all viewer sessions
///
/// Backed by sharded concurrent maps, so broadcasting, registration and
/// cleanup can run on different threads without a registry-wide lock.
pub struct SessionRegistry<C: PeerConnection> {
    /// Sessions keyed by registry-assigned id
    sessions: DashMap<SessionId, Arc<PeerSession<C>>>,

    /// Connection handle identity -> session id, for duplicate detection
    handles: DashMap<usize, SessionId>,

    /// Slots taken, reserved before insert so the session cap holds under races
    reserved: AtomicUsize,

    next_id: AtomicU64,
    frames_broadcast: AtomicU64,
    sessions_swept: AtomicU64,

    /// Configuration
    config: RegistryConfig,
}

/// Identity of an engine handle; stable while the registry holds the `Arc`
fn handle_key<C>(connection: &Arc<C>) -> usize {
    Arc::as_ptr(connection) as *const () as usize
}

impl<C: PeerConnection> SessionRegistry<C> {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            handles: DashMap::new(),
            reserved: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            frames_broadcast: AtomicU64::new(0),
            sessions_swept: AtomicU64::new(0),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a new connection
    ///
    /// The session starts unarmed. Registering the same handle twice is a
    /// caller bug: it is logged and the registry is left unchanged.
    pub fn register(&self, connection: Arc<C>, track: TrackId) -> Result<SessionId, RegistryError> {
        let max = self.config.max_sessions;
        if !self.reserve_slot() {
            tracing::warn!(conn = connection.id(), max_sessions = max, "Session rejected: limit reached");
            return Err(RegistryError::SessionLimit(max));
        }

        let id = match self.handles.entry(handle_key(&connection)) {
            Entry::Occupied(existing) => {
                tracing::error!(
                    session_id = %existing.get(),
                    conn = connection.id(),
                    "Connection registered twice"
                );
                self.reserved.fetch_sub(1, Ordering::AcqRel);
                return Err(RegistryError::AlreadyRegistered);
            }
            Entry::Vacant(slot) => {
                let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
                slot.insert(id);
                id
            }
        };

        let conn_id = connection.id().to_string();
        let session = PeerSession::new(id, connection, track, &self.config);
        self.sessions.insert(id, Arc::new(session));

        tracing::info!(
            session_id = %id,
            conn = %conn_id,
            sessions = self.sessions.len(),
            "Session registered"
        );

        Ok(id)
    }

    /// Take one slot, failing if the session cap is reached
    fn reserve_slot(&self) -> bool {
        let max = self.config.max_sessions;
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |taken| {
                (max == 0 || taken < max).then_some(taken + 1)
            })
            .is_ok()
    }

    /// Arm a session so it starts receiving frames
    pub fn activate(&self, id: SessionId) -> Result<(), RegistryError> {
        match self.sessions.get(&id) {
            Some(session) => {
                if session.start() {
                    tracing::info!(session_id = %id, "Session activated");
                }
                Ok(())
            }
            None => {
                tracing::error!(session_id = %id, "Activate on unknown session");
                Err(RegistryError::UnknownSession(id))
            }
        }
    }

    /// Disarm a session so it stops receiving frames
    pub fn deactivate(&self, id: SessionId) -> Result<(), RegistryError> {
        match self.sessions.get(&id) {
            Some(session) => {
                if session.stop() {
                    tracing::info!(session_id = %id, "Session deactivated");
                }
                Ok(())
            }
            None => {
                tracing::error!(session_id = %id, "Deactivate on unknown session");
                Err(RegistryError::UnknownSession(id))
            }
        }
    }

    /// Broadcast a payload to every registered session
    ///
    /// Walks the map in place, one shard at a time. Each peer only costs a
    /// non-blocking queue push; unarmed peers skip the frame.
    pub fn broadcast(&self, frame: &Frame) {
        self.frames_broadcast.fetch_add(1, Ordering::Relaxed);

        for entry in self.sessions.iter() {
            entry.value().send_frame(&frame.payload);
        }
    }

    /// Remove sessions whose connections are closed or disconnected
    ///
    /// A swept connection that is not already closed is closed through the
    /// engine, so a link that recovers later cannot linger unregistered.
    /// Returns the number of sessions removed.
    pub fn cleanup(&self) -> usize {
        let mut removed = Vec::new();

        self.sessions.retain(|id, session| {
            let state = session.connection().state();
            if state.is_terminal() {
                let connection = Arc::clone(session.connection());
                removed.push((*id, handle_key(&connection), state, connection));
                false
            } else {
                true
            }
        });

        self.reserved.fetch_sub(removed.len(), Ordering::AcqRel);
        let count = removed.len();
        for (id, handle, state, connection) in removed {
            self.handles.remove(&handle);
            tracing::info!(session_id = %id, state = %state, "Session removed by cleanup");

            if state != ConnectionState::Closed {
                close_swept(id, connection);
            }
        }

        self.sessions_swept.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Number of sessions whose connection is not closed or disconnected
    pub fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| !entry.value().connection().state().is_terminal())
            .count()
    }

    /// Number of registered sessions, including ones awaiting cleanup
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are registered
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Whether a session id is registered
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Look up a session
    pub fn get(&self, id: SessionId) -> Option<Arc<PeerSession<C>>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of registry and per-session statistics
    pub fn stats(&self) -> RegistryStats {
        let peers: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().stats())
            .collect();

        RegistryStats {
            registered: peers.len(),
            active: peers.iter().filter(|p| !p.state.is_terminal()).count(),
            armed: peers.iter().filter(|p| p.armed).count(),
            frames_broadcast: self.frames_broadcast.load(Ordering::Relaxed),
            sessions_swept: self.sessions_swept.load(Ordering::Relaxed),
            peers,
        }
    }

    /// Spawn background cleanup task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = registry.cleanup();
                if removed > 0 {
                    tracing::debug!(
                        removed = removed,
                        remaining = registry.len(),
                        "Cleanup pass finished"
                    );
                }
            }
        })
    }
}

/// Close a swept connection on the current runtime
fn close_swept<C: PeerConnection>(id: SessionId, connection: Arc<C>) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(session_id = %id, conn = connection.id(), "No runtime to close swept connection");
        return;
    };

    runtime.spawn(async move {
        if let Err(e) = connection.close("swept by cleanup").await {
            tracing::debug!(session_id = %id, error = %e, "Close of swept connection failed");
        }
    });
}

impl<C: PeerConnection> Default for SessionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: PeerConnection> FrameSink for SessionRegistry<C> {
    fn on_frame(&self, frame: Frame) {
        tracing::trace!(
            stream = frame.stream_index,
            seq = frame.sequence,
            len = frame.payload.len(),
            "Frame received"
        );
        self.broadcast(&frame);
    }
}
