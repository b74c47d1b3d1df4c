//! Signaling front door
//!
//! The restreamer binds a signaling transport and a frame source to one
//! session registry. The transport gets a factory that creates a viewer
//! connection per request; the frame source gets the registry as its only
//! sink, which is what turns one input stream into a broadcast.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use crate::engine::RtcEngine;
use crate::error::{Error, Result};
use crate::registry::{FrameSink, SessionRegistry};
use crate::session::PeerFactory;
use crate::source::{FrameSource, UdpRtpSource};
use crate::stats::RegistryStats;

pub mod config;
pub mod transport;

pub use config::RestreamerConfig;
pub use transport::{ChannelTransport, SessionFactory, SessionRequest, SignalingTransport};

/// RTP to WebRTC restreamer
pub struct Restreamer<E: RtcEngine> {
    factory: PeerFactory<E>,
    registry: Arc<SessionRegistry<E::Connection>>,
    source: Arc<dyn FrameSource>,
    transport: Arc<dyn SignalingTransport<E::Connection>>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl<E: RtcEngine> Restreamer<E> {
    /// Create a restreamer from its collaborators
    pub fn new(
        engine: Arc<E>,
        source: Arc<dyn FrameSource>,
        transport: Arc<dyn SignalingTransport<E::Connection>>,
        config: RestreamerConfig,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::with_config(config.registry));
        let factory = PeerFactory::new(engine, Arc::clone(&registry), config.rtc);

        Self {
            factory,
            registry,
            source,
            transport,
            cleanup_task: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Create a restreamer that receives RTP over UDP per `config.source`
    pub fn with_udp_source(
        engine: Arc<E>,
        transport: Arc<dyn SignalingTransport<E::Connection>>,
        config: RestreamerConfig,
    ) -> Self {
        let source = Arc::new(UdpRtpSource::new(config.source.clone()));
        Self::new(engine, source, transport, config)
    }

    /// Get a reference to the session registry
    pub fn registry(&self) -> &Arc<SessionRegistry<E::Connection>> {
        &self.registry
    }

    /// Create one viewer connection
    ///
    /// This is what the transport runs per request; exposed for transports
    /// that drive the restreamer directly.
    pub async fn create_session(&self) -> Result<Arc<E::Connection>> {
        self.factory.create().await
    }

    /// Factory handed to the signaling transport
    pub fn session_factory(&self) -> SessionFactory<E::Connection> {
        self.factory.session_factory()
    }

    /// Whether `start` has run without a matching `stop`
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start the transport listener, then the frame source
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyRunning);
        }

        if let Err(e) = self.transport.start(self.factory.session_factory()) {
            self.running.store(false, Ordering::Release);
            return Err(e);
        }

        let sink: Arc<dyn FrameSink> = Arc::clone(&self.registry) as Arc<dyn FrameSink>;
        if let Err(e) = self.source.start(sink).await {
            tracing::error!(error = %e, "Failed to start frame source");
            self.transport.stop();
            self.running.store(false, Ordering::Release);
            return Err(e);
        }

        *self.cleanup_task.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(self.registry.spawn_cleanup_task());

        tracing::info!("Restreamer started");
        Ok(())
    }

    /// Stop the transport listener and the frame source
    ///
    /// Viewers already registered are left alone: their queued frames drain
    /// and they observe the connection closing on their own.
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Err(Error::NotRunning);
        }

        self.transport.stop();
        self.source.stop();

        let cleanup = self.cleanup_task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = cleanup {
            task.abort();
        }

        tracing::info!(sessions = self.registry.len(), "Restreamer stopped");
        Ok(())
    }

    /// Registry statistics snapshot
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }
}

impl<E: RtcEngine> Drop for Restreamer<E> {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
