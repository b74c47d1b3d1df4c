//! Signaling transport integration
//!
//! The transport owns listening sockets and SDP exchange. The restreamer only
//! gives it a factory to call once per inbound viewer request.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::engine::PeerConnection;
use crate::error::{Error, Result};

/// Factory the transport calls for every new viewer
pub type SessionFactory<C> = Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<C>>> + Send + Sync>;

/// Listener that turns inbound signaling requests into factory calls
pub trait SignalingTransport<C: PeerConnection>: Send + Sync + 'static {
    /// Start accepting requests
    fn start(&self, factory: SessionFactory<C>) -> Result<()>;

    /// Stop accepting requests; a no-op if not running
    fn stop(&self);
}

/// Request for a new viewer connection
pub struct SessionRequest<C> {
    /// Where the new connection (or the failure) is sent
    pub reply: oneshot::Sender<Result<Arc<C>>>,
}

impl<C> SessionRequest<C> {
    /// Create a request and the receiver for its reply
    pub fn new() -> (Self, oneshot::Receiver<Result<Arc<C>>>) {
        let (reply, rx) = oneshot::channel();
        (Self { reply }, rx)
    }
}

/// In-process transport fed over an mpsc channel
///
/// An HTTP or WebSocket front end keeps the sender half, submits a
/// [`SessionRequest`] per viewer and negotiates SDP on the returned
/// connection. Each request is served on its own task. The transport can be
/// stopped and started again; requests sent while stopped wait in the channel.
pub struct ChannelTransport<C> {
    requests: Arc<AsyncMutex<mpsc::Receiver<SessionRequest<C>>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<C: PeerConnection> ChannelTransport<C> {
    /// Create a transport and the sender used to submit requests
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<SessionRequest<C>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let transport = Self {
            requests: Arc::new(AsyncMutex::new(rx)),
            task: Mutex::new(None),
        };
        (transport, tx)
    }

    /// Whether the accept loop is alive
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl<C: PeerConnection> SignalingTransport<C> for ChannelTransport<C> {
    fn start(&self, factory: SessionFactory<C>) -> Result<()> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(Error::AlreadyRunning);
        }

        *task = Some(tokio::spawn(serve_requests(Arc::clone(&self.requests), factory)));

        tracing::info!("Signaling transport accepting requests");
        Ok(())
    }

    fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
            tracing::info!("Signaling transport stopped");
        }
    }
}

async fn serve_requests<C: PeerConnection>(
    requests: Arc<AsyncMutex<mpsc::Receiver<SessionRequest<C>>>>,
    factory: SessionFactory<C>,
) {
    // Held until the loop ends or the task is aborted; a restart waits for it
    let mut rx = requests.lock_owned().await;

    while let Some(request) = rx.recv().await {
        let pending = factory();
        tokio::spawn(async move {
            let result = pending.await;
            if let Err(e) = &result {
                tracing::warn!(error = %e, "Failed to create viewer session");
            }

            // Requester gave up; don't leave an orphaned connection behind
            if let Err(Ok(connection)) = request.reply.send(result) {
                tracing::debug!(conn = connection.id(), "Requester gone, closing connection");
                let _ = connection.close("requester gone").await;
            }
        });
    }

    tracing::debug!("Signaling request channel closed");
}
