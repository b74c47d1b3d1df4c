//! Test doubles for the engine, frame source and signaling transport

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::engine::{
    ConnectionState, EngineError, PeerConnection, RtcConfig, RtcEngine, StateChangeHandler,
    TrackDirection, TrackId, VideoCodec,
};
use crate::error::{Error, Result};
use crate::registry::{Frame, FrameSink};
use crate::restreamer::{SessionFactory, SignalingTransport};
use crate::source::FrameSource;

/// Engine connection that records what the registry does to it
pub(crate) struct MockConnection {
    id: String,
    state: Mutex<ConnectionState>,
    handler: Mutex<Option<StateChangeHandler>>,
    sent: Mutex<Vec<Bytes>>,
    closes: AtomicUsize,
    tracks: AtomicU32,
    fail_sends: AtomicBool,
    fail_tracks: AtomicBool,
    send_delay: Option<Duration>,
}

impl MockConnection {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self::build(id, None))
    }

    pub fn with_send_delay(id: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(id, Some(delay)))
    }

    fn build(id: &str, send_delay: Option<Duration>) -> Self {
        Self {
            id: id.to_string(),
            state: Mutex::new(ConnectionState::New),
            handler: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            tracks: AtomicU32::new(0),
            fail_sends: AtomicBool::new(false),
            fail_tracks: AtomicBool::new(false),
            send_delay,
        }
    }

    /// Change state and fire the handler, as the engine would
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
        if let Some(handler) = self.handler.lock().unwrap().as_ref() {
            handler(state);
        }
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn track_count(&self) -> u32 {
        self.tracks.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` payloads went out, or panic after 2s
    pub async fn wait_for_sends(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while self.sent.lock().unwrap().len() < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {} sends on {}",
                n,
                self.id
            );
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

impl PeerConnection for MockConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    async fn add_video_track(
        &self,
        _codec: VideoCodec,
        _direction: TrackDirection,
    ) -> std::result::Result<TrackId, EngineError> {
        if self.fail_tracks.load(Ordering::SeqCst) {
            return Err(EngineError::Backend("no codec".into()));
        }
        Ok(TrackId(self.tracks.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn on_state_change(&self, handler: StateChangeHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    async fn send_video(&self, _track: TrackId, payload: Bytes) -> std::result::Result<(), EngineError> {
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(EngineError::ConnectionClosed);
        }
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }

    async fn close(&self, _reason: &str) -> std::result::Result<(), EngineError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Closed);
        Ok(())
    }
}

/// Engine handing out mock connections
pub(crate) struct MockEngine {
    connections: Mutex<Vec<Arc<MockConnection>>>,
    fail_create: AtomicBool,
    fail_tracks: AtomicBool,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            fail_tracks: AtomicBool::new(false),
        }
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_tracks(&self, fail: bool) {
        self.fail_tracks.store(fail, Ordering::SeqCst);
    }

    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        self.connections.lock().unwrap().clone()
    }
}

impl RtcEngine for MockEngine {
    type Connection = MockConnection;

    async fn create_connection(
        &self,
        _config: &RtcConfig,
    ) -> std::result::Result<Arc<MockConnection>, EngineError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(EngineError::Backend("engine down".into()));
        }

        let mut connections = self.connections.lock().unwrap();
        let connection = MockConnection::new(&format!("pc{}", connections.len() + 1));
        connection
            .fail_tracks
            .store(self.fail_tracks.load(Ordering::SeqCst), Ordering::SeqCst);
        connections.push(Arc::clone(&connection));
        Ok(connection)
    }
}

type EventLog = Arc<Mutex<Vec<String>>>;

/// Frame source driven by the test
pub(crate) struct MockSource {
    log: EventLog,
    sink: Mutex<Option<Arc<dyn FrameSink>>>,
    starts: AtomicUsize,
    sequence: AtomicU32,
    fail_start: AtomicBool,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            sink: Mutex::new(None),
            starts: AtomicUsize::new(0),
            sequence: AtomicU32::new(0),
            fail_start: AtomicBool::new(false),
        }
    }

    pub fn log(&self) -> EventLog {
        Arc::clone(&self.log)
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Push one frame into the sink
    pub fn emit(&self, payload: Bytes) {
        let sink = self.sink.lock().unwrap().clone().expect("source not started");
        let source: SocketAddr = "10.0.0.2:5600".parse().unwrap();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        sink.on_frame(Frame::new(0, source, sequence, payload));
    }
}

impl FrameSource for MockSource {
    fn start(&self, sink: Arc<dyn FrameSink>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    "port taken",
                )));
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            *self.sink.lock().unwrap() = Some(sink);
            self.log.lock().unwrap().push("source:start".into());
            Ok(())
        })
    }

    fn stop(&self) {
        self.sink.lock().unwrap().take();
        self.log.lock().unwrap().push("source:stop".into());
    }
}

/// Transport that forwards requests straight to the factory
pub(crate) struct MockTransport {
    log: EventLog,
    factory: Mutex<Option<SessionFactory<MockConnection>>>,
}

impl MockTransport {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            factory: Mutex::new(None),
        }
    }

    /// Simulate one inbound viewer request
    pub async fn request(&self) -> Result<Arc<MockConnection>> {
        let factory = self
            .factory
            .lock()
            .unwrap()
            .clone()
            .ok_or(Error::NotRunning)?;
        factory().await
    }
}

impl SignalingTransport<MockConnection> for MockTransport {
    fn start(&self, factory: SessionFactory<MockConnection>) -> Result<()> {
        *self.factory.lock().unwrap() = Some(factory);
        self.log.lock().unwrap().push("transport:start".into());
        Ok(())
    }

    fn stop(&self) {
        self.factory.lock().unwrap().take();
        self.log.lock().unwrap().push("transport:stop".into());
    }
}
