//! UDP/RTP frame source
//!
//! Receives RTP datagrams from the air link receiver and hands each valid
//! packet to the sink as one frame. Emission happens from a single receive
//! task, so the sink sees frames in arrival order.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::registry::{Frame, FrameSink};
use crate::stats::SourceStats;

use super::config::SourceConfig;
use super::rtp::{RtpHeader, SequenceExtender};
use super::FrameSource;

const NO_SEQUENCE: u64 = u64::MAX;

/// Pause after a non-transient receive error
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Errors caused by a previous send's ICMP reply rather than the socket
fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused | ErrorKind::Interrupted
    )
}

#[derive(Debug)]
struct SourceCounters {
    packets: AtomicU64,
    malformed: AtomicU64,
    recv_errors: AtomicU64,
    bytes: AtomicU64,
    emitted: AtomicU64,
    last_sequence: AtomicU64,
}

impl Default for SourceCounters {
    fn default() -> Self {
        Self {
            packets: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            recv_errors: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
            last_sequence: AtomicU64::new(NO_SEQUENCE),
        }
    }
}

/// RTP over UDP frame source
pub struct UdpRtpSource {
    config: SourceConfig,
    task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    counters: Arc<SourceCounters>,
}

impl UdpRtpSource {
    /// Create a new source; nothing is bound until `start`
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            task: Mutex::new(None),
            local_addr: Mutex::new(None),
            counters: Arc::new(SourceCounters::default()),
        }
    }

    /// Get the source configuration
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Bound address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the receive task is alive
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Snapshot of receive statistics
    pub fn stats(&self) -> SourceStats {
        let c = &self.counters;
        let last = c.last_sequence.load(Ordering::Relaxed);
        SourceStats {
            packets_received: c.packets.load(Ordering::Relaxed),
            packets_malformed: c.malformed.load(Ordering::Relaxed),
            recv_errors: c.recv_errors.load(Ordering::Relaxed),
            bytes_received: c.bytes.load(Ordering::Relaxed),
            frames_emitted: c.emitted.load(Ordering::Relaxed),
            last_sequence: (last != NO_SEQUENCE).then_some(last as u32),
        }
    }
}

impl FrameSource for UdpRtpSource {
    fn start(&self, sink: Arc<dyn FrameSink>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.is_running() {
                return Err(Error::AlreadyRunning);
            }

            let socket = UdpSocket::bind(self.config.bind_addr).await?;
            let local = socket.local_addr()?;

            let handle = tokio::spawn(receive_loop(
                socket,
                self.config.clone(),
                sink,
                Arc::clone(&self.counters),
            ));

            {
                let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
                if task.as_ref().is_some_and(|t| !t.is_finished()) {
                    handle.abort();
                    return Err(Error::AlreadyRunning);
                }
                *task = Some(handle);
            }
            *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = Some(local);

            tracing::info!(
                addr = %local,
                stream = self.config.stream_index,
                "RTP source listening"
            );
            Ok(())
        })
    }

    fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.abort();
            *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = None;
            tracing::info!(stream = self.config.stream_index, "RTP source stopped");
        }
    }
}

impl Drop for UdpRtpSource {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn receive_loop(
    socket: UdpSocket,
    config: SourceConfig,
    sink: Arc<dyn FrameSink>,
    counters: Arc<SourceCounters>,
) {
    let mut buf = vec![0u8; config.recv_buffer_size];
    let mut sequences = SequenceExtender::new();
    let mut ssrc = None;
    let mut consecutive_errors = 0u32;

    loop {
        let (len, source) = match socket.recv_from(&mut buf).await {
            Ok(received) => {
                consecutive_errors = 0;
                received
            }
            Err(e) if is_transient(&e) => {
                // ICMP errors surface here on some platforms
                tracing::debug!(error = %e, "RTP receive error");
                continue;
            }
            Err(e) => {
                counters.recv_errors.fetch_add(1, Ordering::Relaxed);
                consecutive_errors += 1;
                if consecutive_errors == 1 {
                    tracing::warn!(error = %e, "RTP receive failed, backing off");
                }
                tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                continue;
            }
        };

        counters.packets.fetch_add(1, Ordering::Relaxed);
        counters.bytes.fetch_add(len as u64, Ordering::Relaxed);

        let packet = &buf[..len];
        let header = match RtpHeader::parse(packet) {
            Ok(header) => header,
            Err(e) => {
                counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(peer = %source, error = %e, "Dropping malformed RTP packet");
                continue;
            }
        };

        // A new SSRC means the encoder restarted; restart sequence tracking
        if ssrc != Some(header.ssrc) {
            if ssrc.is_some() {
                tracing::info!(peer = %source, ssrc = header.ssrc, "RTP source changed SSRC");
            }
            ssrc = Some(header.ssrc);
            sequences = SequenceExtender::new();
        }

        let sequence = sequences.extend(header.sequence);
        counters.last_sequence.store(sequence as u64, Ordering::Relaxed);
        counters.emitted.fetch_add(1, Ordering::Relaxed);

        sink.on_frame(Frame::new(
            config.stream_index,
            source,
            sequence,
            Bytes::copy_from_slice(packet),
        ));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[derive(Default)]
    struct CollectingSink {
        frames: Mutex<Vec<Frame>>,
    }

    impl FrameSink for CollectingSink {
        fn on_frame(&self, frame: Frame) {
            self.frames.lock().unwrap().push(frame);
        }
    }

    fn rtp_packet(seq: u16, ssrc: u32, payload: &[u8]) -> Vec<u8> {
        let mut p = vec![0x80, 96];
        p.extend_from_slice(&seq.to_be_bytes());
        p.extend_from_slice(&90_000u32.to_be_bytes());
        p.extend_from_slice(&ssrc.to_be_bytes());
        p.extend_from_slice(payload);
        p
    }

    async fn wait_for(sink: &CollectingSink, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while sink.frames.lock().unwrap().len() < n && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn local_source() -> UdpRtpSource {
        UdpRtpSource::new(SourceConfig::with_addr("127.0.0.1:0".parse().unwrap()).stream_index(3))
    }

    #[tokio::test]
    async fn test_receives_and_emits_frames() {
        let source = local_source();
        let sink = Arc::new(CollectingSink::default());
        source.start(sink.clone()).await.unwrap();
        let target = source.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&rtp_packet(100, 7, &[0x65]), target).await.unwrap();
        sender.send_to(&rtp_packet(101, 7, &[0x41]), target).await.unwrap();

        wait_for(&sink, 2).await;
        let frames = sink.frames.lock().unwrap().clone();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].stream_index, 3);
        assert_eq!(frames[0].sequence, 100);
        assert_eq!(frames[1].sequence, 101);
        assert_eq!(frames[0].source, sender.local_addr().unwrap());
        assert_eq!(&frames[0].payload[..], &rtp_packet(100, 7, &[0x65])[..]);

        let stats = source.stats();
        assert_eq!(stats.frames_emitted, 2);
        assert_eq!(stats.last_sequence, Some(101));

        source.stop();
        assert!(!source.is_running());
    }

    #[tokio::test]
    async fn test_malformed_packets_counted() {
        let source = local_source();
        let sink = Arc::new(CollectingSink::default());
        source.start(sink.clone()).await.unwrap();
        let target = source.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[0x00, 0x01, 0x02], target).await.unwrap();
        sender.send_to(&rtp_packet(5, 1, &[0x01]), target).await.unwrap();

        wait_for(&sink, 1).await;
        let stats = source.stats();
        assert_eq!(stats.packets_received, 2);
        assert_eq!(stats.packets_malformed, 1);
        assert_eq!(sink.frames.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_transient_errors() {
        use std::io::Error as IoError;

        assert!(is_transient(&IoError::from(ErrorKind::ConnectionReset)));
        assert!(is_transient(&IoError::from(ErrorKind::ConnectionRefused)));
        assert!(!is_transient(&IoError::from(ErrorKind::PermissionDenied)));
        assert!(!is_transient(&IoError::from(ErrorKind::Other)));
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let source = local_source();
        let sink = Arc::new(CollectingSink::default());
        source.start(sink.clone()).await.unwrap();

        let result = source.start(sink).await;
        assert!(matches!(result, Err(Error::AlreadyRunning)));
    }

    #[tokio::test]
    async fn test_ssrc_change_resets_sequence() {
        let source = local_source();
        let sink = Arc::new(CollectingSink::default());
        source.start(sink.clone()).await.unwrap();
        let target = source.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&rtp_packet(65535, 1, &[]), target).await.unwrap();
        sender.send_to(&rtp_packet(0, 1, &[]), target).await.unwrap();
        wait_for(&sink, 2).await;
        sender.send_to(&rtp_packet(10, 2, &[]), target).await.unwrap();
        wait_for(&sink, 3).await;

        let sequences: Vec<u32> = sink.frames.lock().unwrap().iter().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![65535, 65536, 10]);
    }
}
