//! Frame sources
//!
//! A frame source pushes video into a [`FrameSink`], one frame at a time from
//! a single task. The bundled [`UdpRtpSource`] receives RTP datagrams from
//! the air link receiver and forwards each packet unchanged.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::registry::FrameSink;

pub mod config;
pub mod rtp;
pub mod udp;

pub use config::SourceConfig;
pub use rtp::{RtpError, RtpHeader, SequenceExtender};
pub use udp::UdpRtpSource;

/// Producer of frame events
pub trait FrameSource: Send + Sync + 'static {
    /// Begin delivering frames to `sink`
    fn start(&self, sink: Arc<dyn FrameSink>) -> BoxFuture<'_, Result<()>>;

    /// Stop delivering frames; a no-op if not running
    fn stop(&self);
}
