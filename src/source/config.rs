//! Frame source configuration

use std::net::{Ipv4Addr, SocketAddr};

/// Default UDP port the air unit's video stream arrives on
pub const DEFAULT_VIDEO_PORT: u16 = 5600;

/// Frame source configuration options
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Address to receive RTP on
    pub bind_addr: SocketAddr,

    /// Stream index stamped on emitted frames
    pub stream_index: u32,

    /// Receive buffer size; must fit the largest datagram
    pub recv_buffer_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_VIDEO_PORT)),
            stream_index: 0,
            recv_buffer_size: 64 * 1024,
        }
    }
}

impl SourceConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the stream index
    pub fn stream_index(mut self, index: u32) -> Self {
        self.stream_index = index;
        self
    }

    /// Set the receive buffer size
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }
}
