//! Session registry configuration

use std::time::Duration;

/// Registry configuration options
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Frames buffered per viewer before new frames are dropped
    pub peer_queue_depth: usize,

    /// Upper bound on a single engine send
    pub send_timeout: Duration,

    /// How often closed sessions are swept
    pub cleanup_interval: Duration,

    /// Maximum registered sessions (0 = unlimited)
    pub max_sessions: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            peer_queue_depth: 64,
            send_timeout: Duration::from_millis(100),
            cleanup_interval: Duration::from_secs(5),
            max_sessions: 0,
        }
    }
}

impl RegistryConfig {
    /// Set the per-peer queue depth (at least 1)
    pub fn peer_queue_depth(mut self, depth: usize) -> Self {
        self.peer_queue_depth = depth.max(1);
        self
    }

    /// Set the per-send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the session limit
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }
}
