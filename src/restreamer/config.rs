//! Restreamer configuration

use crate::engine::RtcConfig;
use crate::registry::RegistryConfig;
use crate::source::SourceConfig;

/// Restreamer configuration options
#[derive(Debug, Clone, Default)]
pub struct RestreamerConfig {
    /// Session registry settings
    pub registry: RegistryConfig,

    /// RTP frame source settings
    pub source: SourceConfig,

    /// Settings handed to the engine for every viewer connection
    pub rtc: RtcConfig,
}

impl RestreamerConfig {
    /// Set the registry configuration
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Set the frame source configuration
    pub fn source(mut self, source: SourceConfig) -> Self {
        self.source = source;
        self
    }

    /// Set the per-connection engine configuration
    pub fn rtc(mut self, rtc: RtcConfig) -> Self {
        self.rtc = rtc;
        self
    }
}
