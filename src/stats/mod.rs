//! Statistics snapshots for diagnostics

pub mod metrics;

pub use metrics::{PeerStats, RegistryStats, SourceStats};
