//! Host process integration
//!
//! The same binary runs on both ends of the link. Only the ground unit
//! restreams video to viewers, so the restreamer is built only when the mode
//! selector says so; on the air unit the host holds nothing and its
//! lifecycle calls do nothing.

use std::path::{Path, PathBuf};

use crate::engine::RtcEngine;
use crate::error::Result;
use crate::restreamer::Restreamer;

/// Marker file present on ground units
pub const DEFAULT_GROUND_MARKER: &str = "/boot/openhd/ground.txt";

/// Answers whether this unit is the ground receiver
pub trait ModeSelector {
    fn is_ground(&self) -> bool;
}

/// Fixed mode, for tests and for hosts that know their role up front
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticMode {
    pub ground: bool,
}

impl StaticMode {
    pub fn ground() -> Self {
        Self { ground: true }
    }

    pub fn air() -> Self {
        Self { ground: false }
    }
}

impl ModeSelector for StaticMode {
    fn is_ground(&self) -> bool {
        self.ground
    }
}

/// Ground mode iff a marker file exists
#[derive(Debug, Clone)]
pub struct MarkerFileMode {
    path: PathBuf,
}

impl MarkerFileMode {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for MarkerFileMode {
    fn default() -> Self {
        Self::new(DEFAULT_GROUND_MARKER)
    }
}

impl ModeSelector for MarkerFileMode {
    fn is_ground(&self) -> bool {
        self.path.exists()
    }
}

/// Restreamer gated on the unit's operating mode
pub struct RestreamHost<E: RtcEngine> {
    restreamer: Option<Restreamer<E>>,
}

impl<E: RtcEngine> RestreamHost<E> {
    /// Read the mode once and build the restreamer if this is a ground unit
    pub fn new<F>(mode: &dyn ModeSelector, build: F) -> Self
    where
        F: FnOnce() -> Restreamer<E>,
    {
        let restreamer = if mode.is_ground() {
            tracing::info!("Ground mode, restreamer enabled");
            Some(build())
        } else {
            tracing::info!("Air mode, restreamer disabled");
            None
        };

        Self { restreamer }
    }

    /// Whether a restreamer was built
    pub fn is_enabled(&self) -> bool {
        self.restreamer.is_some()
    }

    pub fn restreamer(&self) -> Option<&Restreamer<E>> {
        self.restreamer.as_ref()
    }

    /// Start the restreamer; no-op on the air unit
    pub async fn start(&self) -> Result<()> {
        match &self.restreamer {
            Some(restreamer) => restreamer.start().await,
            None => Ok(()),
        }
    }

    /// Stop the restreamer; no-op on the air unit
    pub fn stop(&self) -> Result<()> {
        match &self.restreamer {
            Some(restreamer) => restreamer.stop(),
            None => Ok(()),
        }
    }
}
