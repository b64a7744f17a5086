//! Encoding strategies
//!
//! A session records through exactly one of two mutually exclusive
//! backends: a media container with a single video track, or a ZIP archive
//! of numbered stills. The strategy owns every codec/container/archive
//! resource exclusively; the session only calls `open`, `ingest` and
//! `finalize`. Instances are created fresh per session and discarded after
//! finalize.

pub mod archive;
pub mod container;

pub use archive::ImageArchiveStrategy;
pub use container::ContainerVideoStrategy;

use crate::config::{RecordingConfig, StrategyKind};
use crate::error::RecordingResult;
use crate::surface::RenderSurface;
use async_trait::async_trait;

/// The finalized recording: owned bytes plus their MIME label
#[derive(Debug, Clone)]
pub struct FramePayload {
    /// Finished container or archive bytes
    pub bytes: Vec<u8>,

    /// One of `video/webm`, `video/mp4`, `application/zip`
    pub mime_type: &'static str,
}

/// Trait for encoding backends
#[async_trait]
pub trait EncodingStrategy: Send {
    /// Get the strategy identifier (e.g., "container-video")
    fn id(&self) -> &'static str;

    /// Acquire encoding resources for the given configuration
    async fn open(&mut self, config: &RecordingConfig) -> RecordingResult<()>;

    /// Capture and encode one frame from the surface
    async fn ingest(
        &mut self,
        frame_index: u64,
        frame_rate: f64,
        surface: &dyn RenderSurface,
    ) -> RecordingResult<()>;

    /// Close the backend and hand back the finished payload
    async fn finalize(&mut self) -> RecordingResult<FramePayload>;
}

/// Construct the strategy variant for a configuration
pub fn strategy_for(kind: StrategyKind) -> Box<dyn EncodingStrategy> {
    match kind {
        StrategyKind::ContainerVideo => Box::new(ContainerVideoStrategy::new()),
        StrategyKind::ImageArchive => Box::new(ImageArchiveStrategy::new()),
    }
}
