//! Recording configuration
//!
//! The configuration record is created at `start` and frozen for the
//! session's lifetime; changing resolution or frame rate requires a new
//! session.

use crate::error::{RecordingError, RecordingResult};
use serde::{Deserialize, Serialize};

/// Which encoding backend a session uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// A single-video-track media container (WebM or MP4)
    ContainerVideo,
    /// A ZIP archive of numbered still images
    ImageArchive,
}

/// Container format for [`StrategyKind::ContainerVideo`] sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Webm,
    Mp4,
}

impl ContainerFormat {
    /// Get the MIME type of the finished container
    pub fn mime_type(&self) -> &'static str {
        match self {
            ContainerFormat::Webm => "video/webm",
            ContainerFormat::Mp4 => "video/mp4",
        }
    }

    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Webm => "webm",
            ContainerFormat::Mp4 => "mp4",
        }
    }
}

/// Configuration for starting a recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingConfig {
    /// Encoding backend to use
    pub strategy: StrategyKind,

    /// Container format (meaningful only for container-video sessions)
    pub container: ContainerFormat,

    /// Frames per second of the captured stream
    pub frame_rate: f64,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,

    /// Target bitrate in bits per second
    pub target_bitrate: u32,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::ContainerVideo,
            container: ContainerFormat::Webm,
            frame_rate: 60.0,
            width: 1280,
            height: 720,
            target_bitrate: 8_000_000,
        }
    }
}

impl RecordingConfig {
    /// Create a configuration for the given resolution
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Set the encoding strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the container format
    #[must_use]
    pub fn with_container(mut self, container: ContainerFormat) -> Self {
        self.container = container;
        self
    }

    /// Set frames per second
    #[must_use]
    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    /// Set the target bitrate in bits per second
    #[must_use]
    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.target_bitrate = bitrate;
        self
    }

    /// Check that every field is usable before any resource is constructed
    pub fn validate(&self) -> RecordingResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RecordingError::InvalidConfiguration(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !(self.frame_rate.is_finite() && self.frame_rate > 0.0) {
            return Err(RecordingError::InvalidConfiguration(format!(
                "frame rate must be positive, got {}",
                self.frame_rate
            )));
        }
        if self.target_bitrate == 0 {
            return Err(RecordingError::InvalidConfiguration(
                "target bitrate must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
