//! In-memory container writers
//!
//! Single-video-track writers for the two supported container formats. Both
//! accumulate samples internally and assemble the finished file in `finish`;
//! nothing touches the filesystem. The session never reaches in here
//! directly; only [`crate::strategy::ContainerVideoStrategy`] does.

pub mod mp4;
pub mod webm;

use crate::codec::{AlphaMode, VideoCodec};
use crate::config::ContainerFormat;
use std::io;

/// Description of the single video track a writer carries
#[derive(Debug, Clone)]
pub struct VideoTrackSpec {
    /// Codec the samples are encoded with
    pub codec: VideoCodec,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Frames per second
    pub frame_rate: f64,

    /// Target bitrate in bits per second
    pub bitrate: u32,

    /// Whether the samples carry an alpha channel
    pub alpha: AlphaMode,
}

/// One encoded video sample plus its timing
#[derive(Debug)]
pub struct VideoSample {
    /// Encoded sample bytes
    pub data: Vec<u8>,

    /// Presentation timestamp in seconds
    pub timestamp_s: f64,

    /// Sample duration in seconds
    pub duration_s: f64,

    /// Whether this sample is a seek point
    pub keyframe: bool,
}

/// A single-track media container assembled in memory
pub trait ContainerWriter: Send {
    /// Begin the container; must be called once before any sample is added
    fn start(&mut self) -> io::Result<()>;

    /// Append one encoded video sample
    fn write_sample(&mut self, sample: VideoSample) -> io::Result<()>;

    /// Close the container and return the finished bytes
    fn finish(&mut self) -> io::Result<Vec<u8>>;
}

/// Construct the writer matching a container format
pub fn writer_for(container: ContainerFormat, track: VideoTrackSpec) -> Box<dyn ContainerWriter> {
    match container {
        ContainerFormat::Mp4 => Box::new(mp4::Mp4Writer::new(track)),
        ContainerFormat::Webm => Box::new(webm::WebmWriter::new(track)),
    }
}

fn not_started() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "container writer not started")
}
