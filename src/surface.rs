//! Render surface abstraction
//!
//! The recording pipeline never draws; it only reads pixels. A
//! [`RenderSurface`] is whatever the render loop exposes for that purpose:
//! a CPU pixel buffer, a GPU readback, a windowing-system capture. Snapshots
//! are async because real surface readbacks are.

use crate::error::{RecordingError, RecordingResult};
use async_trait::async_trait;
use parking_lot::RwLock;

/// A tightly packed RGBA8 snapshot of a surface
#[derive(Debug, Clone)]
pub struct RgbaFrame {
    /// Raw pixel data, 4 bytes per pixel, no row padding
    pub data: Vec<u8>,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,
}

impl RgbaFrame {
    /// Wrap a pixel buffer, checking that its length matches the dimensions
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> RecordingResult<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(RecordingError::FrameSnapshotFailed(format!(
                "pixel buffer is {} bytes, expected {} ({}x{}x4 RGBA)",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }
}

/// A readable image source with fixed dimensions
///
/// Owned by the render loop; the recording pipeline only reads from it.
#[async_trait]
pub trait RenderSurface: Send + Sync {
    /// Surface width in pixels
    fn width(&self) -> u32;

    /// Surface height in pixels
    fn height(&self) -> u32;

    /// Read back the current surface contents
    async fn snapshot(&self) -> RecordingResult<RgbaFrame>;
}

/// CPU-backed surface: a shared RGBA pixel buffer the render loop draws into
pub struct BufferSurface {
    width: u32,
    height: u32,
    pixels: RwLock<Vec<u8>>,
}

impl BufferSurface {
    /// Create a zeroed (transparent black) surface
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: RwLock::new(vec![0; width as usize * height as usize * 4]),
        }
    }

    /// Replace the surface contents with a full frame of RGBA pixels
    pub fn write_pixels(&self, data: &[u8]) -> RecordingResult<()> {
        let mut pixels = self.pixels.write();
        if data.len() != pixels.len() {
            return Err(RecordingError::FrameSnapshotFailed(format!(
                "pixel buffer is {} bytes, expected {}",
                data.len(),
                pixels.len()
            )));
        }
        pixels.copy_from_slice(data);
        Ok(())
    }
}

#[async_trait]
impl RenderSurface for BufferSurface {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    async fn snapshot(&self) -> RecordingResult<RgbaFrame> {
        let data = self.pixels.read().clone();
        RgbaFrame::new(self.width, self.height, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_wrong_buffer_size() {
        assert!(RgbaFrame::new(2, 2, vec![0; 16]).is_ok());
        assert!(RgbaFrame::new(2, 2, vec![0; 15]).is_err());
    }

    #[tokio::test]
    async fn test_buffer_surface_snapshot_reflects_writes() {
        let surface = BufferSurface::new(2, 1);
        surface.write_pixels(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        let frame = surface.snapshot().await.unwrap();
        assert_eq!(frame.width, 2);
        assert_eq!(frame.height, 1);
        assert_eq!(frame.data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_buffer_surface_rejects_short_write() {
        let surface = BufferSurface::new(2, 2);
        assert!(surface.write_pixels(&[0; 3]).is_err());
    }
}
