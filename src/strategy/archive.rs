//! Image-archive encoding strategy
//!
//! Rasterizes each captured frame to a PNG still and appends it to an
//! in-memory ZIP archive. Entries are named `frame_XXXXX.png` with a
//! zero-padded 5-digit index so archive order matches capture order
//! lexicographically; downstream tooling relies on that exact naming.

use super::{EncodingStrategy, FramePayload};
use crate::config::RecordingConfig;
use crate::error::{RecordingError, RecordingResult};
use crate::surface::{RenderSurface, RgbaFrame};
use async_trait::async_trait;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Records into a ZIP archive of numbered PNG stills
pub struct ImageArchiveStrategy {
    writer: Option<ZipWriter<Cursor<Vec<u8>>>>,
}

impl ImageArchiveStrategy {
    pub fn new() -> Self {
        Self { writer: None }
    }
}

impl Default for ImageArchiveStrategy {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode one RGBA frame as a PNG still, alpha retained
fn encode_png(frame: &RgbaFrame) -> RecordingResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, frame.width, frame.height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder
        .write_header()
        .map_err(|e| RecordingError::FrameSnapshotFailed(format!("PNG header error: {e}")))?;
    writer
        .write_image_data(&frame.data)
        .map_err(|e| RecordingError::FrameSnapshotFailed(format!("PNG encode error: {e}")))?;
    writer
        .finish()
        .map_err(|e| RecordingError::FrameSnapshotFailed(format!("PNG finish error: {e}")))?;
    Ok(out)
}

#[async_trait]
impl EncodingStrategy for ImageArchiveStrategy {
    fn id(&self) -> &'static str {
        "image-archive"
    }

    async fn open(&mut self, _config: &RecordingConfig) -> RecordingResult<()> {
        // No codec negotiation; the archive takes whatever the surface yields
        self.writer = Some(ZipWriter::new(Cursor::new(Vec::new())));
        Ok(())
    }

    async fn ingest(
        &mut self,
        frame_index: u64,
        _frame_rate: f64,
        surface: &dyn RenderSurface,
    ) -> RecordingResult<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            RecordingError::FrameSnapshotFailed("strategy not open".to_string())
        })?;

        let frame = surface.snapshot().await?;
        let png = encode_png(&frame)?;

        let name = format!("frame_{:05}.png", frame_index);
        // PNG data is already deflated; store the entries as-is
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        writer
            .start_file(&name, options)
            .map_err(|e| RecordingError::FrameSnapshotFailed(format!("archive entry: {e}")))?;
        writer
            .write_all(&png)
            .map_err(|e| RecordingError::FrameSnapshotFailed(format!("archive write: {e}")))?;

        tracing::trace!(entry = %name, bytes = png.len(), "archived frame");
        Ok(())
    }

    async fn finalize(&mut self) -> RecordingResult<FramePayload> {
        let mut writer = self.writer.take().ok_or_else(|| {
            RecordingError::ArchiveFinalizeFailed("strategy not open".to_string())
        })?;
        let cursor = writer
            .finish()
            .map_err(|e| RecordingError::ArchiveFinalizeFailed(e.to_string()))?;
        Ok(FramePayload {
            bytes: cursor.into_inner(),
            mime_type: "application/zip",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::BufferSurface;

    #[tokio::test]
    async fn test_three_frames_yield_three_ordered_entries() {
        let surface = BufferSurface::new(8, 8);
        let mut strategy = ImageArchiveStrategy::new();
        strategy.open(&RecordingConfig::new(8, 8)).await.unwrap();
        for i in 0..3 {
            strategy.ingest(i, 30.0, &surface).await.unwrap();
        }
        let payload = strategy.finalize().await.unwrap();
        assert_eq!(payload.mime_type, "application/zip");

        let mut archive = zip::ZipArchive::new(Cursor::new(payload.bytes)).unwrap();
        assert_eq!(archive.len(), 3);
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["frame_00000.png", "frame_00001.png", "frame_00002.png"]
        );
    }

    #[tokio::test]
    async fn test_entries_are_valid_png() {
        let surface = BufferSurface::new(4, 4);
        let mut strategy = ImageArchiveStrategy::new();
        strategy.open(&RecordingConfig::new(4, 4)).await.unwrap();
        strategy.ingest(0, 30.0, &surface).await.unwrap();
        let payload = strategy.finalize().await.unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(payload.bytes)).unwrap();
        let mut entry = archive.by_index(0).unwrap();
        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut entry, &mut bytes).unwrap();
        assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[tokio::test]
    async fn test_empty_archive_finalizes() {
        let mut strategy = ImageArchiveStrategy::new();
        strategy.open(&RecordingConfig::new(8, 8)).await.unwrap();
        let payload = strategy.finalize().await.unwrap();
        assert_eq!(payload.mime_type, "application/zip");
        assert!(!payload.bytes.is_empty());
    }
}
