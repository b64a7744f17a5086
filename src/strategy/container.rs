//! Container-video encoding strategy
//!
//! Negotiates a codec for the configured container, binds a single video
//! track to the live surface and streams encoded samples into an in-memory
//! container writer.

use super::{EncodingStrategy, FramePayload};
use crate::clock;
use crate::codec::{self, AlphaMode};
use crate::config::{ContainerFormat, RecordingConfig};
use crate::error::{RecordingError, RecordingResult};
use crate::mux::{self, ContainerWriter, VideoSample, VideoTrackSpec};
use crate::surface::RenderSurface;
use async_trait::async_trait;

/// Records into a single-video-track WebM or MP4 container
pub struct ContainerVideoStrategy {
    writer: Option<Box<dyn ContainerWriter>>,
    track: Option<VideoTrackSpec>,
    container: ContainerFormat,
    jpeg_quality: u8,
}

impl ContainerVideoStrategy {
    pub fn new() -> Self {
        Self {
            writer: None,
            track: None,
            container: ContainerFormat::Webm,
            jpeg_quality: 85,
        }
    }
}

impl Default for ContainerVideoStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EncodingStrategy for ContainerVideoStrategy {
    fn id(&self) -> &'static str {
        "container-video"
    }

    async fn open(&mut self, config: &RecordingConfig) -> RecordingResult<()> {
        let codec = match codec::select_codec(config.container, config.width, config.height) {
            Some(codec) => codec,
            None => {
                // Containers accept an unvalidated codec hint; only give up
                // when the fallback itself cannot encode at this resolution.
                let fallback = codec::VideoCodec::default();
                tracing::warn!(
                    container = config.container.extension(),
                    "no negotiated codec, falling back to {:?}",
                    fallback
                );
                if !codec::is_encodable(fallback, config.width, config.height) {
                    return Err(RecordingError::CodecUnavailable(format!(
                        "no codec for {} at {}x{}",
                        config.container.extension(),
                        config.width,
                        config.height
                    )));
                }
                fallback
            }
        };
        tracing::info!(?codec, container = config.container.extension(), "selected codec");

        let track = VideoTrackSpec {
            codec,
            width: config.width,
            height: config.height,
            frame_rate: config.frame_rate,
            bitrate: config.target_bitrate,
            // Alpha is retained through encode wherever the codec carries it
            alpha: AlphaMode::Keep,
        };
        let mut writer = mux::writer_for(config.container, track.clone());
        writer
            .start()
            .map_err(|e| RecordingError::WriterStartFailed(e.to_string()))?;

        self.jpeg_quality = codec::jpeg_quality_for_bitrate(
            config.target_bitrate,
            config.frame_rate,
            config.width,
            config.height,
        );
        self.container = config.container;
        self.track = Some(track);
        self.writer = Some(writer);
        Ok(())
    }

    async fn ingest(
        &mut self,
        frame_index: u64,
        frame_rate: f64,
        surface: &dyn RenderSurface,
    ) -> RecordingResult<()> {
        let (writer, track) = match (self.writer.as_mut(), self.track.as_ref()) {
            (Some(writer), Some(track)) => (writer, track),
            _ => {
                return Err(RecordingError::FrameEncodeFailed(
                    "strategy not open".to_string(),
                ))
            }
        };

        let timing = clock::frame_timing(frame_index, frame_rate);
        let frame = surface.snapshot().await?;
        if frame.width != track.width || frame.height != track.height {
            return Err(RecordingError::FrameEncodeFailed(format!(
                "surface is {}x{}, track is {}x{}",
                frame.width, frame.height, track.width, track.height
            )));
        }

        let data = codec::encode_frame(track.codec, &frame, track.alpha, self.jpeg_quality)?;
        writer
            .write_sample(VideoSample {
                data,
                timestamp_s: timing.timestamp_s,
                duration_s: timing.duration_s,
                keyframe: timing.keyframe,
            })
            .map_err(|e| RecordingError::FrameEncodeFailed(e.to_string()))?;

        tracing::trace!(
            frame_index,
            timestamp_s = timing.timestamp_s,
            keyframe = timing.keyframe,
            "ingested frame"
        );
        Ok(())
    }

    async fn finalize(&mut self) -> RecordingResult<FramePayload> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| RecordingError::FinalizeFailed("strategy not open".to_string()))?;
        let bytes = writer
            .finish()
            .map_err(|e| RecordingError::FinalizeFailed(e.to_string()))?;
        Ok(FramePayload {
            bytes,
            mime_type: self.container.mime_type(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::BufferSurface;

    fn config(container: ContainerFormat) -> RecordingConfig {
        RecordingConfig::new(64, 48)
            .with_container(container)
            .with_frame_rate(30.0)
            .with_bitrate(2_000_000)
    }

    #[tokio::test]
    async fn test_webm_payload_mime() {
        let surface = BufferSurface::new(64, 48);
        let mut strategy = ContainerVideoStrategy::new();
        strategy.open(&config(ContainerFormat::Webm)).await.unwrap();
        strategy.ingest(0, 30.0, &surface).await.unwrap();
        let payload = strategy.finalize().await.unwrap();

        assert_eq!(payload.mime_type, "video/webm");
        assert!(!payload.bytes.is_empty());
        assert_eq!(&payload.bytes[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
    }

    #[tokio::test]
    async fn test_mp4_payload_mime() {
        let surface = BufferSurface::new(64, 48);
        let mut strategy = ContainerVideoStrategy::new();
        strategy.open(&config(ContainerFormat::Mp4)).await.unwrap();
        strategy.ingest(0, 30.0, &surface).await.unwrap();
        let payload = strategy.finalize().await.unwrap();

        assert_eq!(payload.mime_type, "video/mp4");
        assert_eq!(&payload.bytes[4..8], b"ftyp");
    }

    #[tokio::test]
    async fn test_ingest_rejects_mismatched_surface() {
        let surface = BufferSurface::new(32, 32);
        let mut strategy = ContainerVideoStrategy::new();
        strategy.open(&config(ContainerFormat::Webm)).await.unwrap();

        let err = strategy.ingest(0, 30.0, &surface).await.unwrap_err();
        assert!(matches!(err, RecordingError::FrameEncodeFailed(_)));
    }

    #[tokio::test]
    async fn test_finalize_without_open_fails() {
        let mut strategy = ContainerVideoStrategy::new();
        let err = strategy.finalize().await.unwrap_err();
        assert!(matches!(err, RecordingError::FinalizeFailed(_)));
    }
}
