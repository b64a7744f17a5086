//! Codec selection and per-frame pixel encoding
//!
//! Negotiation intersects the codecs a container can legally hold with what
//! the built-in encoders can actually produce at the target resolution. The
//! container's declared preference order is authoritative; callers treat
//! `None` as "fall back to the default codec", not a fatal error, since the
//! writers accept an unvalidated codec hint.

use crate::config::ContainerFormat;
use crate::error::{RecordingError, RecordingResult};
use crate::surface::RgbaFrame;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Baseline JPEG caps each dimension at 65535; stay under it with margin,
/// as common encoders do.
const MAX_JPEG_DIMENSION: u32 = 65_500;

/// Video codec selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// Motion JPEG: every sample is an independently decodable JPEG image
    Mjpeg,
    /// Uncompressed RGBA/RGB samples (the only codec that retains alpha)
    Raw,
}

impl Default for VideoCodec {
    fn default() -> Self {
        Self::Mjpeg
    }
}

impl VideoCodec {
    /// ISO BMFF sample entry tag for MP4 output
    pub fn sample_entry_tag(&self) -> &'static [u8; 4] {
        match self {
            VideoCodec::Mjpeg => b"jpeg",
            VideoCodec::Raw => b"raw ",
        }
    }

    /// Matroska codec ID for WebM output
    pub fn matroska_id(&self) -> &'static str {
        match self {
            VideoCodec::Mjpeg => "V_MJPEG",
            VideoCodec::Raw => "V_UNCOMPRESSED",
        }
    }
}

/// Whether the alpha channel survives the encode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphaMode {
    /// Retain alpha wherever the codec can carry it
    Keep,
    /// Flatten to opaque RGB
    Discard,
}

/// Codecs the container format can legally hold, in preference order
pub fn supported_codecs(container: ContainerFormat) -> &'static [VideoCodec] {
    match container {
        ContainerFormat::Webm => &[VideoCodec::Mjpeg, VideoCodec::Raw],
        ContainerFormat::Mp4 => &[VideoCodec::Mjpeg, VideoCodec::Raw],
    }
}

/// Whether the built-in encoders can produce this codec at this resolution
pub fn is_encodable(codec: VideoCodec, width: u32, height: u32) -> bool {
    if width == 0 || height == 0 {
        return false;
    }
    match codec {
        VideoCodec::Mjpeg => width <= MAX_JPEG_DIMENSION && height <= MAX_JPEG_DIMENSION,
        VideoCodec::Raw => true,
    }
}

/// Pick the best encodable codec for a container at the given resolution
pub fn select_codec(container: ContainerFormat, width: u32, height: u32) -> Option<VideoCodec> {
    supported_codecs(container)
        .iter()
        .copied()
        .find(|&codec| is_encodable(codec, width, height))
}

/// JPEG quality chosen from the per-pixel bit budget the target bitrate allows
pub fn jpeg_quality_for_bitrate(bitrate: u32, frame_rate: f64, width: u32, height: u32) -> u8 {
    let pixels_per_second = frame_rate * width as f64 * height as f64;
    if pixels_per_second <= 0.0 {
        return 75;
    }
    let bits_per_pixel = bitrate as f64 / pixels_per_second;
    match bits_per_pixel {
        bpp if bpp < 0.25 => 60,
        bpp if bpp < 0.5 => 70,
        bpp if bpp < 1.0 => 80,
        bpp if bpp < 2.0 => 88,
        _ => 95,
    }
}

/// Encode one RGBA frame into a single video sample
pub fn encode_frame(
    codec: VideoCodec,
    frame: &RgbaFrame,
    alpha: AlphaMode,
    jpeg_quality: u8,
) -> RecordingResult<Vec<u8>> {
    match codec {
        VideoCodec::Mjpeg => {
            let rgb = flatten_to_rgb(&frame.data);
            let mut buffer = Cursor::new(Vec::new());
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, jpeg_quality);
            encoder
                .encode(
                    &rgb,
                    frame.width,
                    frame.height,
                    image::ExtendedColorType::Rgb8,
                )
                .map_err(|e| {
                    RecordingError::FrameEncodeFailed(format!("JPEG encoding failed: {e}"))
                })?;
            Ok(buffer.into_inner())
        }
        VideoCodec::Raw => match alpha {
            AlphaMode::Keep => Ok(frame.data.clone()),
            AlphaMode::Discard => Ok(flatten_to_rgb(&frame.data)),
        },
    }
}

/// Drop the alpha channel from a packed RGBA buffer
fn flatten_to_rgb(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    for pixel in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&pixel[..3]);
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_order_is_authoritative() {
        // Mjpeg is preferred wherever it is encodable
        assert_eq!(
            select_codec(ContainerFormat::Webm, 640, 480),
            Some(VideoCodec::Mjpeg)
        );
        assert_eq!(
            select_codec(ContainerFormat::Mp4, 640, 480),
            Some(VideoCodec::Mjpeg)
        );
    }

    #[test]
    fn test_oversized_resolution_falls_through_to_raw() {
        assert_eq!(
            select_codec(ContainerFormat::Mp4, 100_000, 480),
            Some(VideoCodec::Raw)
        );
    }

    #[test]
    fn test_zero_resolution_selects_nothing() {
        assert_eq!(select_codec(ContainerFormat::Webm, 0, 480), None);
    }

    #[test]
    fn test_jpeg_quality_scales_with_bit_budget() {
        // 2 Mbps at 30 fps 640x480 is a thin budget
        let low = jpeg_quality_for_bitrate(2_000_000, 30.0, 640, 480);
        // 50 Mbps at the same geometry is a generous one
        let high = jpeg_quality_for_bitrate(50_000_000, 30.0, 640, 480);
        assert!(low < high);
        assert!((50..=95).contains(&low));
        assert_eq!(high, 95);
    }

    #[test]
    fn test_encode_mjpeg_produces_jpeg_magic() {
        let frame = RgbaFrame::new(4, 4, vec![128; 4 * 4 * 4]).unwrap();
        let data = encode_frame(VideoCodec::Mjpeg, &frame, AlphaMode::Keep, 85).unwrap();
        assert_eq!(&data[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_raw_keeps_or_flattens_alpha() {
        let frame = RgbaFrame::new(2, 1, vec![10, 20, 30, 40, 50, 60, 70, 80]).unwrap();

        let kept = encode_frame(VideoCodec::Raw, &frame, AlphaMode::Keep, 85).unwrap();
        assert_eq!(kept, frame.data);

        let flat = encode_frame(VideoCodec::Raw, &frame, AlphaMode::Discard, 85).unwrap();
        assert_eq!(flat, vec![10, 20, 30, 50, 60, 70]);
    }
}
