//! Frame timing
//!
//! Pure functions mapping a monotonically increasing frame counter and a
//! fixed frame rate onto presentation timestamps and keyframe scheduling.

/// Timing inputs for one captured frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// Presentation timestamp in seconds
    pub timestamp_s: f64,

    /// Frame duration in seconds
    pub duration_s: f64,

    /// Whether this frame must be encoded as a keyframe
    pub keyframe: bool,
}

/// Presentation timestamp of a frame, in seconds
pub fn timestamp_s(frame_index: u64, frame_rate: f64) -> f64 {
    frame_index as f64 / frame_rate
}

/// Duration of one frame, in seconds
pub fn frame_duration_s(frame_rate: f64) -> f64 {
    1.0 / frame_rate
}

/// Number of frames between forced keyframes (2 seconds of nominal playback)
///
/// Clamped to at least one frame so sub-0.25 fps rates degrade to
/// all-keyframes instead of dividing by zero.
pub fn keyframe_interval(frame_rate: f64) -> u64 {
    ((frame_rate * 2.0).round() as u64).max(1)
}

/// Whether the frame at `frame_index` must be a keyframe
///
/// True for the first frame and every 2 seconds of nominal playback
/// thereafter, bounding seek granularity in the encoded stream.
pub fn is_keyframe(frame_index: u64, frame_rate: f64) -> bool {
    frame_index % keyframe_interval(frame_rate) == 0
}

/// Compute all timing inputs for one frame
pub fn frame_timing(frame_index: u64, frame_rate: f64) -> FrameTiming {
    FrameTiming {
        timestamp_s: timestamp_s(frame_index, frame_rate),
        duration_s: frame_duration_s(frame_rate),
        keyframe: is_keyframe(frame_index, frame_rate),
    }
}
