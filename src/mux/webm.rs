//! WebM (EBML/Matroska) writer
//!
//! Assembles an `EBML` header and a `Segment` holding `Info`, a single
//! video `TrackEntry` and keyframe-aligned `Cluster`s of `SimpleBlock`s.
//! Timestamps are in milliseconds (`TimestampScale` of 1,000,000 ns); each
//! cluster opens on a keyframe so block-relative timestamps stay well inside
//! their signed 16-bit range at the 2-second keyframe cadence.

use super::{not_started, ContainerWriter, VideoSample, VideoTrackSpec};
use crate::codec::{AlphaMode, VideoCodec};
use std::io;

const APP_NAME: &str = concat!("framereel v", env!("CARGO_PKG_VERSION"));

// Top-level and header element IDs
const EBML_HEADER: &[u8] = &[0x1A, 0x45, 0xDF, 0xA3];
const EBML_VERSION: &[u8] = &[0x42, 0x86];
const EBML_READ_VERSION: &[u8] = &[0x42, 0xF7];
const EBML_MAX_ID_LENGTH: &[u8] = &[0x42, 0xF2];
const EBML_MAX_SIZE_LENGTH: &[u8] = &[0x42, 0xF3];
const DOC_TYPE: &[u8] = &[0x42, 0x82];
const DOC_TYPE_VERSION: &[u8] = &[0x42, 0x87];
const DOC_TYPE_READ_VERSION: &[u8] = &[0x42, 0x85];
const SEGMENT: &[u8] = &[0x18, 0x53, 0x80, 0x67];

// Segment information
const INFO: &[u8] = &[0x15, 0x49, 0xA9, 0x66];
const TIMESTAMP_SCALE: &[u8] = &[0x2A, 0xD7, 0xB1];
const DURATION: &[u8] = &[0x44, 0x89];
const MUXING_APP: &[u8] = &[0x4D, 0x80];
const WRITING_APP: &[u8] = &[0x57, 0x41];

// Track elements
const TRACKS: &[u8] = &[0x16, 0x54, 0xAE, 0x6B];
const TRACK_ENTRY: &[u8] = &[0xAE];
const TRACK_NUMBER: &[u8] = &[0xD7];
const TRACK_UID: &[u8] = &[0x73, 0xC5];
const TRACK_TYPE: &[u8] = &[0x83];
const FLAG_LACING: &[u8] = &[0x9C];
const CODEC_ID: &[u8] = &[0x86];
const DEFAULT_DURATION: &[u8] = &[0x23, 0xE3, 0x83];
const VIDEO: &[u8] = &[0xE0];
const PIXEL_WIDTH: &[u8] = &[0xB0];
const PIXEL_HEIGHT: &[u8] = &[0xBA];
const ALPHA_MODE: &[u8] = &[0x53, 0xC0];
const COLOUR_SPACE: &[u8] = &[0x2E, 0xB5, 0x24];

// Cluster elements
const CLUSTER: &[u8] = &[0x1F, 0x43, 0xB6, 0x75];
const CLUSTER_TIMESTAMP: &[u8] = &[0xE7];
const SIMPLE_BLOCK: &[u8] = &[0xA3];

const TRACK_TYPE_VIDEO: u64 = 1;
const NANOS_PER_TIMESTAMP_TICK: u64 = 1_000_000;

/// Encode an element size as an EBML variable-length integer
fn write_size(out: &mut Vec<u8>, len: u64) {
    let mut n = 1;
    while n < 8 && len >= (1u64 << (7 * n)) - 1 {
        n += 1;
    }
    let v = (1u64 << (7 * n)) | len;
    for i in (0..n).rev() {
        out.push((v >> (8 * i)) as u8);
    }
}

fn write_element(out: &mut Vec<u8>, id: &[u8], payload: &[u8]) {
    out.extend_from_slice(id);
    write_size(out, payload.len() as u64);
    out.extend_from_slice(payload);
}

/// Minimal big-endian encoding of an unsigned integer (at least one byte)
fn uint_bytes(value: u64) -> Vec<u8> {
    let n = ((64 - value.leading_zeros() as usize) + 7) / 8;
    let n = n.max(1);
    (0..n).rev().map(|i| (value >> (8 * i)) as u8).collect()
}

fn write_uint(out: &mut Vec<u8>, id: &[u8], value: u64) {
    write_element(out, id, &uint_bytes(value));
}

fn write_float(out: &mut Vec<u8>, id: &[u8], value: f64) {
    write_element(out, id, &value.to_be_bytes());
}

fn write_string(out: &mut Vec<u8>, id: &[u8], value: &str) {
    write_element(out, id, value.as_bytes());
}

struct Block {
    data: Vec<u8>,
    timestamp_ms: u64,
    keyframe: bool,
}

/// Single-video-track WebM writer
pub struct WebmWriter {
    track: VideoTrackSpec,
    blocks: Vec<Block>,
    started: bool,
}

impl WebmWriter {
    pub fn new(track: VideoTrackSpec) -> Self {
        Self {
            track,
            blocks: Vec::new(),
            started: false,
        }
    }

    fn write_ebml_header(&self, out: &mut Vec<u8>) {
        let mut header = Vec::new();
        write_uint(&mut header, EBML_VERSION, 1);
        write_uint(&mut header, EBML_READ_VERSION, 1);
        write_uint(&mut header, EBML_MAX_ID_LENGTH, 4);
        write_uint(&mut header, EBML_MAX_SIZE_LENGTH, 8);
        write_string(&mut header, DOC_TYPE, "webm");
        write_uint(&mut header, DOC_TYPE_VERSION, 4);
        write_uint(&mut header, DOC_TYPE_READ_VERSION, 2);
        write_element(out, EBML_HEADER, &header);
    }

    fn write_info(&self, out: &mut Vec<u8>) {
        let duration_ms = self.blocks.len() as f64 * 1000.0 / self.track.frame_rate;
        let mut info = Vec::new();
        write_uint(&mut info, TIMESTAMP_SCALE, NANOS_PER_TIMESTAMP_TICK);
        write_float(&mut info, DURATION, duration_ms);
        write_string(&mut info, MUXING_APP, APP_NAME);
        write_string(&mut info, WRITING_APP, APP_NAME);
        write_element(out, INFO, &info);
    }

    fn write_tracks(&self, out: &mut Vec<u8>) {
        let mut video = Vec::new();
        write_uint(&mut video, PIXEL_WIDTH, self.track.width as u64);
        write_uint(&mut video, PIXEL_HEIGHT, self.track.height as u64);
        if self.track.alpha == AlphaMode::Keep {
            write_uint(&mut video, ALPHA_MODE, 1);
        }
        if self.track.codec == VideoCodec::Raw {
            let fourcc: &[u8] = match self.track.alpha {
                AlphaMode::Keep => b"RGBA",
                AlphaMode::Discard => b"RGB ",
            };
            write_element(&mut video, COLOUR_SPACE, fourcc);
        }

        let frame_duration_ns = (1e9 / self.track.frame_rate).round() as u64;
        let mut entry = Vec::new();
        write_uint(&mut entry, TRACK_NUMBER, 1);
        write_uint(&mut entry, TRACK_UID, 1);
        write_uint(&mut entry, TRACK_TYPE, TRACK_TYPE_VIDEO);
        write_uint(&mut entry, FLAG_LACING, 0);
        write_string(&mut entry, CODEC_ID, self.track.codec.matroska_id());
        write_uint(&mut entry, DEFAULT_DURATION, frame_duration_ns);
        write_element(&mut entry, VIDEO, &video);

        let mut tracks = Vec::new();
        write_element(&mut tracks, TRACK_ENTRY, &entry);
        write_element(out, TRACKS, &tracks);
    }

    fn write_clusters(&self, out: &mut Vec<u8>) {
        let mut cluster: Vec<u8> = Vec::new();
        let mut cluster_base: Option<u64> = None;

        for block in &self.blocks {
            let needs_new = match cluster_base {
                None => true,
                Some(base) => block.keyframe || block.timestamp_ms - base > i16::MAX as u64,
            };
            if needs_new {
                if !cluster.is_empty() {
                    write_element(out, CLUSTER, &cluster);
                    cluster.clear();
                }
                cluster_base = Some(block.timestamp_ms);
                write_uint(&mut cluster, CLUSTER_TIMESTAMP, block.timestamp_ms);
            }
            let base = cluster_base.unwrap_or(block.timestamp_ms);
            let relative = (block.timestamp_ms - base) as i16;

            let mut simple_block = Vec::with_capacity(block.data.len() + 4);
            // Track number 1 as a one-byte vint
            simple_block.push(0x81);
            simple_block.extend_from_slice(&relative.to_be_bytes());
            simple_block.push(if block.keyframe { 0x80 } else { 0x00 });
            simple_block.extend_from_slice(&block.data);
            write_element(&mut cluster, SIMPLE_BLOCK, &simple_block);
        }

        if !cluster.is_empty() {
            write_element(out, CLUSTER, &cluster);
        }
    }
}

impl ContainerWriter for WebmWriter {
    fn start(&mut self) -> io::Result<()> {
        if self.started {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "container writer already started",
            ));
        }
        if self.track.width == 0 || self.track.height == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "resolution must be non-zero",
            ));
        }
        self.started = true;
        Ok(())
    }

    fn write_sample(&mut self, sample: VideoSample) -> io::Result<()> {
        if !self.started {
            return Err(not_started());
        }
        let timestamp_ms = (sample.timestamp_s * 1000.0).round();
        if !(timestamp_ms.is_finite() && timestamp_ms >= 0.0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("bad sample timestamp: {}", sample.timestamp_s),
            ));
        }
        self.blocks.push(Block {
            data: sample.data,
            timestamp_ms: timestamp_ms as u64,
            keyframe: sample.keyframe,
        });
        Ok(())
    }

    fn finish(&mut self) -> io::Result<Vec<u8>> {
        if !self.started {
            return Err(not_started());
        }
        let mut output = Vec::new();
        self.write_ebml_header(&mut output);

        let mut segment = Vec::new();
        self.write_info(&mut segment);
        self.write_tracks(&mut segment);
        self.write_clusters(&mut segment);
        write_element(&mut output, SEGMENT, &segment);

        self.started = false;
        Ok(output)
    }
}
