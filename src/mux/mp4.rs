//! MP4 (ISO BMFF) writer
//!
//! Assembles `ftyp` + `mdat` + `moov` with a full sample table: fixed-delta
//! timing (`stts`), keyframe sync points (`stss`), one chunk holding every
//! sample (`stsc`/`stco`) and per-sample sizes (`stsz`). Samples are stored
//! in memory until `finish`.

use super::{not_started, ContainerWriter, VideoSample, VideoTrackSpec};
use crate::codec::{AlphaMode, VideoCodec};
use std::io::{self, Write};

/// Ticks per second in the movie and media headers
const MOVIE_TIMESCALE: u32 = 90_000;

/// Byte offset of the first sample: ftyp (28 bytes) + mdat header (8 bytes)
const FTYP_SIZE: u32 = 28;

struct Sample {
    data: Vec<u8>,
    keyframe: bool,
}

/// Single-video-track MP4 writer
pub struct Mp4Writer {
    track: VideoTrackSpec,
    samples: Vec<Sample>,
    started: bool,
}

impl Mp4Writer {
    pub fn new(track: VideoTrackSpec) -> Self {
        Self {
            track,
            samples: Vec::new(),
            started: false,
        }
    }

    /// Ticks per frame at the movie timescale
    fn sample_delta(&self) -> u32 {
        ((MOVIE_TIMESCALE as f64 / self.track.frame_rate).round() as u32).max(1)
    }

    /// Total track duration in timescale ticks
    fn duration(&self) -> io::Result<u32> {
        let ticks = self.samples.len() as u64 * self.sample_delta() as u64;
        u32::try_from(ticks)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "track duration overflow"))
    }

    fn write_box_header(&self, out: &mut Vec<u8>, size: u32, box_type: &[u8; 4]) -> io::Result<()> {
        out.write_all(&size.to_be_bytes())?;
        out.write_all(box_type)?;
        Ok(())
    }

    /// ftyp box (file type)
    fn write_ftyp_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let brand = b"isom";
        let minor_version: u32 = 512;
        let compatible_brands: [&[u8; 4]; 3] = [b"isom", b"iso2", b"mp41"];

        let size = 8 + 4 + 4 + (compatible_brands.len() * 4);
        self.write_box_header(out, size as u32, b"ftyp")?;
        out.write_all(brand)?;
        out.write_all(&minor_version.to_be_bytes())?;
        for brand in &compatible_brands {
            out.write_all(*brand)?;
        }
        Ok(())
    }

    /// mdat box (media data)
    fn write_mdat_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let data_size: u64 = self.samples.iter().map(|s| s.data.len() as u64).sum();
        let box_size = u32::try_from(8 + data_size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "media data exceeds 4 GiB"))?;
        self.write_box_header(out, box_size, b"mdat")?;
        for sample in &self.samples {
            out.write_all(&sample.data)?;
        }
        Ok(())
    }

    /// moov box (movie header + track)
    fn write_moov_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let mut moov_contents = Vec::new();
        self.write_mvhd_box(&mut moov_contents)?;
        self.write_trak_box(&mut moov_contents)?;

        let moov_size = 8 + moov_contents.len();
        self.write_box_header(out, moov_size as u32, b"moov")?;
        out.write_all(&moov_contents)?;
        Ok(())
    }

    /// mvhd box (movie header)
    fn write_mvhd_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let duration = self.duration()?;

        let mut content = Vec::new();
        // Version and flags
        content.write_all(&[0, 0, 0, 0])?;
        // Creation time
        content.write_all(&0u32.to_be_bytes())?;
        // Modification time
        content.write_all(&0u32.to_be_bytes())?;
        // Timescale
        content.write_all(&MOVIE_TIMESCALE.to_be_bytes())?;
        // Duration
        content.write_all(&duration.to_be_bytes())?;
        // Rate (1.0 fixed point)
        content.write_all(&0x00010000u32.to_be_bytes())?;
        // Volume (1.0 fixed point)
        content.write_all(&[0x01, 0x00])?;
        // Reserved
        content.write_all(&[0u8; 10])?;
        // Matrix (identity)
        let matrix: [u32; 9] = [0x00010000, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000];
        for val in &matrix {
            content.write_all(&val.to_be_bytes())?;
        }
        // Pre-defined
        content.write_all(&[0u8; 24])?;
        // Next track ID
        content.write_all(&2u32.to_be_bytes())?;

        let size = 8 + content.len();
        self.write_box_header(out, size as u32, b"mvhd")?;
        out.write_all(&content)?;
        Ok(())
    }

    /// trak box (track)
    fn write_trak_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let mut trak_contents = Vec::new();
        self.write_tkhd_box(&mut trak_contents)?;
        self.write_mdia_box(&mut trak_contents)?;

        let trak_size = 8 + trak_contents.len();
        self.write_box_header(out, trak_size as u32, b"trak")?;
        out.write_all(&trak_contents)?;
        Ok(())
    }

    /// tkhd box (track header)
    fn write_tkhd_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let duration = self.duration()?;

        let mut content = Vec::new();
        // Version and flags (track enabled)
        content.write_all(&[0, 0, 0, 3])?;
        // Creation time
        content.write_all(&0u32.to_be_bytes())?;
        // Modification time
        content.write_all(&0u32.to_be_bytes())?;
        // Track ID
        content.write_all(&1u32.to_be_bytes())?;
        // Reserved
        content.write_all(&0u32.to_be_bytes())?;
        // Duration
        content.write_all(&duration.to_be_bytes())?;
        // Reserved
        content.write_all(&[0u8; 8])?;
        // Layer
        content.write_all(&0u16.to_be_bytes())?;
        // Alternate group
        content.write_all(&0u16.to_be_bytes())?;
        // Volume
        content.write_all(&0u16.to_be_bytes())?;
        // Reserved
        content.write_all(&0u16.to_be_bytes())?;
        // Matrix (identity)
        let matrix: [u32; 9] = [0x00010000, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000];
        for val in &matrix {
            content.write_all(&val.to_be_bytes())?;
        }
        // Width and height (16.16 fixed point)
        content.write_all(&(self.track.width << 16).to_be_bytes())?;
        content.write_all(&(self.track.height << 16).to_be_bytes())?;

        let size = 8 + content.len();
        self.write_box_header(out, size as u32, b"tkhd")?;
        out.write_all(&content)?;
        Ok(())
    }

    /// mdia box (media)
    fn write_mdia_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let mut mdia_contents = Vec::new();
        self.write_mdhd_box(&mut mdia_contents)?;
        self.write_hdlr_box(&mut mdia_contents)?;
        self.write_minf_box(&mut mdia_contents)?;

        let mdia_size = 8 + mdia_contents.len();
        self.write_box_header(out, mdia_size as u32, b"mdia")?;
        out.write_all(&mdia_contents)?;
        Ok(())
    }

    /// mdhd box (media header)
    fn write_mdhd_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let duration = self.duration()?;

        let mut content = Vec::new();
        // Version and flags
        content.write_all(&[0, 0, 0, 0])?;
        // Creation time
        content.write_all(&0u32.to_be_bytes())?;
        // Modification time
        content.write_all(&0u32.to_be_bytes())?;
        // Timescale
        content.write_all(&MOVIE_TIMESCALE.to_be_bytes())?;
        // Duration
        content.write_all(&duration.to_be_bytes())?;
        // Language (und)
        content.write_all(&0x55c4u16.to_be_bytes())?;
        // Quality
        content.write_all(&0u16.to_be_bytes())?;

        let size = 8 + content.len();
        self.write_box_header(out, size as u32, b"mdhd")?;
        out.write_all(&content)?;
        Ok(())
    }

    /// hdlr box (handler)
    fn write_hdlr_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let mut content = Vec::new();
        // Version and flags
        content.write_all(&[0, 0, 0, 0])?;
        // Pre-defined
        content.write_all(&0u32.to_be_bytes())?;
        // Handler type (vide)
        content.write_all(b"vide")?;
        // Reserved
        content.write_all(&[0u8; 12])?;
        // Name (null-terminated)
        content.write_all(b"Framereel Video Handler\0")?;

        let size = 8 + content.len();
        self.write_box_header(out, size as u32, b"hdlr")?;
        out.write_all(&content)?;
        Ok(())
    }

    /// minf box (media information)
    fn write_minf_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let mut minf_contents = Vec::new();
        self.write_vmhd_box(&mut minf_contents)?;
        self.write_dinf_box(&mut minf_contents)?;
        self.write_stbl_box(&mut minf_contents)?;

        let minf_size = 8 + minf_contents.len();
        self.write_box_header(out, minf_size as u32, b"minf")?;
        out.write_all(&minf_contents)?;
        Ok(())
    }

    /// vmhd box (video media header)
    fn write_vmhd_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let mut content = Vec::new();
        // Version and flags (1 for vmhd)
        content.write_all(&[0, 0, 0, 1])?;
        // Graphics mode
        content.write_all(&0u16.to_be_bytes())?;
        // Op color
        content.write_all(&[0u8; 6])?;

        let size = 8 + content.len();
        self.write_box_header(out, size as u32, b"vmhd")?;
        out.write_all(&content)?;
        Ok(())
    }

    /// dinf box (data information)
    fn write_dinf_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let mut dinf_contents = Vec::new();
        self.write_dref_box(&mut dinf_contents)?;

        let dinf_size = 8 + dinf_contents.len();
        self.write_box_header(out, dinf_size as u32, b"dinf")?;
        out.write_all(&dinf_contents)?;
        Ok(())
    }

    /// dref box (data reference)
    fn write_dref_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let mut content = Vec::new();
        // Version and flags
        content.write_all(&[0, 0, 0, 0])?;
        // Entry count
        content.write_all(&1u32.to_be_bytes())?;
        // url entry (self-contained)
        content.write_all(&12u32.to_be_bytes())?;
        content.write_all(b"url ")?;
        content.write_all(&[0, 0, 0, 1])?;

        let size = 8 + content.len();
        self.write_box_header(out, size as u32, b"dref")?;
        out.write_all(&content)?;
        Ok(())
    }

    /// stbl box (sample table)
    fn write_stbl_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let mut stbl_contents = Vec::new();
        self.write_stsd_box(&mut stbl_contents)?;
        self.write_stts_box(&mut stbl_contents)?;
        self.write_stss_box(&mut stbl_contents)?;
        self.write_stsc_box(&mut stbl_contents)?;
        self.write_stsz_box(&mut stbl_contents)?;
        self.write_stco_box(&mut stbl_contents)?;

        let stbl_size = 8 + stbl_contents.len();
        self.write_box_header(out, stbl_size as u32, b"stbl")?;
        out.write_all(&stbl_contents)?;
        Ok(())
    }

    /// stsd box (sample description)
    fn write_stsd_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let mut content = Vec::new();
        // Version and flags
        content.write_all(&[0, 0, 0, 0])?;
        // Entry count
        content.write_all(&1u32.to_be_bytes())?;

        let mut entry = Vec::new();
        // Reserved
        entry.write_all(&[0u8; 6])?;
        // Data reference index
        entry.write_all(&1u16.to_be_bytes())?;
        // Pre-defined
        entry.write_all(&0u16.to_be_bytes())?;
        // Reserved
        entry.write_all(&0u16.to_be_bytes())?;
        // Pre-defined
        entry.write_all(&[0u8; 12])?;
        // Width and height
        entry.write_all(&(self.track.width as u16).to_be_bytes())?;
        entry.write_all(&(self.track.height as u16).to_be_bytes())?;
        // Horizontal and vertical resolution (72 dpi fixed point)
        entry.write_all(&0x00480000u32.to_be_bytes())?;
        entry.write_all(&0x00480000u32.to_be_bytes())?;
        // Reserved
        entry.write_all(&0u32.to_be_bytes())?;
        // Frame count per sample
        entry.write_all(&1u16.to_be_bytes())?;
        // Compressor name (32 bytes, Pascal string)
        let mut compressor_name = [0u8; 32];
        let name = b"Framereel";
        compressor_name[0] = name.len() as u8;
        compressor_name[1..1 + name.len()].copy_from_slice(name);
        entry.write_all(&compressor_name)?;
        // Depth: 32 when the raw samples keep their alpha plane
        let depth: u16 =
            if self.track.codec == VideoCodec::Raw && self.track.alpha == AlphaMode::Keep {
                32
            } else {
                24
            };
        entry.write_all(&depth.to_be_bytes())?;
        // Pre-defined
        entry.write_all(&(-1i16).to_be_bytes())?;

        let entry_size = 8 + entry.len();
        content.write_all(&(entry_size as u32).to_be_bytes())?;
        content.write_all(self.track.codec.sample_entry_tag())?;
        content.write_all(&entry)?;

        let size = 8 + content.len();
        self.write_box_header(out, size as u32, b"stsd")?;
        out.write_all(&content)?;
        Ok(())
    }

    /// stts box (time-to-sample, single fixed delta)
    fn write_stts_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let mut content = Vec::new();
        // Version and flags
        content.write_all(&[0, 0, 0, 0])?;
        if self.samples.is_empty() {
            content.write_all(&0u32.to_be_bytes())?;
        } else {
            // Entry count
            content.write_all(&1u32.to_be_bytes())?;
            // Sample count
            content.write_all(&(self.samples.len() as u32).to_be_bytes())?;
            // Sample delta
            content.write_all(&self.sample_delta().to_be_bytes())?;
        }

        let size = 8 + content.len();
        self.write_box_header(out, size as u32, b"stts")?;
        out.write_all(&content)?;
        Ok(())
    }

    /// stss box (sync sample table, 1-based keyframe indices)
    fn write_stss_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let keyframes: Vec<u32> = self
            .samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.keyframe)
            .map(|(i, _)| i as u32 + 1)
            .collect();

        let mut content = Vec::new();
        // Version and flags
        content.write_all(&[0, 0, 0, 0])?;
        // Entry count
        content.write_all(&(keyframes.len() as u32).to_be_bytes())?;
        for sample_number in &keyframes {
            content.write_all(&sample_number.to_be_bytes())?;
        }

        let size = 8 + content.len();
        self.write_box_header(out, size as u32, b"stss")?;
        out.write_all(&content)?;
        Ok(())
    }

    /// stsc box (sample-to-chunk, all samples in one chunk)
    fn write_stsc_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let mut content = Vec::new();
        // Version and flags
        content.write_all(&[0, 0, 0, 0])?;
        if self.samples.is_empty() {
            content.write_all(&0u32.to_be_bytes())?;
        } else {
            // Entry count
            content.write_all(&1u32.to_be_bytes())?;
            // First chunk
            content.write_all(&1u32.to_be_bytes())?;
            // Samples per chunk
            content.write_all(&(self.samples.len() as u32).to_be_bytes())?;
            // Sample description index
            content.write_all(&1u32.to_be_bytes())?;
        }

        let size = 8 + content.len();
        self.write_box_header(out, size as u32, b"stsc")?;
        out.write_all(&content)?;
        Ok(())
    }

    /// stsz box (per-sample sizes)
    fn write_stsz_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let mut content = Vec::new();
        // Version and flags
        content.write_all(&[0, 0, 0, 0])?;
        // Sample size (0 = variable)
        content.write_all(&0u32.to_be_bytes())?;
        // Sample count
        content.write_all(&(self.samples.len() as u32).to_be_bytes())?;
        for sample in &self.samples {
            content.write_all(&(sample.data.len() as u32).to_be_bytes())?;
        }

        let size = 8 + content.len();
        self.write_box_header(out, size as u32, b"stsz")?;
        out.write_all(&content)?;
        Ok(())
    }

    /// stco box (chunk offsets; one chunk right after the mdat header)
    fn write_stco_box(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let mdat_offset = FTYP_SIZE + 8;

        let mut content = Vec::new();
        // Version and flags
        content.write_all(&[0, 0, 0, 0])?;
        if self.samples.is_empty() {
            content.write_all(&0u32.to_be_bytes())?;
        } else {
            // Entry count
            content.write_all(&1u32.to_be_bytes())?;
            // Chunk offset
            content.write_all(&mdat_offset.to_be_bytes())?;
        }

        let size = 8 + content.len();
        self.write_box_header(out, size as u32, b"stco")?;
        out.write_all(&content)?;
        Ok(())
    }
}

impl ContainerWriter for Mp4Writer {
    fn start(&mut self) -> io::Result<()> {
        if self.started {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "container writer already started",
            ));
        }
        // Sample entry width/height are 16-bit fields
        if self.track.width == 0
            || self.track.height == 0
            || self.track.width > u16::MAX as u32
            || self.track.height > u16::MAX as u32
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "resolution {}x{} not representable in an MP4 track",
                    self.track.width, self.track.height
                ),
            ));
        }
        self.started = true;
        Ok(())
    }

    fn write_sample(&mut self, sample: VideoSample) -> io::Result<()> {
        if !self.started {
            return Err(not_started());
        }
        self.samples.push(Sample {
            data: sample.data,
            keyframe: sample.keyframe,
        });
        Ok(())
    }

    fn finish(&mut self) -> io::Result<Vec<u8>> {
        if !self.started {
            return Err(not_started());
        }
        let mut output = Vec::new();
        self.write_ftyp_box(&mut output)?;
        self.write_mdat_box(&mut output)?;
        self.write_moov_box(&mut output)?;
        self.started = false;
        Ok(output)
    }
}
