// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Captured radar record decoder.
//!
//! A capture is a flat concatenation of records:
//!
//! ```text
//! | header (24) | payload (data_bytes) | arrival time i64 (8) |
//! ```
//!
//! The payload carries the sections flagged in the header's stream data
//! mask, in bit order: magnitude grid, detection list, tracking list.  All
//! values are big-endian.

use crate::{config::RadarConfiguration, cursor::ByteReader, error::Error};
use ndarray::{s, Array2, Array3, ArrayBase, Axis, DataMut, Ix2};
use std::{
    fmt,
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::Path,
    thread,
};
use tracing::{debug, instrument, warn};

/// Magic value opening every record.
pub const SYNC_WORD: u32 = 0xAA55_CC33;
/// Size of the fixed record header.
pub const HEADER_SIZE: usize = 24;
/// Size of the arrival timestamp trailing each record.
pub const TIMESTAMP_SIZE: usize = 8;
/// Size of one detection entry.
pub const DETECTION_SIZE: usize = 10;
/// Size of one tracking entry.
pub const TRACKING_SIZE: usize = 24;

/// Stream data mask bits.
pub mod stream {
    /// Range-Doppler magnitude grid.
    pub const MAGNITUDES: u16 = 0x0004;
    pub const DETECTIONS: u16 = 0x0020;
    pub const TRACKINGS: u16 = 0x0040;
}

/// Device timestamps at or below this value come from debug firmware which
/// reports processing time instead of wall-clock time.
const DEBUG_TIMESTAMP_LIMIT: u64 = 500_000;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RecordHeader {
    pub sync_word: u32,
    pub index: u32,
    /// Measurement time [ms] since the epoch.
    pub timestamp: u64,
    pub state: u16,
    pub stream_mask: u16,
    pub data_bytes: u32,
}

impl RecordHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.sync_word.to_be_bytes());
        buf[4..8].copy_from_slice(&self.index.to_be_bytes());
        buf[8..16].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[16..18].copy_from_slice(&self.state.to_be_bytes());
        buf[18..20].copy_from_slice(&self.stream_mask.to_be_bytes());
        buf[20..24].copy_from_slice(&self.data_bytes.to_be_bytes());
        buf
    }
}

/// A slice containing a record header with a valid sync word.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RecordHeaderSlice<'a> {
    slice: &'a [u8],
}

impl<'a> RecordHeaderSlice<'a> {
    /// Views the header at `offset` of `buf`.
    pub fn from_slice(buf: &'a [u8], offset: usize) -> Result<RecordHeaderSlice<'a>, Error> {
        let available = buf.len().saturating_sub(offset);
        if available < HEADER_SIZE {
            return Err(Error::TruncatedHeader { offset, available });
        }

        let header = RecordHeaderSlice {
            slice: &buf[offset..offset + HEADER_SIZE],
        };

        let found = header.sync_word();
        if found != SYNC_WORD {
            return Err(Error::SyncMismatch { offset, found });
        }

        Ok(header)
    }

    pub fn to_header(&self) -> RecordHeader {
        RecordHeader {
            sync_word: self.sync_word(),
            index: self.index(),
            timestamp: self.timestamp(),
            state: self.state(),
            stream_mask: self.stream_mask(),
            data_bytes: self.data_bytes(),
        }
    }

    #[inline]
    pub fn sync_word(&self) -> u32 {
        u32::from_be_bytes([self.slice[0], self.slice[1], self.slice[2], self.slice[3]])
    }

    #[inline]
    pub fn index(&self) -> u32 {
        u32::from_be_bytes([self.slice[4], self.slice[5], self.slice[6], self.slice[7]])
    }

    #[inline]
    pub fn timestamp(&self) -> u64 {
        u64::from_be_bytes([
            self.slice[8],
            self.slice[9],
            self.slice[10],
            self.slice[11],
            self.slice[12],
            self.slice[13],
            self.slice[14],
            self.slice[15],
        ])
    }

    #[inline]
    pub fn state(&self) -> u16 {
        u16::from_be_bytes([self.slice[16], self.slice[17]])
    }

    #[inline]
    pub fn stream_mask(&self) -> u16 {
        u16::from_be_bytes([self.slice[18], self.slice[19]])
    }

    #[inline]
    pub fn data_bytes(&self) -> u32 {
        u32::from_be_bytes([self.slice[20], self.slice[21], self.slice[22], self.slice[23]])
    }
}

/// One record of a capture, without its payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RadarRecord {
    pub index: u32,
    pub state: u16,
    pub stream_mask: u16,
    pub data_bytes: u32,
    /// Measurement time [ms] since the epoch, processing time [µs] on debug
    /// firmware.
    pub timestamp: u64,
    /// Host arrival time [ns].
    pub arrival_time: i64,
    /// Offset of the header in the source buffer.
    pub offset: usize,
    /// Header, payload and arrival time.
    pub length: usize,
}

impl RadarRecord {
    /// Time of the record [µs].  Uses the device timestamp unless it is
    /// implausibly small, in which case the host arrival time is used.
    pub fn effective_time_micros(&self) -> i64 {
        if self.timestamp > DEBUG_TIMESTAMP_LIMIT {
            (self.timestamp as i64).wrapping_mul(1000)
        } else {
            self.arrival_time / 1000
        }
    }

    pub fn has_magnitudes(&self) -> bool {
        self.stream_mask & stream::MAGNITUDES != 0
    }

    pub fn has_detections(&self) -> bool {
        self.stream_mask & stream::DETECTIONS != 0
    }

    pub fn has_trackings(&self) -> bool {
        self.stream_mask & stream::TRACKINGS != 0
    }

    /// Offset of the next record.
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    fn payload_range(&self) -> (usize, usize) {
        let start = self.offset + HEADER_SIZE;
        (start, start + self.data_bytes as usize)
    }
}

/// Decodes the record at `offset`, skipping over its payload.
pub fn decode_record(buf: &[u8], offset: usize) -> Result<RadarRecord, Error> {
    let header = RecordHeaderSlice::from_slice(buf, offset)?;

    let mut reader = ByteReader::at(buf, offset + HEADER_SIZE);
    reader.section("payload").skip(header.data_bytes() as usize)?;
    let arrival_time = reader.section("arrival time").i64()?;

    Ok(RadarRecord {
        index: header.index(),
        state: header.state(),
        stream_mask: header.stream_mask(),
        data_bytes: header.data_bytes(),
        timestamp: header.timestamp(),
        arrival_time,
        offset,
        length: reader.offset() - offset,
    })
}

/// What a [`RecordReader`] does when a record fails to decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// End the scan and keep the error for the caller to inspect, the scan
    /// can be resumed with [`RecordReader::resume_at`].
    Stop,
    /// Yield the error as the last item.
    Fatal,
}

/// Sequential scan over the records of a buffer.
///
/// The scan can be started at any record boundary, so splitting a buffer at
/// a record and scanning both halves yields the same records as a single
/// pass.
pub struct RecordReader<'a> {
    buf: &'a [u8],
    offset: usize,
    policy: ErrorPolicy,
    error: Option<Error>,
    done: bool,
}

impl<'a> RecordReader<'a> {
    pub fn new(buf: &'a [u8], policy: ErrorPolicy) -> RecordReader<'a> {
        Self::at(buf, 0, policy)
    }

    pub fn at(buf: &'a [u8], offset: usize, policy: ErrorPolicy) -> RecordReader<'a> {
        RecordReader {
            buf,
            offset,
            policy,
            error: None,
            done: false,
        }
    }

    /// Offset of the next record to decode, or of the failed record after an
    /// error.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The error that stopped the scan under [`ErrorPolicy::Stop`].
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    /// Clears any stored error and continues scanning from `offset`.
    pub fn resume_at(&mut self, offset: usize) {
        self.offset = offset;
        self.error = None;
        self.done = false;
    }
}

impl Iterator for RecordReader<'_> {
    type Item = Result<RadarRecord, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.buf.len() {
            return None;
        }

        match decode_record(self.buf, self.offset) {
            Ok(record) => {
                self.offset = record.end();
                Some(Ok(record))
            }
            Err(err) => {
                self.done = true;
                match self.policy {
                    ErrorPolicy::Stop => {
                        warn!("stopping after error: {}", err);
                        self.error = Some(err);
                        None
                    }
                    ErrorPolicy::Fatal => Some(Err(err)),
                }
            }
        }
    }
}

/// Range-Doppler magnitudes of one record.
///
/// Samples are stored as transmitted: Doppler-major, `range_bins` samples per
/// Doppler bin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MagnitudeGrid {
    pub data: Vec<u16>,
    pub range_bins: usize,
    pub doppler_bins: usize,
    /// False when the record carried no magnitudes and the grid is zeros.
    pub present: bool,
}

impl MagnitudeGrid {
    pub fn zeros(config: &RadarConfiguration) -> MagnitudeGrid {
        MagnitudeGrid {
            data: vec![0; config.grid_len()],
            range_bins: config.active_range_bins(),
            doppler_bins: config.active_doppler_bins(),
            present: false,
        }
    }

    fn read(reader: &mut ByteReader, config: &RadarConfiguration) -> Result<MagnitudeGrid, Error> {
        let bytes = reader.section("magnitudes").bytes(config.magnitude_bytes())?;
        Ok(MagnitudeGrid {
            data: be_u16s(bytes).collect(),
            range_bins: config.active_range_bins(),
            doppler_bins: config.active_doppler_bins(),
            present: true,
        })
    }

    pub fn get(&self, range_bin: usize, doppler_bin: usize) -> u16 {
        self.data[doppler_bin * self.range_bins + range_bin]
    }

    /// Grid as a (range, doppler) array.
    pub fn to_array(&self) -> Array2<u16> {
        let mut array = Array2::zeros((self.range_bins, self.doppler_bins));
        fill_range_doppler(&mut array, self.data.iter().copied(), self.range_bins);
        array
    }
}

fn be_u16s(bytes: &[u8]) -> impl Iterator<Item = u16> + '_ {
    bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
}

/// Writes Doppler-major samples into a (range, doppler) array.
fn fill_range_doppler<S: DataMut<Elem = u16>>(
    array: &mut ArrayBase<S, Ix2>,
    values: impl Iterator<Item = u16>,
    range_bins: usize,
) {
    for (i, value) in values.enumerate() {
        array[[i % range_bins, i / range_bins]] = value;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Detection {
    pub range_bin: u16,
    pub doppler_bin: i16,
    pub magnitude: u16,
    /// [deg]
    pub azimuth: i16,
    /// [deg]
    pub elevation: i16,
}

impl Detection {
    fn read(reader: &mut ByteReader) -> Result<Detection, Error> {
        let detection = Detection {
            range_bin: reader.u16()?,
            doppler_bin: reader.i16()?,
            magnitude: reader.u16()?,
            azimuth: reader.i16()?,
            elevation: reader.i16()?,
        };
        if !(-90..=90).contains(&detection.azimuth) {
            warn!("detection azimuth {} out of range", detection.azimuth);
        }
        Ok(detection)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tracking {
    pub id: u16,
    /// [m]
    pub distance: f32,
    /// [m/s]
    pub speed: f32,
    pub magnitude: u16,
    /// [deg]
    pub azimuth: f32,
    /// [deg]
    pub elevation: f32,
    /// Number of times the track was confirmed.
    pub life_time: u32,
}

impl Tracking {
    fn read(reader: &mut ByteReader) -> Result<Tracking, Error> {
        let tracking = Tracking {
            id: reader.u16()?,
            distance: reader.f32()?,
            speed: reader.f32()?,
            magnitude: reader.u16()?,
            azimuth: reader.f32()?,
            elevation: reader.f32()?,
            life_time: reader.u32()?,
        };
        if !(-90.0..=90.0).contains(&tracking.azimuth) {
            warn!("tracking azimuth {} out of range", tracking.azimuth);
        }
        Ok(tracking)
    }
}

/// Payload sections to decode.  Sections that are present but not selected
/// are skipped over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sections {
    pub magnitudes: bool,
    pub detections: bool,
    pub trackings: bool,
}

impl Sections {
    pub const ALL: Sections = Sections {
        magnitudes: true,
        detections: true,
        trackings: true,
    };

    pub const HEADER_ONLY: Sections = Sections {
        magnitudes: false,
        detections: false,
        trackings: false,
    };
}

impl Default for Sections {
    fn default() -> Self {
        Sections::ALL
    }
}

/// A fully decoded record.
#[derive(Clone, Debug, PartialEq)]
pub struct RadarFrame {
    pub record: RadarRecord,
    /// `None` when magnitudes were not selected, zeros when selected but
    /// absent from the record.
    pub magnitudes: Option<MagnitudeGrid>,
    pub detections: Vec<Detection>,
    pub trackings: Vec<Tracking>,
}

impl fmt::Display for RadarFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "RadarFrame {{ index: {}, time: {}, mask: 0x{:04X}, magnitudes: {}, detections: {}, trackings: {} }}",
            self.record.index,
            self.record.effective_time_micros(),
            self.record.stream_mask,
            self.magnitudes.as_ref().is_some_and(|grid| grid.present),
            self.detections.len(),
            self.trackings.len()
        )
    }
}

/// Decodes the record at `offset` including the selected payload sections.
///
/// Section reads are bounded by the record's payload, a count running past
/// it fails with [`Error::Truncated`].
#[instrument(skip_all)]
pub fn decode_frame(
    buf: &[u8],
    offset: usize,
    config: &RadarConfiguration,
    sections: Sections,
) -> Result<RadarFrame, Error> {
    let record = decode_record(buf, offset)?;
    let (start, end) = record.payload_range();
    let mut reader = ByteReader::at(&buf[..end], start);

    let magnitudes = match (record.has_magnitudes(), sections.magnitudes) {
        (true, true) => Some(MagnitudeGrid::read(&mut reader, config)?),
        (true, false) => {
            reader.section("magnitudes").skip(config.magnitude_bytes())?;
            None
        }
        (false, true) => Some(MagnitudeGrid::zeros(config)),
        (false, false) => None,
    };

    let mut detections = Vec::new();
    if record.has_detections() {
        let count = reader.section("detections").u16()? as usize;
        if sections.detections {
            detections.reserve(count);
            for _ in 0..count {
                detections.push(Detection::read(&mut reader)?);
            }
        } else {
            reader.skip(count * DETECTION_SIZE)?;
        }
    }

    let mut trackings = Vec::new();
    if record.has_trackings() {
        let count = reader.section("trackings").u16()? as usize;
        if sections.trackings {
            trackings.reserve(count);
            for _ in 0..count {
                trackings.push(Tracking::read(&mut reader)?);
            }
        } else {
            reader.skip(count * TRACKING_SIZE)?;
        }
    }

    Ok(RadarFrame {
        record,
        magnitudes,
        detections,
        trackings,
    })
}

/// Decodes the magnitude grids of the records at `offsets` into a
/// (frames, range, doppler) array.  Records without magnitudes contribute
/// zeros.
#[instrument(skip_all)]
pub fn decode_magnitudes_at(
    buf: &[u8],
    offsets: &[usize],
    config: &RadarConfiguration,
) -> Result<Array3<u16>, Error> {
    let range_bins = config.active_range_bins();
    let mut out = Array3::zeros((offsets.len(), range_bins, config.active_doppler_bins()));

    for (frame, &offset) in offsets.iter().enumerate() {
        let record = decode_record(buf, offset)?;
        if record.has_magnitudes() {
            let mut reader = ByteReader::at(buf, offset + HEADER_SIZE);
            let bytes = reader.section("magnitudes").bytes(config.magnitude_bytes())?;
            fill_range_doppler(
                &mut out.index_axis_mut(Axis(0), frame),
                be_u16s(bytes),
                range_bins,
            );
        }
    }

    Ok(out)
}

/// Decodes `frame_count` records laid out at the fixed stride of `config`
/// from the start of `buf` into a (frames, range, doppler) array.
///
/// Every record is expected to carry a full magnitude grid of the configured
/// shape and nothing else.  A sync word mismatch at any stride position is
/// fatal.  `base_offset` is the position of `buf` in its source, used only
/// for error reporting.
#[instrument(skip_all)]
pub fn decode_magnitudes_fixed_stride(
    buf: &[u8],
    base_offset: usize,
    config: &RadarConfiguration,
    frame_count: usize,
) -> Result<Array3<u16>, Error> {
    let stride = config.frame_stride();
    let expected = frame_count * stride;
    if buf.len() < expected {
        return Err(Error::ShortRead {
            expected,
            received: buf.len(),
        });
    }

    let range_bins = config.active_range_bins();
    let mut out = Array3::zeros((frame_count, range_bins, config.active_doppler_bins()));

    for frame in 0..frame_count {
        let offset = frame * stride;
        let header = RecordHeaderSlice::from_slice(buf, offset).map_err(|err| match err {
            Error::SyncMismatch { offset, found } => Error::SyncMismatch {
                offset: base_offset + offset,
                found,
            },
            err => err,
        })?;

        if header.stream_mask() & stream::MAGNITUDES != 0 {
            let start = offset + HEADER_SIZE;
            let bytes = &buf[start..start + config.magnitude_bytes()];
            fill_range_doppler(
                &mut out.index_axis_mut(Axis(0), frame),
                be_u16s(bytes),
                range_bins,
            );
        }
    }

    Ok(out)
}

/// Reads `frame_count` fixed-stride records starting at `start_offset` with
/// one read and decodes them with [`decode_magnitudes_fixed_stride`].
pub fn read_magnitudes_seeked<R: Read + Seek>(
    reader: &mut R,
    start_offset: u64,
    config: &RadarConfiguration,
    frame_count: usize,
) -> Result<Array3<u16>, Error> {
    let expected = frame_count * config.frame_stride();
    reader.seek(SeekFrom::Start(start_offset))?;

    let mut buf = Vec::with_capacity(expected);
    reader.take(expected as u64).read_to_end(&mut buf)?;
    if buf.len() < expected {
        return Err(Error::ShortRead {
            expected,
            received: buf.len(),
        });
    }

    decode_magnitudes_fixed_stride(&buf, start_offset as usize, config, frame_count)
}

/// Splits a fixed-stride read across `workers` threads, each decoding a
/// contiguous run of frames from its own file handle.  The result is
/// identical to a single [`read_magnitudes_seeked`] over the whole range.
#[instrument(skip_all)]
pub fn read_magnitudes_parallel(
    path: &Path,
    start_offset: u64,
    config: &RadarConfiguration,
    frame_count: usize,
    workers: usize,
) -> Result<Array3<u16>, Error> {
    let workers = workers.clamp(1, frame_count.max(1));
    if workers == 1 {
        let mut file = File::open(path)?;
        return read_magnitudes_seeked(&mut file, start_offset, config, frame_count);
    }

    let stride = config.frame_stride() as u64;
    let per_worker = frame_count.div_ceil(workers);
    let runs: Vec<(usize, usize)> = (0..frame_count)
        .step_by(per_worker)
        .map(|first| (first, per_worker.min(frame_count - first)))
        .collect();
    debug!("decoding {} frames in {} runs", frame_count, runs.len());

    let (tx, rx) = kanal::bounded(runs.len());
    let mut chunks: Vec<Option<Result<Array3<u16>, Error>>> = (0..runs.len()).map(|_| None).collect();

    thread::scope(|scope| -> Result<(), Error> {
        for (run, &(first, count)) in runs.iter().enumerate() {
            let tx = tx.clone();
            thread::Builder::new()
                .name(format!("decode{}", run))
                .spawn_scoped(scope, move || {
                    let offset = start_offset + first as u64 * stride;
                    let result = File::open(path)
                        .map_err(Error::from)
                        .and_then(|mut file| read_magnitudes_seeked(&mut file, offset, config, count));
                    // The receiver outlives the scope, a failed send only
                    // means the collector already bailed out.
                    let _ = tx.send((run, result));
                })?;
        }
        drop(tx);

        while let Ok((run, result)) = rx.recv() {
            chunks[run] = Some(result);
        }
        Ok(())
    })?;

    let mut out = Array3::zeros((
        frame_count,
        config.active_range_bins(),
        config.active_doppler_bins(),
    ));
    for (&(first, count), chunk) in runs.iter().zip(chunks) {
        let chunk = chunk.ok_or_else(|| Error::ShortRead {
            expected: count,
            received: 0,
        })??;
        out.slice_mut(s![first..first + count, .., ..]).assign(&chunk);
    }

    Ok(out)
}

/// Converts raw magnitudes to dB, clipped at zero.
pub fn to_decibels(magnitudes: &Array3<u16>) -> Array3<f32> {
    magnitudes.mapv(|m| ((m as f32 - 3584.0) / 85.0).max(0.0))
}
