//! Streaming TPX3 decoder.
//!
//! [`Tpx3Decoder`] walks a byte slice (normally a memory map) once, yielding
//! one [`DecodedChunk`] per well-formed chunk while keeping packet counts for
//! diagnostics. Malformed chunks and stray packets are skipped and counted.
//! A file is corrupt when it cannot be framed at all or when a chunk runs past
//! the end of the data, which only a truncated file produces.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use crate::error::{ChunkFault, Error, Result};
use crate::layout::DetectorLayout;
use crate::packet::{GtsWord, PacketType, Tpx3Packet, COARSE_TICK_NS};
use crate::section::{frame_chunk, next_header, packet_len};
use hermes_core::{
    FileDiagnostics, PacketCounts, ProcessingConfig, SignalBatch, SignalRecord, SignalType, Stage,
};
use std::ops::Range;
use std::time::Instant;

const NS: f64 = 1.0e-9;

/// Decoder settings.
#[derive(Clone, Debug, Default)]
pub struct DecoderOptions {
    /// Stop after examining this many packets, headers included. 0 = unlimited.
    pub max_packets: u64,
    /// Chip coordinate mapping.
    pub layout: DetectorLayout,
}

impl DecoderOptions {
    /// Options derived from a processing configuration.
    #[must_use]
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            max_packets: config.max_packets_to_read,
            layout: DetectorLayout::from_preset(config.layout),
        }
    }

    /// Set the packet limit.
    #[must_use]
    pub fn with_max_packets(mut self, max_packets: u64) -> Self {
        self.max_packets = max_packets;
        self
    }

    /// Set the detector layout.
    #[must_use]
    pub fn with_layout(mut self, layout: DetectorLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// Records decoded from one chunk, in packet order.
#[derive(Clone, Debug)]
pub struct DecodedChunk {
    /// 1-based chunk number within the file.
    pub buffer: u32,
    pub chip_id: u8,
    pub signals: SignalBatch,
}

/// Single-pass chunk iterator over TPX3 bytes.
pub struct Tpx3Decoder<'a> {
    data: &'a [u8],
    options: DecoderOptions,
    cursor: usize,
    packet_total: usize,
    examined: u64,
    counts: PacketCounts,
    malformed: u64,
    framed: u64,
    /// Header packet index of a chunk that ran past the end of the data.
    cut_at: Option<(usize, ChunkFault)>,
    buffer_number: u32,
    gts_low: u32,
}

impl<'a> Tpx3Decoder<'a> {
    /// Prepares a decoder over `data`.
    ///
    /// # Errors
    /// Returns [`Error::CorruptFile`] when the length is not a whole number of
    /// packets or when no chunk header exists.
    pub fn new(data: &'a [u8], options: DecoderOptions) -> Result<Self> {
        if data.len() % 8 != 0 {
            return Err(Error::CorruptFile(format!(
                "length {} is not a multiple of 8 bytes (truncated)",
                data.len()
            )));
        }
        if next_header(data, 0).is_none() {
            return Err(Error::CorruptFile("no TPX3 chunk header found".to_string()));
        }
        Ok(Self {
            data,
            options,
            cursor: 0,
            packet_total: packet_len(data),
            examined: 0,
            counts: PacketCounts::default(),
            malformed: 0,
            framed: 0,
            cut_at: None,
            buffer_number: 0,
            gts_low: 0,
        })
    }

    /// Packets examined so far.
    #[must_use]
    pub fn examined(&self) -> u64 {
        self.examined
    }

    /// Category counts so far.
    #[must_use]
    pub fn counts(&self) -> &PacketCounts {
        &self.counts
    }

    /// Diagnostics for everything decoded so far.
    #[must_use]
    pub fn diagnostics(&self) -> FileDiagnostics {
        let mut diagnostics = FileDiagnostics::for_file(self.data.len() as u64);
        diagnostics.total_packets = self.examined;
        diagnostics.counts = self.counts;
        diagnostics.malformed_buffers = self.malformed;
        diagnostics
    }

    /// Checks that what was decoded so far came from a complete stream.
    ///
    /// # Errors
    /// Returns [`Error::CorruptFile`] when a chunk ran past the end of the
    /// data, or when chunk headers were found but none of them framed.
    pub fn check_complete(&self) -> Result<()> {
        if let Some((index, fault)) = self.cut_at {
            return Err(Error::CorruptFile(format!(
                "chunk at packet {index} is cut short ({fault})"
            )));
        }
        if self.framed == 0 && self.malformed > 0 && !self.limit_reached() {
            return Err(Error::CorruptFile(format!(
                "none of {} chunk headers framed a valid chunk",
                self.malformed
            )));
        }
        Ok(())
    }

    fn budget_left(&self) -> u64 {
        if self.options.max_packets == 0 {
            u64::MAX
        } else {
            self.options.max_packets.saturating_sub(self.examined)
        }
    }

    fn limit_reached(&self) -> bool {
        self.budget_left() == 0
    }

    /// Moves the cursor to `to`, counting skipped words as examined but
    /// uncategorised. Stops early when the packet budget runs out.
    fn skip_unprocessed(&mut self, to: usize) {
        let wanted = (to - self.cursor) as u64;
        let allowed = wanted.min(self.budget_left());
        self.examined += allowed;
        self.cursor += allowed as usize;
    }

    fn decode_packet(&mut self, packet: Tpx3Packet, chip_id: u8) -> SignalRecord {
        match packet.packet_type() {
            PacketType::PixelHit => {
                self.counts.pixel += 1;
                let (lx, ly) = packet.pixel_coordinates();
                let (x, y) = self.options.layout.map_chip_to_global(chip_id, lx, ly);
                SignalRecord::pixel(x, y, packet.pixel_toa_ns() * NS, packet.pixel_tot_ns())
            }
            PacketType::Tdc => match packet.tdc_edge() {
                Some(edge) => {
                    if edge.is_tdc1() {
                        self.counts.tdc1 += 1;
                    } else {
                        self.counts.tdc2 += 1;
                    }
                    SignalRecord::timing(SignalType::Tdc, packet.tdc_toa_ns() * NS, 0.0)
                }
                None => {
                    self.counts.unknown += 1;
                    SignalRecord::timing(SignalType::Unknown, 0.0, 0.0)
                }
            },
            PacketType::GlobalTime => {
                self.counts.gts += 1;
                let ticks = match packet.gts_word() {
                    GtsWord::Low => {
                        self.gts_low = packet.gts_low();
                        u64::from(self.gts_low)
                    }
                    GtsWord::High => {
                        (u64::from(packet.gts_high()) << 32) | u64::from(self.gts_low)
                    }
                    GtsWord::Other => 0,
                };
                SignalRecord::timing(
                    SignalType::GlobalTimestamp,
                    ticks as f64 * COARSE_TICK_NS * NS,
                    f64::from(packet.spidr_time()),
                )
            }
            PacketType::SpidrControl | PacketType::Tpx3Control => {
                self.counts.control += 1;
                SignalRecord::timing(SignalType::Control, 0.0, 0.0)
            }
            PacketType::Other(kind) => {
                self.counts.unknown += 1;
                log::trace!("unknown packet type {kind:#x} at packet {}", self.cursor);
                SignalRecord::timing(SignalType::Unknown, 0.0, 0.0)
            }
        }
    }
}

impl Iterator for Tpx3Decoder<'_> {
    type Item = DecodedChunk;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cursor >= self.packet_total || self.limit_reached() {
                return None;
            }
            let packet = Tpx3Packet::read(self.data, self.cursor)?;

            if !packet.is_header() {
                let to = next_header(self.data, self.cursor + 1).unwrap_or(self.packet_total);
                log::debug!(
                    "skipping {} stray packets at packet {}",
                    to - self.cursor,
                    self.cursor
                );
                self.skip_unprocessed(to);
                continue;
            }

            self.examined += 1;
            self.counts.buffers += 1;
            self.buffer_number += 1;

            let section = match frame_chunk(self.data, self.cursor) {
                Ok(section) => section,
                Err(fault @ ChunkFault::Truncated { .. }) => {
                    self.malformed += 1;
                    log::warn!(
                        "buffer {}: chunk at packet {} runs past the end of the data: {fault}",
                        self.buffer_number,
                        self.cursor
                    );
                    self.cut_at = Some((self.cursor, fault));
                    self.cursor += 1;
                    self.skip_unprocessed(self.packet_total);
                    return None;
                }
                Err(fault) => {
                    self.malformed += 1;
                    log::warn!(
                        "buffer {}: skipping malformed chunk at packet {}: {fault}",
                        self.buffer_number,
                        self.cursor
                    );
                    let to = next_header(self.data, self.cursor + 1).unwrap_or(self.packet_total);
                    self.cursor += 1;
                    self.skip_unprocessed(to);
                    continue;
                }
            };

            let mut signals = SignalBatch::with_capacity(section.packet_count());
            self.cursor = section.start_index;
            while self.cursor < section.end_index && !self.limit_reached() {
                if let Some(packet) = Tpx3Packet::read(self.data, self.cursor) {
                    let record = self
                        .decode_packet(packet, section.chip_id)
                        .with_origin(self.buffer_number, section.chip_id);
                    signals.push(&record);
                }
                self.examined += 1;
                self.cursor += 1;
            }

            self.framed += 1;
            return Some(DecodedChunk {
                buffer: self.buffer_number,
                chip_id: section.chip_id,
                signals,
            });
        }
    }
}

/// All records of a file, in packet order, plus where each chunk starts.
#[derive(Clone, Debug, Default)]
pub struct DecodedFile {
    pub signals: SignalBatch,
    /// Row index at which each decoded chunk begins.
    pub chunk_starts: Vec<usize>,
    pub diagnostics: FileDiagnostics,
}

impl DecodedFile {
    /// Row ranges of the decoded chunks.
    #[must_use]
    pub fn chunk_ranges(&self) -> Vec<Range<usize>> {
        chunk_ranges(&self.chunk_starts, self.signals.len())
    }
}

/// Turns chunk start rows into contiguous ranges ending at `len`.
#[must_use]
pub fn chunk_ranges(starts: &[usize], len: usize) -> Vec<Range<usize>> {
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| start..starts.get(i + 1).copied().unwrap_or(len))
        .collect()
}

/// Decodes a whole file into one batch.
///
/// # Errors
/// Returns [`Error::CorruptFile`] for undecodable or truncated input and
/// [`Error::CoreError`] if the packet accounting does not reconcile.
pub fn decode_file(data: &[u8], options: DecoderOptions) -> Result<DecodedFile> {
    let start = Instant::now();
    let mut decoder = Tpx3Decoder::new(data, options)?;
    let mut signals = SignalBatch::with_capacity(packet_len(data));
    let mut chunk_starts = Vec::new();

    for chunk in decoder.by_ref() {
        chunk_starts.push(signals.len());
        signals.append(&chunk.signals);
    }
    decoder.check_complete()?;

    let mut diagnostics = decoder.diagnostics();
    let unprocessed = diagnostics.unprocessed()?;
    if unprocessed > 0 {
        log::info!("{unprocessed} packets outside well-formed chunks were not processed");
    }
    diagnostics.timings.record(Stage::Unpack, start.elapsed());
    log::debug!(
        "decoded {} chunks, {} signals, {} malformed",
        chunk_starts.len(),
        signals.len(),
        diagnostics.malformed_buffers
    );

    Ok(DecodedFile {
        signals,
        chunk_starts,
        diagnostics,
    })
}
