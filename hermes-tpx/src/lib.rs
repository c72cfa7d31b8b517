//! hermes-tpx: TPX3 packet decoding and temporal sorting.
//!
//! This crate turns raw Timepix3 byte streams into time-ordered signal
//! batches.
//!
//! # Key Components
//!
//! - [`Tpx3Packet`] - Bit field extraction for every packet type
//! - [`Tpx3Decoder`] - Single-pass chunk iterator with packet accounting
//! - [`DetectorLayout`] - Per-chip coordinate transforms
//! - [`ordering`] - Stable global sort and chunk k-way merge
//!
//! # Processing Pipeline
//!
//! 1. **Framing**: find `TPX3` chunk headers, reject malformed chunks
//! 2. **Decoding**: classify and convert payload packets per chunk
//! 3. **Sorting**: order all records by time of arrival

mod decoder;
mod error;
mod layout;
pub mod ordering;
pub mod packet;
pub mod section;

pub use decoder::{
    chunk_ranges, decode_file, DecodedChunk, DecodedFile, DecoderOptions, Tpx3Decoder,
};
pub use error::{ChunkFault, Error, Result};
pub use layout::{ChipTransform, DetectorLayout, CHIP_SIZE};
pub use ordering::{sort_signals, time_order_global, time_order_merged, BufferMerge};
pub use packet::{PacketType, TdcEdge, Tpx3Packet};
