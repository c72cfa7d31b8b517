//! Chunk framing for TPX3 streams.
//!
//! A stream is a sequence of chunks, each a `TPX3` header word followed by
//! `chunk_size` bytes of payload packets. The declared size is trusted:
//! payload words are never inspected for the header magic, since a pixel hit
//! can carry the same low 32 bits. Payload decoding lives in the decoder.

use crate::error::ChunkFault;
use crate::packet::Tpx3Packet;

const PACKET_SIZE: usize = 8;

/// A well-formed chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tpx3Section {
    /// Packet index of the header word.
    pub header_index: usize,
    /// Packet index of the first payload word.
    pub start_index: usize,
    /// Packet index one past the last payload word.
    pub end_index: usize,
    /// Chip ID for this section.
    pub chip_id: u8,
    /// Readout mode from the header.
    pub mode: u8,
}

impl Tpx3Section {
    /// Number of 64-bit payload packets in this section.
    #[must_use]
    pub fn packet_count(&self) -> usize {
        self.end_index - self.start_index
    }
}

/// Number of whole packets in `data`.
#[inline]
#[must_use]
pub fn packet_len(data: &[u8]) -> usize {
    data.len() / PACKET_SIZE
}

/// Validates the chunk whose header sits at packet `header_index`.
///
/// # Errors
/// Returns the [`ChunkFault`] describing why the chunk cannot be trusted.
pub fn frame_chunk(data: &[u8], header_index: usize) -> Result<Tpx3Section, ChunkFault> {
    let total = packet_len(data);
    let Some(header) = Tpx3Packet::read(data, header_index) else {
        return Err(ChunkFault::Truncated {
            declared: PACKET_SIZE,
            available: 0,
        });
    };

    let size = header.chunk_size();
    if size % PACKET_SIZE != 0 {
        return Err(ChunkFault::Misaligned(size));
    }

    let start_index = header_index + 1;
    let available = (total - start_index) * PACKET_SIZE;
    if size > available {
        return Err(ChunkFault::Truncated {
            declared: size,
            available,
        });
    }

    Ok(Tpx3Section {
        header_index,
        start_index,
        end_index: start_index + size / PACKET_SIZE,
        chip_id: header.chip_id(),
        mode: header.readout_mode(),
    })
}

/// Packet index of the first chunk header at or after `from`.
///
/// Only used to resynchronise after stray packets or a malformed chunk.
#[must_use]
pub fn next_header(data: &[u8], from: usize) -> Option<usize> {
    (from..packet_len(data)).find(|&i| Tpx3Packet::read(data, i).is_some_and(Tpx3Packet::is_header))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::build;

    #[test]
    fn test_frame_two_chips() {
        let mut words = build::chunk(0, &[build::pixel(1, 1, 0, 0, 1, 0)]);
        words.extend(build::chunk(1, &[build::tdc(0xF, 5, 1), build::pixel(2, 2, 0, 0, 1, 0)]));
        let data = build::to_bytes(&words);

        let first = frame_chunk(&data, 0).unwrap();
        assert_eq!(first.chip_id, 0);
        assert_eq!(first.packet_count(), 1);
        assert_eq!(next_header(&data, first.end_index), Some(2));

        let second = frame_chunk(&data, 2).unwrap();
        assert_eq!(second.chip_id, 1);
        assert_eq!((second.start_index, second.end_index), (3, 5));
        assert_eq!(next_header(&data, second.end_index), None);
    }

    #[test]
    fn test_misaligned_chunk() {
        let data = build::to_bytes(&[build::header(0, 12), 0, 0]);
        assert_eq!(frame_chunk(&data, 0), Err(ChunkFault::Misaligned(12)));
    }

    #[test]
    fn test_truncated_chunk() {
        let data = build::to_bytes(&[build::header(0, 32), 0]);
        assert_eq!(
            frame_chunk(&data, 0),
            Err(ChunkFault::Truncated {
                declared: 32,
                available: 8
            })
        );
    }

    #[test]
    fn test_payload_matching_header_magic_is_kept() {
        // Low 32 bits of this pixel hit spell "TPX3".
        let lookalike = build::pixel(10, 10, 4, 8, 0x335, 0x5054);
        assert!(Tpx3Packet::new(lookalike).is_header());

        let words = build::chunk(
            0,
            &[build::pixel(9, 10, 4, 8, 1, 0), lookalike, build::pixel(11, 10, 4, 8, 1, 0)],
        );
        let data = build::to_bytes(&words);
        let section = frame_chunk(&data, 0).unwrap();
        assert_eq!(section.packet_count(), 3);
        assert_eq!(section.end_index, 4);
    }

    #[test]
    fn test_empty_chunk_is_well_formed() {
        let data = build::to_bytes(&build::chunk(2, &[]));
        let section = frame_chunk(&data, 0).unwrap();
        assert_eq!(section.packet_count(), 0);
    }
}
