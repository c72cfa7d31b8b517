//! TPX3 packet bit layout.
//!
//! Field positions follow the Timepix3 / SPIDR readout documentation. All
//! accessors are pure bit extraction on the little-endian 64-bit word.
#![allow(clippy::cast_possible_truncation, clippy::unreadable_literal)]

/// Nanoseconds per coarse clock tick (40 MHz).
pub const COARSE_TICK_NS: f64 = 25.0;

/// Top-nibble packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Pixel hit data (type 0xB).
    PixelHit,
    /// Time-to-digital converter (type 0x6).
    Tdc,
    /// Global time (type 0x4).
    GlobalTime,
    /// SPIDR control (type 0x5).
    SpidrControl,
    /// TPX3 control (type 0x7).
    Tpx3Control,
    /// Anything else, including integrated-ToT packets (type 0xA).
    Other(u8),
}

/// TDC trigger channel and edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TdcEdge {
    Tdc1Rising,
    Tdc1Falling,
    Tdc2Rising,
    Tdc2Falling,
}

impl TdcEdge {
    /// True for either TDC1 edge.
    #[must_use]
    pub fn is_tdc1(self) -> bool {
        matches!(self, Self::Tdc1Rising | Self::Tdc1Falling)
    }
}

/// Global timestamp word half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GtsWord {
    /// Sub-byte 0x44: lower 32 bits of the 48-bit counter.
    Low,
    /// Sub-byte 0x45: upper 16 bits of the 48-bit counter.
    High,
    /// Any other sub-byte.
    Other,
}

/// A raw 64-bit TPX3 word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tpx3Packet(u64);

impl Tpx3Packet {
    /// ASCII `"TPX3"` in the low 32 bits of a chunk header.
    pub const TPX3_HEADER_MAGIC: u64 = 0x3358_5054;

    /// Wraps a raw word.
    #[inline]
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Reads the word at packet index `index` of `data`.
    #[inline]
    #[must_use]
    pub fn read(data: &[u8], index: usize) -> Option<Self> {
        let offset = index.checked_mul(8)?;
        let bytes: [u8; 8] = data.get(offset..offset + 8)?.try_into().ok()?;
        Some(Self(u64::from_le_bytes(bytes)))
    }

    /// Raw word.
    #[inline]
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }

    // ---- chunk header ----

    /// True if this word opens a chunk.
    #[inline]
    #[must_use]
    pub fn is_header(self) -> bool {
        self.0 & 0xFFFF_FFFF == Self::TPX3_HEADER_MAGIC
    }

    /// Chip index from a chunk header.
    #[inline]
    #[must_use]
    pub fn chip_id(self) -> u8 {
        ((self.0 >> 32) & 0xFF) as u8
    }

    /// Readout mode from a chunk header.
    #[inline]
    #[must_use]
    pub fn readout_mode(self) -> u8 {
        ((self.0 >> 40) & 0xFF) as u8
    }

    /// Payload size in bytes from a chunk header, excluding the header itself.
    #[inline]
    #[must_use]
    pub fn chunk_size(self) -> usize {
        ((self.0 >> 48) & 0xFFFF) as usize
    }

    // ---- classification ----

    /// Packet type from the top nibble.
    #[inline]
    #[must_use]
    pub fn packet_type(self) -> PacketType {
        match (self.0 >> 60) as u8 {
            0xB => PacketType::PixelHit,
            0x6 => PacketType::Tdc,
            0x4 => PacketType::GlobalTime,
            0x5 => PacketType::SpidrControl,
            0x7 => PacketType::Tpx3Control,
            other => PacketType::Other(other),
        }
    }

    // ---- pixel hit (0xB) ----

    /// Chip-local pixel coordinates.
    #[inline]
    #[must_use]
    pub fn pixel_coordinates(self) -> (u16, u16) {
        let dcol = ((self.0 & 0x0FE0_0000_0000_0000) >> 52) as u16;
        let spix = ((self.0 & 0x001F_8000_0000_0000) >> 45) as u16;
        let pix = ((self.0 & 0x0000_7000_0000_0000) >> 44) as u16;
        (dcol + pix / 4, spix + (pix & 0x3))
    }

    /// 14-bit coarse time of arrival.
    #[inline]
    #[must_use]
    pub fn toa(self) -> u16 {
        ((self.0 >> 30) & 0x3FFF) as u16
    }

    /// 10-bit time over threshold in coarse ticks.
    #[inline]
    #[must_use]
    pub fn tot(self) -> u16 {
        ((self.0 >> 20) & 0x3FF) as u16
    }

    /// 4-bit fine time of arrival.
    #[inline]
    #[must_use]
    pub fn fine_toa(self) -> u8 {
        ((self.0 >> 16) & 0xF) as u8
    }

    /// 16-bit SPIDR time (also the payload of global timestamp words).
    #[inline]
    #[must_use]
    pub fn spidr_time(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Pixel arrival time in nanoseconds.
    ///
    /// The fine ToA counts down, so it is inverted before being appended to
    /// the coarse ToA as the low four bits of a 1.5625 ns counter.
    #[inline]
    #[must_use]
    pub fn pixel_toa_ns(self) -> f64 {
        let ctoa = (u64::from(self.toa()) << 4) | (u64::from(!self.fine_toa()) & 0xF);
        let spidr = u64::from(self.spidr_time());
        (spidr * 16384) as f64 * COARSE_TICK_NS + ctoa as f64 * COARSE_TICK_NS / 16.0
    }

    /// Pixel time over threshold in nanoseconds.
    #[inline]
    #[must_use]
    pub fn pixel_tot_ns(self) -> f64 {
        f64::from(self.tot()) * COARSE_TICK_NS
    }

    // ---- TDC (0x6) ----

    /// TDC channel and edge, or `None` for an undocumented subtype.
    #[inline]
    #[must_use]
    pub fn tdc_edge(self) -> Option<TdcEdge> {
        match (self.0 >> 56) & 0xF {
            0xF => Some(TdcEdge::Tdc1Rising),
            0xA => Some(TdcEdge::Tdc1Falling),
            0xE => Some(TdcEdge::Tdc2Rising),
            0xB => Some(TdcEdge::Tdc2Falling),
            _ => None,
        }
    }

    /// 32-bit TDC coarse timestamp in 25 ns ticks.
    #[inline]
    #[must_use]
    pub fn tdc_coarse(self) -> u32 {
        ((self.0 >> 12) & 0xFFFF_FFFF) as u32
    }

    /// 12-bit TDC fine time in units of 25/4096 ns.
    #[inline]
    #[must_use]
    pub fn tdc_fine(self) -> u32 {
        let stamp = ((self.0 >> 5) & 0xF) as u32;
        let fine = (stamp.wrapping_sub(1) << 9) / 12;
        ((self.0 & 0xE00) as u32) | (fine & 0x1FF)
    }

    /// TDC trigger time in nanoseconds.
    #[inline]
    #[must_use]
    pub fn tdc_toa_ns(self) -> f64 {
        f64::from(self.tdc_coarse()) * COARSE_TICK_NS
            + f64::from(self.tdc_fine()) * (COARSE_TICK_NS / 4096.0)
    }

    // ---- global timestamp (0x4) ----

    /// Which half of the 48-bit global counter this word carries.
    #[inline]
    #[must_use]
    pub fn gts_word(self) -> GtsWord {
        match (self.0 >> 56) & 0xFF {
            0x44 => GtsWord::Low,
            0x45 => GtsWord::High,
            _ => GtsWord::Other,
        }
    }

    /// Lower 32 bits of the global counter (low word).
    #[inline]
    #[must_use]
    pub fn gts_low(self) -> u32 {
        ((self.0 >> 16) & 0xFFFF_FFFF) as u32
    }

    /// Upper 16 bits of the global counter (high word).
    #[inline]
    #[must_use]
    pub fn gts_high(self) -> u16 {
        ((self.0 >> 16) & 0xFFFF) as u16
    }
}

/// Helpers that assemble raw words for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod build {
    use super::Tpx3Packet;

    /// Chunk header for `chip` announcing `size_bytes` of payload.
    #[must_use]
    pub fn header(chip: u8, size_bytes: u16) -> u64 {
        Tpx3Packet::TPX3_HEADER_MAGIC | (u64::from(chip) << 32) | (u64::from(size_bytes) << 48)
    }

    /// Pixel hit at chip-local `(x, y)`.
    ///
    /// `x` must be below 256 and `y` below 256.
    #[must_use]
    pub fn pixel(x: u16, y: u16, toa: u16, ftoa: u8, tot: u16, spidr: u16) -> u64 {
        let dcol = u64::from(x & !1);
        let spix = u64::from(y & !3);
        let pix = u64::from((x & 1) * 4 + (y & 3));
        (0xB << 60)
            | (dcol << 52)
            | (spix << 45)
            | (pix << 44)
            | (u64::from(toa & 0x3FFF) << 30)
            | (u64::from(tot & 0x3FF) << 20)
            | (u64::from(ftoa & 0xF) << 16)
            | u64::from(spidr)
    }

    /// TDC word with the given subtype nibble and coarse stamp.
    #[must_use]
    pub fn tdc(subtype: u8, coarse: u32, fine_stamp: u8) -> u64 {
        (0x6 << 60)
            | (u64::from(subtype & 0xF) << 56)
            | (u64::from(coarse) << 12)
            | (u64::from(fine_stamp & 0xF) << 5)
    }

    /// Global timestamp word with sub-byte `kind` (0x44 or 0x45).
    #[must_use]
    pub fn gts(kind: u8, value: u32) -> u64 {
        (u64::from(kind) << 56) | (u64::from(value) << 16)
    }

    /// SPIDR control word with the given subtype nibble.
    #[must_use]
    pub fn spidr_control(subtype: u8) -> u64 {
        (0x5 << 60) | (u64::from(subtype & 0xF) << 56)
    }

    /// Serialises words into little-endian bytes.
    #[must_use]
    pub fn to_bytes(words: &[u64]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    /// A chunk header followed by `payload`.
    ///
    /// Payloads larger than the 16-bit size field saturate it, which yields a
    /// malformed chunk.
    #[must_use]
    pub fn chunk(chip: u8, payload: &[u64]) -> Vec<u64> {
        let size = u16::try_from(payload.len() * 8).unwrap_or(u16::MAX);
        let mut words = Vec::with_capacity(payload.len() + 1);
        words.push(header(chip, size));
        words.extend_from_slice(payload);
        words
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::build;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_header_fields() {
        let p = Tpx3Packet::new(build::header(3, 0x1F8) | (0x02 << 40));
        assert!(p.is_header());
        assert_eq!(p.chip_id(), 3);
        assert_eq!(p.readout_mode(), 2);
        assert_eq!(p.chunk_size(), 0x1F8);
        assert!(!Tpx3Packet::new(build::tdc(0xF, 1, 1)).is_header());
    }

    #[test]
    fn test_pixel_coordinates_roundtrip_layout() {
        for (x, y) in [(0, 0), (1, 3), (10, 10), (11, 10), (255, 255), (128, 67)] {
            let p = Tpx3Packet::new(build::pixel(x, y, 0, 0, 0, 0));
            assert_eq!(p.packet_type(), PacketType::PixelHit);
            assert_eq!(p.pixel_coordinates(), (x, y));
        }
    }

    #[test]
    fn test_pixel_timing() {
        // toa=100, ftoa=15 -> ctoa = 1600 | 0 = 1600, spidr=2
        let p = Tpx3Packet::new(build::pixel(5, 5, 100, 15, 40, 2));
        assert_eq!(p.toa(), 100);
        assert_eq!(p.fine_toa(), 15);
        assert_eq!(p.tot(), 40);
        assert_eq!(p.spidr_time(), 2);
        let expected = 2.0 * 25.0 * 16384.0 + 1600.0 * 25.0 / 16.0;
        assert_relative_eq!(p.pixel_toa_ns(), expected);
        assert_eq!(p.pixel_tot_ns(), 1000.0);

        // ftoa=0 inverts to 15
        let p = Tpx3Packet::new(build::pixel(5, 5, 100, 0, 40, 0));
        assert_relative_eq!(p.pixel_toa_ns(), 1615.0 * 25.0 / 16.0);
    }

    #[test]
    fn test_tdc_fields() {
        let p = Tpx3Packet::new(build::tdc(0xF, 1000, 1));
        assert_eq!(p.packet_type(), PacketType::Tdc);
        assert_eq!(p.tdc_edge(), Some(TdcEdge::Tdc1Rising));
        assert_eq!(p.tdc_coarse(), 1000);
        // stamp 1 -> fine 0
        assert_eq!(p.tdc_fine(), 0);
        assert_relative_eq!(p.tdc_toa_ns(), 25_000.0);

        let p = Tpx3Packet::new(build::tdc(0xE, 0, 4));
        assert_eq!(p.tdc_edge(), Some(TdcEdge::Tdc2Rising));
        // ((4 - 1) << 9) / 12 = 128, bits 9..11 of the raw word carry stamp bits
        assert_eq!(p.tdc_fine(), (p.raw() & 0xE00) as u32 | 128);

        assert_eq!(Tpx3Packet::new(build::tdc(0xA, 0, 1)).tdc_edge(), Some(TdcEdge::Tdc1Falling));
        assert_eq!(Tpx3Packet::new(build::tdc(0xB, 0, 1)).tdc_edge(), Some(TdcEdge::Tdc2Falling));
        assert_eq!(Tpx3Packet::new(build::tdc(0x3, 0, 1)).tdc_edge(), None);
    }

    #[test]
    fn test_gts_fields() {
        let low = Tpx3Packet::new(build::gts(0x44, 0xDEAD_BEEF));
        assert_eq!(low.packet_type(), PacketType::GlobalTime);
        assert_eq!(low.gts_word(), GtsWord::Low);
        assert_eq!(low.gts_low(), 0xDEAD_BEEF);

        let high = Tpx3Packet::new(build::gts(0x45, 0x1234));
        assert_eq!(high.gts_word(), GtsWord::High);
        assert_eq!(high.gts_high(), 0x1234);
    }

    #[test]
    fn test_other_types() {
        assert_eq!(
            Tpx3Packet::new(build::spidr_control(0xF)).packet_type(),
            PacketType::SpidrControl
        );
        assert_eq!(
            Tpx3Packet::new(0xA000_0000_0000_0000).packet_type(),
            PacketType::Other(0xA)
        );
    }

    #[test]
    fn test_read_words() {
        let bytes = build::to_bytes(&[1, 2]);
        assert_eq!(Tpx3Packet::read(&bytes, 1).map(Tpx3Packet::raw), Some(2));
        assert_eq!(Tpx3Packet::read(&bytes, 2), None);
    }
}
