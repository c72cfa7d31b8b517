//! Signal record types shared by the decoder, sorter and clusterer.

use serde::{Deserialize, Serialize};

/// Group id carried by pixel hits that are noise or were never clustered.
pub const UNCLUSTERED: i32 = -1;

/// Group id carried by records that never take part in clustering.
pub const NOT_CLUSTERABLE: i32 = -2;

/// Category of a decoded packet.
///
/// The discriminants are the codes written to raw signal dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum SignalType {
    /// Unrecognised packet, kept so it can be counted and dumped.
    #[default]
    Unknown = 0,
    /// Time-to-digital converter trigger.
    Tdc = 1,
    /// Pixel hit with coordinates, ToA and ToT.
    PixelHit = 2,
    /// Global timestamp word.
    GlobalTimestamp = 3,
    /// SPIDR or TPX3 control packet.
    Control = 4,
}

impl SignalType {
    /// Wire code written to raw signal dumps.
    #[inline]
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Inverse of [`SignalType::code`]. Unknown codes map to `Unknown`.
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Tdc,
            2 => Self::PixelHit,
            3 => Self::GlobalTimestamp,
            4 => Self::Control,
            _ => Self::Unknown,
        }
    }

    /// Short lowercase label used in CSV output.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Tdc => "tdc",
            Self::PixelHit => "pixel",
            Self::GlobalTimestamp => "gts",
            Self::Control => "control",
        }
    }
}

/// One decoded packet.
///
/// `toa` is in seconds and `tot` in nanoseconds. `x`/`y` are only
/// meaningful for pixel hits and are zero otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub signal_type: SignalType,
    pub x: u16,
    pub y: u16,
    pub toa: f64,
    pub tot: f64,
    /// 1-based number of the chunk this record was decoded from.
    pub buffer: u32,
    pub chip: u8,
    pub group_id: i32,
}

impl SignalRecord {
    /// Creates a pixel hit record, not yet clustered.
    #[must_use]
    pub fn pixel(x: u16, y: u16, toa: f64, tot: f64) -> Self {
        Self {
            signal_type: SignalType::PixelHit,
            x,
            y,
            toa,
            tot,
            buffer: 0,
            chip: 0,
            group_id: UNCLUSTERED,
        }
    }

    /// Creates a non-pixel record of the given type.
    #[must_use]
    pub fn timing(signal_type: SignalType, toa: f64, tot: f64) -> Self {
        Self {
            signal_type,
            x: 0,
            y: 0,
            toa,
            tot,
            buffer: 0,
            chip: 0,
            group_id: if signal_type == SignalType::PixelHit {
                UNCLUSTERED
            } else {
                NOT_CLUSTERABLE
            },
        }
    }

    /// Sets the chunk number and chip id.
    #[must_use]
    pub fn with_origin(mut self, buffer: u32, chip: u8) -> Self {
        self.buffer = buffer;
        self.chip = chip;
        self
    }

    /// Returns true for pixel hits.
    #[inline]
    #[must_use]
    pub fn is_pixel(&self) -> bool {
        self.signal_type == SignalType::PixelHit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_type_codes() {
        for ty in [
            SignalType::Unknown,
            SignalType::Tdc,
            SignalType::PixelHit,
            SignalType::GlobalTimestamp,
            SignalType::Control,
        ] {
            assert_eq!(SignalType::from_code(ty.code()), ty);
        }
        assert_eq!(SignalType::from_code(0xFF), SignalType::Unknown);
    }

    #[test]
    fn test_record_group_defaults() {
        assert_eq!(SignalRecord::pixel(1, 2, 0.0, 25.0).group_id, UNCLUSTERED);
        assert_eq!(
            SignalRecord::timing(SignalType::Tdc, 1.0, 0.0).group_id,
            NOT_CLUSTERABLE
        );
    }
}
