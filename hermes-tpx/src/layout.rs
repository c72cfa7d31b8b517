//! Chip-local to global detector coordinates.
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::error::{Error, Result};
use hermes_core::LayoutPreset;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Pixels per chip edge.
pub const CHIP_SIZE: u16 = 256;

/// Gap-inclusive offset between chips in the quad arrangement.
pub const QUAD_CHIP_PITCH: i32 = 260;

/// Affine transformation for chip coordinate mapping.
///
/// Formula:
/// global_x = a * local_x + b * local_y + tx
/// global_y = c * local_x + d * local_y + ty
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipTransform {
    pub a: i32,
    pub b: i32,
    pub c: i32,
    pub d: i32,
    pub tx: i32,
    pub ty: i32,
}

impl ChipTransform {
    /// Create an identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self::translation(0, 0)
    }

    /// Pure translation.
    #[must_use]
    pub fn translation(tx: i32, ty: i32) -> Self {
        Self {
            a: 1,
            b: 0,
            c: 0,
            d: 1,
            tx,
            ty,
        }
    }

    /// 180 degree rotation followed by a translation.
    #[must_use]
    pub fn rotated_half_turn(tx: i32, ty: i32) -> Self {
        Self {
            a: -1,
            b: 0,
            c: 0,
            d: -1,
            tx,
            ty,
        }
    }

    /// Apply transform to local coordinates.
    ///
    /// Only meaningful for transforms accepted by [`ChipTransform::validate_bounds`].
    #[inline]
    #[must_use]
    pub fn apply(&self, x: u16, y: u16) -> (u16, u16) {
        let x = i32::from(x);
        let y = i32::from(y);
        let gx = self.a * x + self.b * y + self.tx;
        let gy = self.c * x + self.d * y + self.ty;
        (gx as u16, gy as u16)
    }

    /// Checks that every input in `[0, chip_size)` maps into the u16 range.
    ///
    /// Affine maps reach their extremes at the corners, so only those are tested.
    ///
    /// # Errors
    /// Returns a description of the first offending corner.
    pub fn validate_bounds(&self, chip_size: u16) -> std::result::Result<(), String> {
        let max_coord = i32::from(chip_size.saturating_sub(1));
        let corners = [
            (0, 0),
            (max_coord, 0),
            (0, max_coord),
            (max_coord, max_coord),
        ];

        for (x, y) in corners {
            let gx = self.a * x + self.b * y + self.tx;
            let gy = self.c * x + self.d * y + self.ty;
            for (axis, value) in [("x", gx), ("y", gy)] {
                if !(0..=i32::from(u16::MAX)).contains(&value) {
                    return Err(format!(
                        "out-of-bounds {axis}={value} for input ({x}, {y})"
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Per-chip transforms for a detector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorLayout {
    /// Chip size in pixels.
    pub chip_size: u16,
    /// Transform per chip id. Chips beyond the list use identity.
    pub chip_transforms: Vec<ChipTransform>,
}

impl Default for DetectorLayout {
    fn default() -> Self {
        Self::single()
    }
}

#[derive(Deserialize)]
struct JsonChipTransform {
    chip_id: u8,
    matrix: [[i32; 3]; 2],
}

#[derive(Deserialize)]
#[serde(default)]
struct JsonLayout {
    chip_size: u16,
    chip_transformations: Vec<JsonChipTransform>,
}

impl Default for JsonLayout {
    fn default() -> Self {
        Self {
            chip_size: CHIP_SIZE,
            chip_transformations: Vec::new(),
        }
    }
}

impl DetectorLayout {
    /// Single chip: local coordinates are global coordinates.
    #[must_use]
    pub fn single() -> Self {
        Self {
            chip_size: CHIP_SIZE,
            chip_transforms: vec![ChipTransform::identity()],
        }
    }

    /// 2x2 quad detector.
    ///
    /// - Chip 0: translation (260, 0)
    /// - Chip 1: rotation 180 + translation (515, 515)
    /// - Chip 2: rotation 180 + translation (255, 515)
    /// - Chip 3: identity
    #[must_use]
    pub fn quad() -> Self {
        let far = i32::from(CHIP_SIZE) - 1 + QUAD_CHIP_PITCH;
        Self {
            chip_size: CHIP_SIZE,
            chip_transforms: vec![
                ChipTransform::translation(QUAD_CHIP_PITCH, 0),
                ChipTransform::rotated_half_turn(far, far),
                ChipTransform::rotated_half_turn(i32::from(CHIP_SIZE) - 1, far),
                ChipTransform::identity(),
            ],
        }
    }

    /// Layout for a named preset.
    #[must_use]
    pub fn from_preset(preset: LayoutPreset) -> Self {
        match preset {
            LayoutPreset::Single => Self::single(),
            LayoutPreset::Quad => Self::quad(),
        }
    }

    /// Load a layout from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let json: JsonLayout =
            serde_json::from_reader(reader).map_err(|e| Error::LayoutError(e.to_string()))?;
        Self::from_json_layout(json)
    }

    /// Load a layout from a JSON string.
    ///
    /// The schema is `{ "chip_size": 256, "chip_transformations": [{ "chip_id": 0,
    /// "matrix": [[a, b, tx], [c, d, ty]] }] }`. Missing chips use identity.
    ///
    /// # Errors
    /// Returns an error if the JSON cannot be parsed or a transform is out of range.
    pub fn from_json(json: &str) -> Result<Self> {
        let json: JsonLayout =
            serde_json::from_str(json).map_err(|e| Error::LayoutError(e.to_string()))?;
        Self::from_json_layout(json)
    }

    fn from_json_layout(json: JsonLayout) -> Result<Self> {
        let max_chip = json
            .chip_transformations
            .iter()
            .map(|t| usize::from(t.chip_id))
            .max();
        let mut chip_transforms = match max_chip {
            Some(max) => vec![ChipTransform::identity(); max + 1],
            None => vec![ChipTransform::identity()],
        };
        for t in json.chip_transformations {
            let m = t.matrix;
            chip_transforms[usize::from(t.chip_id)] = ChipTransform {
                a: m[0][0],
                b: m[0][1],
                tx: m[0][2],
                c: m[1][0],
                d: m[1][1],
                ty: m[1][2],
            };
        }

        let layout = Self {
            chip_size: json.chip_size,
            chip_transforms,
        };
        layout.validate_transforms()?;
        Ok(layout)
    }

    /// Validate all chip transforms produce valid u16 coordinates.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTransform`] for the first failing chip.
    pub fn validate_transforms(&self) -> Result<()> {
        for (chip, transform) in self.chip_transforms.iter().enumerate() {
            transform
                .validate_bounds(self.chip_size)
                .map_err(|reason| Error::InvalidTransform { chip, reason })?;
        }
        Ok(())
    }

    /// Map local chip coordinates to global detector coordinates.
    ///
    /// Chips without a transform keep their local coordinates.
    #[inline]
    #[must_use]
    pub fn map_chip_to_global(&self, chip_id: u8, x: u16, y: u16) -> (u16, u16) {
        match self.chip_transforms.get(usize::from(chip_id)) {
            Some(transform) => transform.apply(x, y),
            None => (x, y),
        }
    }
}
