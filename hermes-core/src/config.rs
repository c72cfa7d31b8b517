//! Processing configuration, parsing and validation.
//!
//! Parsing never silently substitutes a default: every fallback is returned
//! as a [`Setting::Fallback`] or [`ConfigWarning`] so callers can log it.
#![allow(clippy::missing_errors_doc, clippy::doc_markdown)]

use crate::error::{Error, Result};
use crate::extraction::AggregationConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default temporal neighbourhood radius in seconds (500 ns).
pub const DEFAULT_EPS_TEMPORAL: f64 = 500.0e-9;
/// Default verbosity level.
pub const DEFAULT_VERBOSE_LEVEL: u8 = 1;
/// Highest accepted verbosity level.
pub const MAX_VERBOSE_LEVEL: u8 = 3;

/// Strategy used by the temporal sorter. Both produce identical output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortStrategy {
    /// One stable sort over the whole file.
    #[default]
    Global,
    /// Stable sort per chunk, then a k-way merge.
    BufferMerge,
}

/// Encoding of the raw signal and photon files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Packed little-endian records.
    #[default]
    Binary,
    /// Comma separated text with a header row.
    Csv,
}

/// Chip arrangement used to map chip-local to global coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutPreset {
    /// Single chip, coordinates used as-is.
    #[default]
    Single,
    /// 2x2 quad detector.
    Quad,
}

impl FromStr for LayoutPreset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "quad" => Ok(Self::Quad),
            other => Err(format!("unknown layout '{other}', expected single or quad")),
        }
    }
}

/// Every knob of a processing run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Folder holding the raw `.tpx3` files.
    pub raw_tpx3_folder: PathBuf,
    /// File to process inside `raw_tpx3_folder`. `None` means every file (batch mode).
    pub raw_tpx3_file: Option<String>,
    pub output_folder: PathBuf,
    pub write_raw_signals: bool,
    pub sort_signals: bool,
    pub cluster_pixels: bool,
    pub write_out_photons: bool,
    /// 0 to 3, mapped onto log levels by the binary.
    pub verbose_level: u8,
    /// 0 means unlimited.
    pub max_packets_to_read: u64,
    /// Chebyshev radius in pixels.
    pub eps_spatial: u8,
    /// ToA radius in seconds.
    pub eps_temporal: f64,
    pub min_pts: u16,
    /// Positions scanned each way in the time-sorted pixel sequence. 0 means unbounded.
    pub query_region: u16,
    pub sort_strategy: SortStrategy,
    pub output_format: OutputFormat,
    pub layout: LayoutPreset,
    pub aggregation: AggregationConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            raw_tpx3_folder: PathBuf::from("."),
            raw_tpx3_file: None,
            output_folder: PathBuf::from("."),
            write_raw_signals: true,
            sort_signals: true,
            cluster_pixels: false,
            write_out_photons: false,
            verbose_level: DEFAULT_VERBOSE_LEVEL,
            max_packets_to_read: 0,
            eps_spatial: 2,
            eps_temporal: DEFAULT_EPS_TEMPORAL,
            min_pts: 3,
            query_region: 0,
            sort_strategy: SortStrategy::default(),
            output_format: OutputFormat::default(),
            layout: LayoutPreset::default(),
            aggregation: AggregationConfig::default(),
        }
    }
}

/// Outcome of parsing one setting.
#[derive(Clone, Debug, PartialEq)]
pub enum Setting<T> {
    /// The raw text parsed cleanly.
    Parsed(T),
    /// The raw text was rejected and `value` is the default to use instead.
    Fallback { value: T, reason: String },
}

impl<T> Setting<T> {
    /// The value to apply, whichever way it was obtained.
    pub fn into_value(self) -> T {
        match self {
            Self::Parsed(value) | Self::Fallback { value, .. } => value,
        }
    }

    /// Reason for the fallback, if any.
    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Self::Parsed(_) => None,
            Self::Fallback { reason, .. } => Some(reason),
        }
    }
}

impl<T: FromStr> Setting<T>
where
    T::Err: fmt::Display,
{
    /// Parses `raw`, keeping `default` when it does not parse.
    pub fn parse(raw: &str, default: T) -> Self {
        match raw.trim().parse::<T>() {
            Ok(value) => Self::Parsed(value),
            Err(e) => Self::Fallback {
                value: default,
                reason: format!("invalid value '{}': {e}", raw.trim()),
            },
        }
    }
}

/// A setting that was ignored, defaulted or clamped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigWarning {
    pub key: String,
    pub message: String,
}

impl ConfigWarning {
    #[must_use]
    pub fn new(key: &str, message: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

impl ProcessingConfig {
    /// True when every `.tpx3` file of the folder is processed.
    #[must_use]
    pub fn batch_mode(&self) -> bool {
        self.raw_tpx3_file.is_none()
    }

    /// Parses the `key = value` text format.
    ///
    /// Blank lines and lines containing `#` are skipped. Unknown keys and
    /// unparsable values produce warnings and leave the default in place.
    #[must_use]
    pub fn from_key_value_str(text: &str) -> (Self, Vec<ConfigWarning>) {
        let mut config = Self::default();
        let mut warnings = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.contains('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warnings.push(ConfigWarning::new(line, "expected 'key = value'"));
                continue;
            };
            if let Some(warning) = config.apply_setting(key.trim(), value.trim()) {
                warnings.push(warning);
            }
        }
        (config, warnings)
    }

    /// Parses a JSON document. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Applies one `key = value` pair.
    pub fn apply_setting(&mut self, key: &str, value: &str) -> Option<ConfigWarning> {
        fn take<T>(slot: &mut T, setting: Setting<T>, key: &str) -> Option<ConfigWarning> {
            let warning = setting
                .fallback_reason()
                .map(|reason| ConfigWarning::new(key, format!("{reason}, keeping default")));
            let value = setting.into_value();
            *slot = value;
            warning
        }

        let defaults = Self::default();
        match key {
            "rawTPX3Folder" => {
                self.raw_tpx3_folder = PathBuf::from(value);
                None
            }
            "rawTPX3File" => {
                self.raw_tpx3_file = match value {
                    "" | "ALL" | "all" => None,
                    name => Some(name.to_string()),
                };
                None
            }
            "outputFolder" => {
                self.output_folder = PathBuf::from(value);
                None
            }
            "writeRawSignals" => take(
                &mut self.write_raw_signals,
                Setting::parse(value, defaults.write_raw_signals),
                key,
            ),
            "sortSignals" => take(
                &mut self.sort_signals,
                Setting::parse(value, defaults.sort_signals),
                key,
            ),
            "clusterPixels" => take(
                &mut self.cluster_pixels,
                Setting::parse(value, defaults.cluster_pixels),
                key,
            ),
            "writeOutPhotons" => take(
                &mut self.write_out_photons,
                Setting::parse(value, defaults.write_out_photons),
                key,
            ),
            "verboseLevel" => take(
                &mut self.verbose_level,
                Setting::parse(value, defaults.verbose_level),
                key,
            ),
            "maxPacketsToRead" => take(
                &mut self.max_packets_to_read,
                Setting::parse(value, defaults.max_packets_to_read),
                key,
            ),
            "epsSpatial" => take(
                &mut self.eps_spatial,
                Setting::parse(value, defaults.eps_spatial),
                key,
            ),
            "epsTemporal" => take(
                &mut self.eps_temporal,
                Setting::parse(value, defaults.eps_temporal),
                key,
            ),
            "minPts" => take(
                &mut self.min_pts,
                Setting::parse(value, defaults.min_pts),
                key,
            ),
            "queryRegion" => take(
                &mut self.query_region,
                Setting::parse(value, defaults.query_region),
                key,
            ),
            "layout" => take(&mut self.layout, Setting::parse(value, defaults.layout), key),
            _ => Some(ConfigWarning::new(key, "unknown configuration key, ignored")),
        }
    }

    /// Clamps out-of-range values and reports every adjustment.
    #[must_use]
    pub fn validated(mut self) -> (Self, Vec<ConfigWarning>) {
        let mut warnings = Vec::new();

        if self.min_pts == 0 {
            self.min_pts = 1;
            warnings.push(ConfigWarning::new("minPts", "0 is not allowed, clamped to 1"));
        }

        if self.eps_temporal.is_nan() || self.eps_temporal.is_infinite() {
            warnings.push(ConfigWarning::new(
                "epsTemporal",
                format!(
                    "{} is not finite, using default {DEFAULT_EPS_TEMPORAL}",
                    self.eps_temporal
                ),
            ));
            self.eps_temporal = DEFAULT_EPS_TEMPORAL;
        } else if self.eps_temporal < 0.0 {
            warnings.push(ConfigWarning::new(
                "epsTemporal",
                format!("{} is negative, clamped to 0", self.eps_temporal),
            ));
            self.eps_temporal = 0.0;
        }

        if self.verbose_level > MAX_VERBOSE_LEVEL {
            warnings.push(ConfigWarning::new(
                "verboseLevel",
                format!(
                    "{} outside 0..={MAX_VERBOSE_LEVEL}, using default {DEFAULT_VERBOSE_LEVEL}",
                    self.verbose_level
                ),
            ));
            self.verbose_level = DEFAULT_VERBOSE_LEVEL;
        }

        if self.write_out_photons && !self.cluster_pixels {
            warnings.push(ConfigWarning::new(
                "writeOutPhotons",
                "photons require clusterPixels, no photon file will be written",
            ));
        }

        (self, warnings)
    }
}
