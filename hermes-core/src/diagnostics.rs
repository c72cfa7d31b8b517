//! Per-file packet accounting and stage timings.
//!
//! A [`FileDiagnostics`] value is threaded through decode, sort, cluster and
//! write. Batch totals are built with [`FileDiagnostics::merge`], which is
//! plain field-wise addition and therefore order independent.
#![allow(clippy::cast_precision_loss)]

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;
use std::time::Duration;

/// Packet counts per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketCounts {
    /// `TPX3` chunk headers.
    pub buffers: u64,
    pub tdc1: u64,
    pub tdc2: u64,
    pub pixel: u64,
    pub gts: u64,
    /// SPIDR and TPX3 control packets.
    pub control: u64,
    /// Recognised framing but unrecognised payload.
    pub unknown: u64,
}

impl PacketCounts {
    /// Sum over every category.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.buffers + self.tdc1 + self.tdc2 + self.pixel + self.gts + self.control + self.unknown
    }
}

impl AddAssign for PacketCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.buffers += rhs.buffers;
        self.tdc1 += rhs.tdc1;
        self.tdc2 += rhs.tdc2;
        self.pixel += rhs.pixel;
        self.gts += rhs.gts;
        self.control += rhs.control;
        self.unknown += rhs.unknown;
    }
}

/// Pipeline stage, for timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unpack,
    Sort,
    Cluster,
    Write,
}

/// Elapsed wall time per stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    #[serde(with = "duration_secs")]
    pub unpack: Duration,
    #[serde(with = "duration_secs")]
    pub sort: Duration,
    #[serde(with = "duration_secs")]
    pub cluster: Duration,
    #[serde(with = "duration_secs")]
    pub write: Duration,
}

impl StageTimings {
    /// Adds `elapsed` to the given stage.
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        let slot = match stage {
            Stage::Unpack => &mut self.unpack,
            Stage::Sort => &mut self.sort,
            Stage::Cluster => &mut self.cluster,
            Stage::Write => &mut self.write,
        };
        *slot += elapsed;
    }

    /// Sum over every stage.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.unpack + self.sort + self.cluster + self.write
    }
}

impl AddAssign for StageTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.unpack += rhs.unpack;
        self.sort += rhs.sort;
        self.cluster += rhs.cluster;
        self.write += rhs.write;
    }
}

/// Diagnostics for one file, or the sum over a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiagnostics {
    /// Number of files folded into this value.
    pub files: u64,
    /// Input size in bytes.
    pub file_size: u64,
    /// Every 64-bit word examined, chunk headers included.
    pub total_packets: u64,
    pub counts: PacketCounts,
    /// Chunks skipped because their framing was inconsistent.
    pub malformed_buffers: u64,
    /// Photons produced by clustering.
    pub photons: u64,
    pub timings: StageTimings,
}

impl FileDiagnostics {
    /// Diagnostics for a single file of `file_size` bytes.
    #[must_use]
    pub fn for_file(file_size: u64) -> Self {
        Self {
            files: 1,
            file_size,
            ..Self::default()
        }
    }

    /// Packets examined but not attributed to any category.
    ///
    /// # Errors
    /// Returns [`Error::InternalConsistency`] when the categories add up to
    /// more packets than were examined.
    pub fn unprocessed(&self) -> Result<u64> {
        let categorised = self.counts.total();
        self.total_packets.checked_sub(categorised).ok_or_else(|| {
            Error::InternalConsistency(format!(
                "{categorised} categorised packets exceed {} examined",
                self.total_packets
            ))
        })
    }

    /// Folds `other` into `self`.
    pub fn merge(&mut self, other: &FileDiagnostics) {
        self.files += other.files;
        self.file_size += other.file_size;
        self.total_packets += other.total_packets;
        self.counts += other.counts;
        self.malformed_buffers += other.malformed_buffers;
        self.photons += other.photons;
        self.timings += other.timings;
    }

    /// Serializable report including the derived unprocessed count.
    ///
    /// # Errors
    /// Propagates [`FileDiagnostics::unprocessed`].
    pub fn report(&self) -> Result<DiagnosticsReport<'_>> {
        Ok(DiagnosticsReport {
            diagnostics: self,
            unprocessed: self.unprocessed()?,
        })
    }
}

/// Machine-readable view of a [`FileDiagnostics`].
#[derive(Debug, Serialize)]
pub struct DiagnosticsReport<'a> {
    #[serde(flatten)]
    pub diagnostics: &'a FileDiagnostics,
    pub unprocessed: u64,
}

impl fmt::Display for FileDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counts;
        let t = &self.timings;
        writeln!(f, "files:              {}", self.files)?;
        writeln!(
            f,
            "file size:          {:.3} MB",
            self.file_size as f64 / 1_048_576.0
        )?;
        writeln!(f, "total packets:      {}", self.total_packets)?;
        writeln!(f, "  buffers:          {}", c.buffers)?;
        writeln!(f, "  tdc1:             {}", c.tdc1)?;
        writeln!(f, "  tdc2:             {}", c.tdc2)?;
        writeln!(f, "  pixel hits:       {}", c.pixel)?;
        writeln!(f, "  global time:      {}", c.gts)?;
        writeln!(f, "  control:          {}", c.control)?;
        writeln!(f, "  unknown:          {}", c.unknown)?;
        match self.unprocessed() {
            Ok(n) => writeln!(f, "  unprocessed:      {n}")?,
            Err(e) => writeln!(f, "  unprocessed:      INVALID ({e})")?,
        }
        writeln!(f, "malformed buffers:  {}", self.malformed_buffers)?;
        writeln!(f, "photons:            {}", self.photons)?;
        writeln!(f, "unpack time:        {:.6} s", t.unpack.as_secs_f64())?;
        writeln!(f, "sort time:          {:.6} s", t.sort.as_secs_f64())?;
        writeln!(f, "cluster time:       {:.6} s", t.cluster.as_secs_f64())?;
        write!(f, "write time:         {:.6} s", t.write.as_secs_f64())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
