//! Output writers.
//!
//! Binary layouts are little-endian and fixed-size:
//! - raw signal: `buffer u32, signal_type u8, chip u8, x u16, y u16, toa f64, tot f64, group_id i32`
//! - photon: `x f64, y f64, toa f64, tot f64, multiplicity u32, group_id i32, duration f64`

use crate::Result;
use hermes_core::{OutputFormat, PhotonEvent, SignalBatch};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Bytes per record in a binary raw signal file.
pub const RAW_SIGNAL_RECORD_BYTES: usize = 30;
/// Bytes per record in a binary photon file.
pub const PHOTON_RECORD_BYTES: usize = 48;
/// File name of the summed report written by batch runs.
pub const BATCH_DIAGNOSTICS_FILE: &str = "batch.diagnostics.json";

/// Output file names derived from one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub raw_signals: PathBuf,
    pub photons: PathBuf,
    pub diagnostics: PathBuf,
}

impl OutputPaths {
    /// `<stem>.rawsignals`, `<stem>.photons` (or their `.csv` forms) and
    /// `<stem>.diagnostics.json` inside `output_folder`.
    #[must_use]
    pub fn for_input(output_folder: &Path, input: &Path, format: OutputFormat) -> Self {
        let stem = input
            .file_stem()
            .map_or_else(|| "output".to_string(), |s| s.to_string_lossy().into_owned());
        let (raw, photons) = match format {
            OutputFormat::Binary => (
                format!("{stem}.rawsignals"),
                format!("{stem}.photons"),
            ),
            OutputFormat::Csv => (
                format!("{stem}.rawsignals.csv"),
                format!("{stem}.photons.csv"),
            ),
        };
        Self {
            raw_signals: output_folder.join(raw),
            photons: output_folder.join(photons),
            diagnostics: output_folder.join(format!("{stem}.diagnostics.json")),
        }
    }
}

/// Buffered writer for processed output.
pub struct OutputWriter {
    writer: BufWriter<File>,
}

impl OutputWriter {
    /// Creates a new file writer.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes every signal in `format`.
    pub fn write_signals(&mut self, signals: &SignalBatch, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Binary => self.write_signals_binary(signals),
            OutputFormat::Csv => self.write_signals_csv(signals),
        }
    }

    /// Writes every photon in `format`.
    pub fn write_photons(&mut self, photons: &[PhotonEvent], format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Binary => self.write_photons_binary(photons),
            OutputFormat::Csv => self.write_photons_csv(photons),
        }
    }

    /// Writes signals as binary data, [`RAW_SIGNAL_RECORD_BYTES`] per record.
    pub fn write_signals_binary(&mut self, signals: &SignalBatch) -> Result<()> {
        signals.check_columns()?;
        for s in signals.records() {
            self.writer.write_all(&s.buffer.to_le_bytes())?;
            self.writer.write_all(&[s.signal_type.code(), s.chip])?;
            self.writer.write_all(&s.x.to_le_bytes())?;
            self.writer.write_all(&s.y.to_le_bytes())?;
            self.writer.write_all(&s.toa.to_le_bytes())?;
            self.writer.write_all(&s.tot.to_le_bytes())?;
            self.writer.write_all(&s.group_id.to_le_bytes())?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes signals as CSV.
    pub fn write_signals_csv(&mut self, signals: &SignalBatch) -> Result<()> {
        signals.check_columns()?;
        writeln!(self.writer, "buffer,type,chip,x,y,toa,tot,group_id")?;

        for s in signals.records() {
            writeln!(
                self.writer,
                "{},{},{},{},{},{},{},{}",
                s.buffer,
                s.signal_type.label(),
                s.chip,
                s.x,
                s.y,
                s.toa,
                s.tot,
                s.group_id
            )?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes photons as binary data, [`PHOTON_RECORD_BYTES`] per record.
    pub fn write_photons_binary(&mut self, photons: &[PhotonEvent]) -> Result<()> {
        for p in photons {
            self.writer.write_all(&p.x.to_le_bytes())?;
            self.writer.write_all(&p.y.to_le_bytes())?;
            self.writer.write_all(&p.toa.to_le_bytes())?;
            self.writer.write_all(&p.tot.to_le_bytes())?;
            self.writer.write_all(&p.multiplicity.to_le_bytes())?;
            self.writer.write_all(&p.group_id.to_le_bytes())?;
            self.writer.write_all(&p.duration.to_le_bytes())?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes photons as CSV.
    pub fn write_photons_csv(&mut self, photons: &[PhotonEvent]) -> Result<()> {
        writeln!(
            self.writer,
            "x,y,toa,tot,multiplicity,group_id,x_extent,y_extent,duration"
        )?;

        for p in photons {
            writeln!(
                self.writer,
                "{},{},{},{},{},{},{},{},{}",
                p.x, p.y, p.toa, p.tot, p.multiplicity, p.group_id, p.x_extent, p.y_extent, p.duration
            )?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes any serializable report as pretty JSON.
    pub fn write_json<T: Serialize>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, value)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_core::{SignalRecord, SignalType};
    use tempfile::NamedTempFile;

    fn photon() -> PhotonEvent {
        PhotonEvent {
            x: 1.5,
            y: 2.5,
            toa: 1.0e-6,
            tot: 100.0,
            multiplicity: 5,
            group_id: 0,
            x_extent: 1,
            y_extent: 2,
            duration: 2.0e-8,
        }
    }

    fn signals() -> SignalBatch {
        SignalBatch::from_records(&[
            SignalRecord::pixel(3, 4, 1.0e-6, 50.0).with_origin(2, 1),
            SignalRecord::timing(SignalType::Tdc, 2.0e-6, 0.0).with_origin(2, 1),
        ])
    }

    #[test]
    fn test_output_paths() {
        let paths = OutputPaths::for_input(
            Path::new("/out"),
            Path::new("/in/run_7.tpx3"),
            OutputFormat::Binary,
        );
        assert_eq!(paths.raw_signals, PathBuf::from("/out/run_7.rawsignals"));
        assert_eq!(paths.photons, PathBuf::from("/out/run_7.photons"));
        assert_eq!(
            paths.diagnostics,
            PathBuf::from("/out/run_7.diagnostics.json")
        );

        let csv = OutputPaths::for_input(Path::new("o"), Path::new("a.tpx3"), OutputFormat::Csv);
        assert_eq!(csv.photons, PathBuf::from("o/a.photons.csv"));
    }

    #[test]
    fn test_write_signals_binary() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = OutputWriter::create(file.path()).unwrap();
        writer.write_signals_binary(&signals()).unwrap();

        let data = std::fs::read(file.path()).unwrap();
        assert_eq!(data.len(), 2 * RAW_SIGNAL_RECORD_BYTES);
        assert_eq!(&data[0..4], &2u32.to_le_bytes());
        assert_eq!(data[4], SignalType::PixelHit.code());
        assert_eq!(data[5], 1);
        assert_eq!(&data[6..8], &3u16.to_le_bytes());
        assert_eq!(&data[26..30], &(-1i32).to_le_bytes());
        assert_eq!(&data[56..60], &(-2i32).to_le_bytes());
    }

    #[test]
    fn test_write_signals_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = OutputWriter::create(file.path()).unwrap();
        writer.write_signals(&signals(), OutputFormat::Csv).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "buffer,type,chip,x,y,toa,tot,group_id");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("2,pixel,1,3,4,"));
        assert!(lines[2].ends_with(",-2"));
    }

    #[test]
    fn test_write_photons_binary() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = OutputWriter::create(file.path()).unwrap();
        writer.write_photons_binary(&[photon()]).unwrap();

        let data = std::fs::read(file.path()).unwrap();
        assert_eq!(data.len(), PHOTON_RECORD_BYTES);
        assert_eq!(&data[0..8], &1.5f64.to_le_bytes());
        assert_eq!(&data[32..36], &5u32.to_le_bytes());
    }

    #[test]
    fn test_write_photons_csv() {
        let file = NamedTempFile::new().unwrap();
        let mut writer = OutputWriter::create(file.path()).unwrap();
        writer.write_photons(&[photon()], OutputFormat::Csv).unwrap();

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("x,y,toa,tot,multiplicity,group_id,x_extent,y_extent,duration"));
        assert!(content.contains("1.5,2.5,0.000001,100,5,0,1,2,"));
    }
}
