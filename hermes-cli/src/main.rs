//! hermes: Timepix3 decode, sort and cluster command-line tool.
//!
//! Settings come from an optional config file (`key = value` or `.json`);
//! flags given on the command line override the file.
#![allow(clippy::struct_excessive_bools)]

use clap::{ArgGroup, Parser, ValueEnum};
use hermes_core::config::MAX_VERBOSE_LEVEL;
use hermes_core::{
    CentroidWeighting, ConfigWarning, LayoutPreset, OutputFormat, ProcessingConfig, SortStrategy,
    ToaSelection,
};
use hermes_io::{is_tpx3, FileStatus, Pipeline};
use hermes_tpx::DetectorLayout;
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    HermesIo(#[from] hermes_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] hermes_core::Error),

    #[error("Layout error: {0}")]
    Tpx(#[from] hermes_tpx::Error),
}

/// Output file format.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// Fixed-size little-endian records
    Binary,
    /// Comma separated text with a header row
    Csv,
}

/// Sorting strategy.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    /// One stable parallel sort over the whole file
    Global,
    /// Sort each chunk, then k-way merge
    Merge,
}

/// Detector chip arrangement.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Layout {
    Single,
    Quad,
}

/// Photon centroid weighting.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Weighting {
    Tot,
    Mean,
}

/// Photon time of arrival.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum PhotonToa {
    Earliest,
    Mean,
    MaxTot,
}

/// Timepix3 packet decoder with spatiotemporal pixel clustering.
#[derive(Parser, Debug)]
#[command(name = "hermes")]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .multiple(true)
        .args(["input_file", "input_dir", "config_file"])
))]
struct Cli {
    /// Input TPX3 file
    #[arg(short = 'i', long = "inputFile", value_name = "FILE", conflicts_with = "input_dir")]
    input_file: Option<PathBuf>,

    /// Input directory (batch mode)
    #[arg(short = 'I', long = "inputDir", value_name = "DIR")]
    input_dir: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'o', long = "outputDir", value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Configuration file (`key = value` lines, or JSON with a .json extension)
    #[arg(short = 'c', long = "configFile", value_name = "FILE")]
    config_file: Option<PathBuf>,

    /// Enable signal sorting
    #[arg(short = 's', long = "sort")]
    sort: bool,

    /// Verbose level (0-3)
    #[arg(short = 'v', long = "verbose", value_name = "LEVEL")]
    verbose: Option<u8>,

    /// Enable writing raw signals
    #[arg(short = 'w', long = "writeRawSignals", conflicts_with = "no_write_raw_signals")]
    write_raw_signals: bool,

    /// Disable writing raw signals
    #[arg(short = 'W', long = "no-writeRawSignals")]
    no_write_raw_signals: bool,

    /// Enable pixel clustering
    #[arg(short = 'C', long = "clusterPixels")]
    cluster_pixels: bool,

    /// Enable writing photon data
    #[arg(short = 'p', long = "writeOutPhotons")]
    write_out_photons: bool,

    /// Maximum packets to read per file (0 = all)
    #[arg(short = 'm', long = "maxPackets", value_name = "N")]
    max_packets: Option<u64>,

    /// Spatial epsilon for clustering (pixels)
    #[arg(short = 'S', long = "epsSpatial", value_name = "N")]
    eps_spatial: Option<u8>,

    /// Temporal epsilon for clustering (seconds)
    #[arg(short = 'T', long = "epsTemporal", value_name = "SECONDS")]
    eps_temporal: Option<f64>,

    /// Minimum points for a core pixel
    #[arg(short = 'P', long = "minPts", value_name = "N")]
    min_pts: Option<u16>,

    /// Neighbour search window in sorted positions (0 = unbounded)
    #[arg(short = 'q', long = "queryRegion", value_name = "N")]
    query_region: Option<u16>,

    /// Output file format
    #[arg(long, value_enum)]
    format: Option<Format>,

    /// Sorting strategy
    #[arg(long = "sort-strategy", value_enum)]
    sort_strategy: Option<Strategy>,

    /// Detector chip arrangement
    #[arg(long, value_enum)]
    layout: Option<Layout>,

    /// Detector layout JSON file (overrides --layout)
    #[arg(long = "layout-file", value_name = "FILE")]
    layout_file: Option<PathBuf>,

    /// Photon centroid weighting
    #[arg(long, value_enum)]
    weighting: Option<Weighting>,

    /// Photon time of arrival
    #[arg(long = "photon-toa", value_enum)]
    photon_toa: Option<PhotonToa>,
}

impl Cli {
    /// Builds the run configuration: file first, then flags on top.
    fn build_config(&self) -> Result<(ProcessingConfig, Vec<ConfigWarning>)> {
        let (mut config, mut warnings) = match &self.config_file {
            Some(path) => load_config_file(path)?,
            None => (ProcessingConfig::default(), Vec::new()),
        };

        if let Some(file) = &self.input_file {
            if !file.is_file() {
                return Err(hermes_io::Error::FileNotFound(file.clone()).into());
            }
            if !is_tpx3(file) {
                return Err(hermes_io::Error::UnsupportedExtension(file.clone()).into());
            }
            config.raw_tpx3_folder = match file.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            config.raw_tpx3_file = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned());
        } else if let Some(dir) = &self.input_dir {
            config.raw_tpx3_folder.clone_from(dir);
            config.raw_tpx3_file = None;
        }

        if let Some(dir) = &self.output_dir {
            config.output_folder.clone_from(dir);
        } else if self.config_file.is_none() {
            config.output_folder = config.raw_tpx3_folder.clone();
        }

        if let Some(level) = self.verbose {
            if level <= MAX_VERBOSE_LEVEL {
                config.verbose_level = level;
            } else {
                warnings.push(ConfigWarning::new(
                    "verbose",
                    format!(
                        "{level} outside 0..={MAX_VERBOSE_LEVEL}, keeping {}",
                        config.verbose_level
                    ),
                ));
            }
        }

        if self.sort {
            config.sort_signals = true;
        }
        if self.write_raw_signals {
            config.write_raw_signals = true;
        }
        if self.no_write_raw_signals {
            config.write_raw_signals = false;
        }
        if self.cluster_pixels {
            config.cluster_pixels = true;
        }
        if self.write_out_photons {
            config.write_out_photons = true;
        }

        if let Some(n) = self.max_packets {
            config.max_packets_to_read = n;
        }
        if let Some(eps) = self.eps_spatial {
            config.eps_spatial = eps;
        }
        if let Some(eps) = self.eps_temporal {
            config.eps_temporal = eps;
        }
        if let Some(n) = self.min_pts {
            config.min_pts = n;
        }
        if let Some(n) = self.query_region {
            config.query_region = n;
        }

        if let Some(format) = self.format {
            config.output_format = match format {
                Format::Binary => OutputFormat::Binary,
                Format::Csv => OutputFormat::Csv,
            };
        }
        if let Some(strategy) = self.sort_strategy {
            config.sort_strategy = match strategy {
                Strategy::Global => SortStrategy::Global,
                Strategy::Merge => SortStrategy::BufferMerge,
            };
        }
        if let Some(layout) = self.layout {
            config.layout = match layout {
                Layout::Single => LayoutPreset::Single,
                Layout::Quad => LayoutPreset::Quad,
            };
        }
        if let Some(weighting) = self.weighting {
            config.aggregation.weighting = match weighting {
                Weighting::Tot => CentroidWeighting::TotWeighted,
                Weighting::Mean => CentroidWeighting::Arithmetic,
            };
        }
        if let Some(toa) = self.photon_toa {
            config.aggregation.toa = match toa {
                PhotonToa::Earliest => ToaSelection::Earliest,
                PhotonToa::Mean => ToaSelection::Mean,
                PhotonToa::MaxTot => ToaSelection::MaxTot,
            };
        }

        Ok((config, warnings))
    }
}

/// Reads a config file, choosing the format by extension.
fn load_config_file(path: &Path) -> Result<(ProcessingConfig, Vec<ConfigWarning>)> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            CliError::HermesIo(hermes_io::Error::FileNotFound(path.to_path_buf()))
        }
        _ => CliError::Io(e),
    })?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Ok((ProcessingConfig::from_json(&text)?, Vec::new()))
    } else {
        Ok(ProcessingConfig::from_key_value_str(&text))
    }
}

fn level_filter(verbose_level: u8) -> LevelFilter {
    match verbose_level {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// `RUST_LOG` wins over the verbose level when set.
fn init_logging(verbose_level: u8) {
    env_logger::Builder::new()
        .filter_level(level_filter(verbose_level))
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn run(cli: &Cli) -> Result<bool> {
    let (config, warnings) = cli.build_config()?;
    let mut pipeline = Pipeline::new(config);
    init_logging(pipeline.config().verbose_level);
    for warning in warnings.iter().chain(pipeline.warnings()) {
        log::warn!("config {warning}");
    }
    log::debug!("{:?}", pipeline.config());

    if let Some(path) = &cli.layout_file {
        pipeline = pipeline.with_layout(DetectorLayout::from_file(path)?);
    }

    let start = Instant::now();
    let report = pipeline.run()?;
    let elapsed = start.elapsed();

    for status in &report.files {
        match status {
            FileStatus::Processed(outcome) => {
                println!("== {} ==", outcome.path.display());
                println!("{}", outcome.diagnostics);
                for output in &outcome.outputs {
                    println!("wrote {}", output.display());
                }
            }
            FileStatus::Failed { path, error } => {
                println!("== {} ==", path.display());
                println!("FAILED: {error}");
            }
        }
        println!();
    }

    if pipeline.config().batch_mode() {
        println!("== batch total ==");
        println!("{}", report.total);
        println!();
    }

    let failed = report.failures().count();
    println!(
        "Processed {} file(s), {} failed, in {:.2}s",
        report.files.len() - failed,
        failed,
        elapsed.as_secs_f64()
    );
    Ok(failed == 0)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
