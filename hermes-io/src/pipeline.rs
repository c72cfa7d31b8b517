//! Run orchestration: decode, sort, cluster and write one file or a batch.
//!
//! Files are independent. A batch processes them in parallel and reports
//! them in path order. A file that cannot be decoded is recorded as failed
//! and the batch carries on; an internal consistency failure stops the run.

use crate::reader::Tpx3FileReader;
use crate::scanner::input_files;
use crate::writer::{OutputPaths, OutputWriter, BATCH_DIAGNOSTICS_FILE};
use crate::{Error, Result};
use hermes_algorithms::cluster_batch;
use hermes_core::{ConfigWarning, DiagnosticsReport, FileDiagnostics, ProcessingConfig, Stage};
use hermes_tpx::{sort_signals, DecodedFile, DecoderOptions, DetectorLayout};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Result of processing one file.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub diagnostics: FileDiagnostics,
    /// Files written, in write order.
    pub outputs: Vec<PathBuf>,
}

/// Per-file entry of a run report.
#[derive(Debug)]
pub enum FileStatus {
    Processed(FileOutcome),
    Failed { path: PathBuf, error: Error },
}

impl FileStatus {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Processed(outcome) => &outcome.path,
            Self::Failed { path, .. } => path,
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Default)]
pub struct RunReport {
    /// One entry per input file, in path order.
    pub files: Vec<FileStatus>,
    /// Sum of the diagnostics of every processed file.
    pub total: FileDiagnostics,
}

impl RunReport {
    /// Files that could not be processed.
    pub fn failures(&self) -> impl Iterator<Item = (&Path, &Error)> {
        self.files.iter().filter_map(|status| match status {
            FileStatus::Failed { path, error } => Some((path.as_path(), error)),
            FileStatus::Processed(_) => None,
        })
    }

    /// Successfully processed files.
    pub fn processed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter_map(|status| match status {
            FileStatus::Processed(outcome) => Some(outcome),
            FileStatus::Failed { .. } => None,
        })
    }
}

#[derive(Serialize)]
struct FailedFile<'a> {
    path: &'a Path,
    error: String,
}

#[derive(Serialize)]
struct BatchSummary<'a> {
    total: DiagnosticsReport<'a>,
    processed: Vec<&'a Path>,
    failed: Vec<FailedFile<'a>>,
}

/// Processing pipeline for a validated configuration.
pub struct Pipeline {
    config: ProcessingConfig,
    options: DecoderOptions,
    warnings: Vec<ConfigWarning>,
}

impl Pipeline {
    /// Creates a pipeline using the configured layout preset.
    ///
    /// Out-of-range settings are clamped or defaulted; each adjustment is
    /// logged and kept in [`Pipeline::warnings`].
    #[must_use]
    pub fn new(config: ProcessingConfig) -> Self {
        let (config, warnings) = config.validated();
        for warning in &warnings {
            log::warn!("{warning}");
        }
        let options = DecoderOptions::from_config(&config);
        Self {
            config,
            options,
            warnings,
        }
    }

    /// Overrides the detector layout, e.g. one loaded from a JSON file.
    #[must_use]
    pub fn with_layout(mut self, layout: DetectorLayout) -> Self {
        self.options = self.options.with_layout(layout);
        self
    }

    #[must_use]
    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Adjustments made to the configuration passed to [`Pipeline::new`].
    #[must_use]
    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    /// Processes the configured input.
    ///
    /// # Errors
    /// Returns an error if the input cannot be resolved, the output folder
    /// cannot be created, or a file violates internal consistency. Per-file
    /// decode failures are reported in [`RunReport::files`] instead.
    pub fn run(&self) -> Result<RunReport> {
        let files = input_files(&self.config)?;
        std::fs::create_dir_all(&self.config.output_folder)?;
        log::info!(
            "processing {} file(s) into {}",
            files.len(),
            self.config.output_folder.display()
        );

        let results: Vec<(PathBuf, Result<FileOutcome>)> = if self.config.batch_mode() {
            files
                .into_par_iter()
                .map(|path| {
                    let result = self.process_file(&path);
                    (path, result)
                })
                .collect()
        } else {
            files
                .into_iter()
                .map(|path| {
                    let result = self.process_file(&path);
                    (path, result)
                })
                .collect()
        };

        let mut report = RunReport::default();
        for (path, result) in results {
            match result {
                Ok(outcome) => {
                    report.total.merge(&outcome.diagnostics);
                    report.files.push(FileStatus::Processed(outcome));
                }
                Err(error) if error.is_fatal() => {
                    log::error!("{}: {error}", path.display());
                    return Err(error);
                }
                Err(error) => {
                    log::error!("skipping {}: {error}", path.display());
                    report.files.push(FileStatus::Failed { path, error });
                }
            }
        }
        report.total.unprocessed()?;

        if self.config.batch_mode() {
            self.write_batch_summary(&report)?;
        }
        Ok(report)
    }

    /// Runs decode, sort, cluster and write for a single file.
    ///
    /// # Errors
    /// Returns [`Error::CorruptFile`] for undecodable input,
    /// [`Error::InternalConsistency`] for accounting failures, and I/O
    /// errors from the writers.
    pub fn process_file(&self, path: &Path) -> Result<FileOutcome> {
        let config = &self.config;
        let reader = Tpx3FileReader::open(path)?.with_options(self.options.clone());
        log::debug!("decoding {} ({} words)", path.display(), reader.word_count());
        let DecodedFile {
            mut signals,
            chunk_starts,
            mut diagnostics,
        } = reader.decode()?;

        if config.sort_signals {
            let start = Instant::now();
            sort_signals(&mut signals, &chunk_starts, config.sort_strategy)?;
            diagnostics.timings.record(Stage::Sort, start.elapsed());
        } else if config.cluster_pixels {
            log::warn!(
                "{}: clustering signals in file order, sorting is disabled",
                path.display()
            );
        }

        let start = Instant::now();
        let clusters = cluster_batch(&mut signals, config)?;
        if config.cluster_pixels {
            diagnostics.timings.record(Stage::Cluster, start.elapsed());
            log::debug!(
                "{}: {} clusters from {} pixel hits",
                path.display(),
                clusters.num_clusters,
                signals.pixel_count()
            );
        }
        diagnostics.photons = clusters.photons.len() as u64;

        let paths = OutputPaths::for_input(&config.output_folder, path, config.output_format);
        let mut outputs = Vec::new();
        let start = Instant::now();
        if config.write_raw_signals {
            OutputWriter::create(&paths.raw_signals)?
                .write_signals(&signals, config.output_format)?;
            outputs.push(paths.raw_signals);
        }
        if config.write_out_photons && config.cluster_pixels {
            OutputWriter::create(&paths.photons)?
                .write_photons(&clusters.photons, config.output_format)?;
            outputs.push(paths.photons);
        }
        diagnostics.timings.record(Stage::Write, start.elapsed());

        OutputWriter::create(&paths.diagnostics)?.write_json(&diagnostics.report()?)?;
        outputs.push(paths.diagnostics);

        log::info!(
            "{}: {} packets, {} signals, {} photons",
            path.display(),
            diagnostics.total_packets,
            signals.len(),
            diagnostics.photons
        );
        Ok(FileOutcome {
            path: path.to_path_buf(),
            diagnostics,
            outputs,
        })
    }

    fn write_batch_summary(&self, report: &RunReport) -> Result<()> {
        let summary = BatchSummary {
            total: report.total.report()?,
            processed: report.processed().map(|o| o.path.as_path()).collect(),
            failed: report
                .failures()
                .map(|(path, error)| FailedFile {
                    path,
                    error: error.to_string(),
                })
                .collect(),
        };
        let path = self.config.output_folder.join(BATCH_DIAGNOSTICS_FILE);
        OutputWriter::create(&path)?.write_json(&summary)?;
        log::info!("batch summary written to {}", path.display());
        Ok(())
    }
}

/// Runs `config` with its layout preset.
///
/// # Errors
/// See [`Pipeline::run`].
pub fn run(config: ProcessingConfig) -> Result<RunReport> {
    Pipeline::new(config).run()
}
