//! hermes-io: File input, output and run orchestration for hermes.
//!
//! This crate maps `.tpx3` files into memory via memmap2, writes raw
//! signal, photon and diagnostics files, and drives the decode, sort,
//! cluster and write stages over one file or a whole folder.
//!

mod error;
pub mod pipeline;
mod reader;
pub mod scanner;
pub mod writer;

pub use error::{Error, Result};
pub use pipeline::{run, FileOutcome, FileStatus, Pipeline, RunReport};
pub use reader::{MappedFileReader, Tpx3FileReader};
pub use scanner::{input_files, is_tpx3, list_tpx3_files};
pub use writer::{OutputPaths, OutputWriter, PHOTON_RECORD_BYTES, RAW_SIGNAL_RECORD_BYTES};
