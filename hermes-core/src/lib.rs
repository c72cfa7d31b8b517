//! hermes-core: Core types for Timepix3 signal processing.
//!
//! This crate provides the foundational data structures shared by the
//! decoder, sorter and clusterer: signal records and their columnar batch,
//! photon events and the aggregation policy that builds them, per-file
//! diagnostics, and the processing configuration.
//!

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extraction;
pub mod photon;
pub mod signal;
pub mod soa;

pub use config::{
    ConfigWarning, LayoutPreset, OutputFormat, ProcessingConfig, Setting, SortStrategy,
};
pub use diagnostics::{DiagnosticsReport, FileDiagnostics, PacketCounts, Stage, StageTimings};
pub use error::{Error, Result};
pub use extraction::{
    AggregationConfig, CentroidWeighting, PhotonAggregation, SimpleCentroidAggregation,
    ToaSelection,
};
pub use photon::PhotonEvent;
pub use signal::{SignalRecord, SignalType, NOT_CLUSTERABLE, UNCLUSTERED};
pub use soa::SignalBatch;
