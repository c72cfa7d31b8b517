//! hermes-algorithms: Spatiotemporal clustering of pixel hits.
//!
//! This crate provides ST-DBSCAN over time-sorted pixel hits and helpers
//! that turn the resulting clusters into photon events.
//!

mod processing;
mod st_dbscan;

pub use processing::{
    cluster_and_extract, cluster_and_extract_with_state, cluster_batch, ClusterOutcome,
};
pub use st_dbscan::{DbscanState, StDbscanClustering, StDbscanConfig};
