//! High-level processing helpers that combine clustering and aggregation.

use crate::{DbscanState, StDbscanClustering, StDbscanConfig};
use hermes_core::error::Result;
use hermes_core::extraction::{AggregationConfig, PhotonAggregation, SimpleCentroidAggregation};
use hermes_core::photon::PhotonEvent;
use hermes_core::soa::SignalBatch;
use hermes_core::ProcessingConfig;

/// Result of clustering one batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ClusterOutcome {
    pub num_clusters: usize,
    pub photons: Vec<PhotonEvent>,
}

/// Cluster pixel hits in-place, then aggregate one photon per cluster.
pub fn cluster_and_extract(
    batch: &mut SignalBatch,
    clustering: &StDbscanConfig,
    aggregation: &AggregationConfig,
) -> Result<ClusterOutcome> {
    let mut state = DbscanState::default();
    cluster_and_extract_with_state(batch, clustering, aggregation, &mut state)
}

/// Like [`cluster_and_extract`], reusing caller-owned buffers.
pub fn cluster_and_extract_with_state(
    batch: &mut SignalBatch,
    clustering: &StDbscanConfig,
    aggregation: &AggregationConfig,
    state: &mut DbscanState,
) -> Result<ClusterOutcome> {
    let algo = StDbscanClustering::new(clustering.clone());
    let num_clusters = algo.cluster(batch, state)?;

    let aggregator = SimpleCentroidAggregation::with_config(*aggregation);
    let photons = aggregator.aggregate(batch, num_clusters)?;
    Ok(ClusterOutcome {
        num_clusters,
        photons,
    })
}

/// Applies the clustering stage of a processing run.
///
/// With `cluster_pixels` off every pixel keeps `group_id == -1` and no
/// photons are produced.
pub fn cluster_batch(batch: &mut SignalBatch, config: &ProcessingConfig) -> Result<ClusterOutcome> {
    if !config.cluster_pixels {
        return Ok(ClusterOutcome::default());
    }
    cluster_and_extract(
        batch,
        &StDbscanConfig::from_config(config),
        &config.aggregation,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_core::SignalRecord;

    fn two_hits() -> SignalBatch {
        SignalBatch::from_records(&[
            SignalRecord::pixel(10, 10, 1.00e-7, 50.0),
            SignalRecord::pixel(11, 10, 1.05e-7, 50.0),
        ])
    }

    #[test]
    fn test_cluster_and_extract() {
        let mut batch = two_hits();
        let config = StDbscanConfig {
            eps_spatial: 2,
            eps_temporal: 5e-7,
            min_pts: 2,
            query_region: 0,
        };
        let outcome =
            cluster_and_extract(&mut batch, &config, &AggregationConfig::default()).unwrap();
        assert_eq!(outcome.num_clusters, 1);
        assert_eq!(outcome.photons.len(), 1);
        assert_eq!(outcome.photons[0].multiplicity, 2);
        assert!((outcome.photons[0].x - 10.5).abs() < 1e-12);
    }

    #[test]
    fn test_cluster_batch_disabled_leaves_labels() {
        let mut batch = two_hits();
        let config = ProcessingConfig::default();
        assert!(!config.cluster_pixels);
        let outcome = cluster_batch(&mut batch, &config).unwrap();
        assert!(outcome.photons.is_empty());
        assert_eq!(batch.group_id, vec![-1, -1]);
    }
}
