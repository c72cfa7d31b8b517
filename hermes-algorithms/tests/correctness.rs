#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
use approx::assert_relative_eq;
use hermes_algorithms::{cluster_and_extract, StDbscanClustering, StDbscanConfig, DbscanState};
use hermes_core::{AggregationConfig, SignalBatch, SignalRecord, SignalType};

fn generate_hits() -> SignalBatch {
    let mut batch = SignalBatch::with_capacity(24);
    // Cluster 1: 3x3-ish blob at (100, 100) around t = 1 us
    for i in 0..10u16 {
        let t = 1.0e-6 + f64::from(i) * 1.0e-9;
        batch.push(&SignalRecord::pixel(100 + (i % 3), 100 + (i / 3), t, 50.0));
    }
    batch.push(&SignalRecord::timing(SignalType::Tdc, 1.5e-6, 0.0));
    // Cluster 2: blob at (150, 150) around t = 2 us
    for i in 0..10u16 {
        let t = 2.0e-6 + f64::from(i) * 1.0e-9;
        batch.push(&SignalRecord::pixel(150 + (i % 3), 150 + (i / 3), t, 50.0));
    }
    // Isolated hit
    batch.push(&SignalRecord::pixel(10, 240, 3.0e-6, 50.0));
    batch
}

fn config(min_pts: usize, query_region: usize) -> StDbscanConfig {
    StDbscanConfig {
        eps_spatial: 2,
        eps_temporal: 5.0e-8,
        min_pts,
        query_region,
    }
}

#[test]
fn test_verification_st_dbscan() {
    let mut batch = generate_hits();
    let algo = StDbscanClustering::new(config(3, 0));
    let mut state = DbscanState::default();
    let n = algo.cluster(&mut batch, &mut state).unwrap();
    assert_eq!(n, 2, "ST-DBSCAN found {} clusters, expected 2", n);
    assert_eq!(batch.group_id[21], -1);
    assert_eq!(batch.group_id[10], -2);
}

#[test]
fn test_labels_are_contiguous_and_complete() {
    let mut batch = generate_hits();
    let outcome = cluster_and_extract(&mut batch, &config(3, 0), &AggregationConfig::default())
        .unwrap();

    for label in batch.group_id.iter().copied().filter(|&g| g >= 0) {
        assert!((label as usize) < outcome.num_clusters);
    }
    let members: u32 = outcome.photons.iter().map(|p| p.multiplicity).sum();
    let labelled = batch.group_id.iter().filter(|&&g| g >= 0).count();
    assert_eq!(members as usize, labelled);
}

#[test]
fn test_photon_centroids() {
    let mut batch = generate_hits();
    let outcome = cluster_and_extract(&mut batch, &config(3, 0), &AggregationConfig::default())
        .unwrap();
    assert_eq!(outcome.photons.len(), 2);

    // Equal ToT, so the weighted centroid is the arithmetic mean.
    let mean_x = (0..10u16).map(|i| f64::from(100 + i % 3)).sum::<f64>() / 10.0;
    let mean_y = (0..10u16).map(|i| f64::from(100 + i / 3)).sum::<f64>() / 10.0;
    assert_relative_eq!(outcome.photons[0].x, mean_x, epsilon = 1e-9);
    assert_relative_eq!(outcome.photons[0].y, mean_y, epsilon = 1e-9);
    assert_relative_eq!(outcome.photons[0].toa, 1.0e-6);
    assert_relative_eq!(outcome.photons[0].duration, 9.0e-9, epsilon = 1e-15);
    assert_eq!(outcome.photons[0].x_extent, 2);
    assert_eq!(outcome.photons[0].y_extent, 3);
    assert_relative_eq!(outcome.photons[1].tot, 500.0);
}

#[test]
fn test_wide_window_matches_unbounded_on_sorted_input() {
    let mut unbounded = generate_hits();
    let mut windowed = generate_hits();
    let algo = StDbscanClustering::new(config(3, 0));
    algo.cluster(&mut unbounded, &mut DbscanState::default()).unwrap();
    let algo = StDbscanClustering::new(config(3, 64));
    algo.cluster(&mut windowed, &mut DbscanState::default()).unwrap();
    assert_eq!(unbounded.group_id, windowed.group_id);
}

#[test]
fn test_rerun_is_deterministic() {
    let mut first = generate_hits();
    let mut second = generate_hits();
    let a = cluster_and_extract(&mut first, &config(2, 0), &AggregationConfig::default()).unwrap();
    let b =
        cluster_and_extract(&mut second, &config(2, 0), &AggregationConfig::default()).unwrap();
    assert_eq!(first, second);
    assert_eq!(a, b);
}
