//! Photon aggregation traits and configuration.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc,
    clippy::doc_markdown
)]
//!

use crate::error::{Error, Result};
use crate::photon::PhotonEvent;
use crate::signal::SignalType;
use crate::soa::SignalBatch;
use serde::{Deserialize, Serialize};

/// How member coordinates are averaged into a centroid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentroidWeighting {
    /// Weight each member by its ToT.
    #[default]
    TotWeighted,
    /// Plain arithmetic mean.
    Arithmetic,
}

/// Which member ToA represents the photon.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToaSelection {
    /// Earliest member ToA.
    #[default]
    Earliest,
    /// Mean of member ToAs.
    Mean,
    /// ToA of the member with the largest ToT.
    MaxTot,
}

/// Configuration for photon aggregation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub weighting: CentroidWeighting,
    pub toa: ToaSelection,
}

impl AggregationConfig {
    /// Set centroid weighting.
    #[must_use]
    pub fn with_weighting(mut self, weighting: CentroidWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Set representative ToA selection.
    #[must_use]
    pub fn with_toa(mut self, toa: ToaSelection) -> Self {
        self.toa = toa;
        self
    }
}

/// Trait for photon aggregation policies.
///
/// Turns labelled pixel hits into one photon per non-noise cluster.
pub trait PhotonAggregation: Send + Sync {
    /// Aggregate clusters of a labelled batch.
    ///
    /// # Arguments
    /// * `batch` - Signals with `group_id` filled in for pixel hits
    /// * `num_clusters` - Number of clusters found (ids are `0..num_clusters`)
    ///
    /// # Returns
    /// One photon per cluster, ordered by cluster id.
    fn aggregate(&self, batch: &SignalBatch, num_clusters: usize) -> Result<Vec<PhotonEvent>>;
}

/// Running sums for one cluster.
#[derive(Clone, Copy, Debug)]
struct ClusterAccumulator {
    count: u32,
    sum_x: f64,
    sum_y: f64,
    weighted_x: f64,
    weighted_y: f64,
    sum_tot: f64,
    sum_toa: f64,
    min_toa: f64,
    max_toa: f64,
    max_tot: f64,
    max_tot_toa: f64,
    min_x: u16,
    max_x: u16,
    min_y: u16,
    max_y: u16,
}

impl Default for ClusterAccumulator {
    fn default() -> Self {
        Self {
            count: 0,
            sum_x: 0.0,
            sum_y: 0.0,
            weighted_x: 0.0,
            weighted_y: 0.0,
            sum_tot: 0.0,
            sum_toa: 0.0,
            min_toa: f64::INFINITY,
            max_toa: f64::NEG_INFINITY,
            max_tot: f64::NEG_INFINITY,
            max_tot_toa: 0.0,
            min_x: u16::MAX,
            max_x: 0,
            min_y: u16::MAX,
            max_y: 0,
        }
    }
}

impl ClusterAccumulator {
    fn add(&mut self, x: u16, y: u16, toa: f64, tot: f64) {
        let (fx, fy) = (x as f64, y as f64);
        self.count += 1;
        self.sum_x += fx;
        self.sum_y += fy;
        self.weighted_x += fx * tot;
        self.weighted_y += fy * tot;
        self.sum_tot += tot;
        self.sum_toa += toa;
        self.min_toa = self.min_toa.min(toa);
        self.max_toa = self.max_toa.max(toa);
        // Strict comparison keeps the first member on ToT ties.
        if tot > self.max_tot {
            self.max_tot = tot;
            self.max_tot_toa = toa;
        }
        self.min_x = self.min_x.min(x);
        self.max_x = self.max_x.max(x);
        self.min_y = self.min_y.min(y);
        self.max_y = self.max_y.max(y);
    }

    fn finish(&self, group_id: i32, config: &AggregationConfig) -> Result<PhotonEvent> {
        if self.count == 0 {
            return Err(Error::EmptyCluster);
        }
        let n = self.count as f64;
        let (x, y) = match config.weighting {
            CentroidWeighting::TotWeighted if self.sum_tot > 0.0 => {
                (self.weighted_x / self.sum_tot, self.weighted_y / self.sum_tot)
            }
            // All-zero ToT falls back to the arithmetic mean.
            _ => (self.sum_x / n, self.sum_y / n),
        };
        let toa = match config.toa {
            ToaSelection::Earliest => self.min_toa,
            ToaSelection::Mean => self.sum_toa / n,
            ToaSelection::MaxTot => self.max_tot_toa,
        };
        Ok(PhotonEvent {
            x,
            y,
            toa,
            tot: self.sum_tot,
            multiplicity: self.count,
            group_id,
            x_extent: self.max_x - self.min_x,
            y_extent: self.max_y - self.min_y,
            duration: self.max_toa - self.min_toa,
        })
    }
}

/// Centroid aggregation in a single pass over the batch.
#[derive(Clone, Debug, Default)]
pub struct SimpleCentroidAggregation {
    config: AggregationConfig,
}

impl SimpleCentroidAggregation {
    /// Create with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: AggregationConfig::default(),
        }
    }

    /// Create with custom configuration.
    #[must_use]
    pub fn with_config(config: AggregationConfig) -> Self {
        Self { config }
    }
}

impl PhotonAggregation for SimpleCentroidAggregation {
    fn aggregate(&self, batch: &SignalBatch, num_clusters: usize) -> Result<Vec<PhotonEvent>> {
        batch.check_columns()?;

        let mut clusters = vec![ClusterAccumulator::default(); num_clusters];
        for i in 0..batch.len() {
            let label = batch.group_id[i];
            if batch.signal_type[i] != SignalType::PixelHit || label < 0 {
                continue;
            }
            let Some(acc) = clusters.get_mut(label as usize) else {
                return Err(Error::InvalidClusterLabel {
                    label,
                    clusters: num_clusters,
                });
            };
            acc.add(batch.x[i], batch.y[i], batch.toa[i], batch.tot[i]);
        }

        clusters
            .iter()
            .enumerate()
            .filter(|(_, acc)| acc.count > 0)
            .map(|(id, acc)| acc.finish(id as i32, &self.config))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::signal::SignalRecord;
    use approx::assert_relative_eq;

    fn labelled(records: &[(u16, u16, f64, f64, i32)]) -> SignalBatch {
        let mut batch = SignalBatch::default();
        for &(x, y, toa, tot, label) in records {
            let mut record = SignalRecord::pixel(x, y, toa, tot);
            record.group_id = label;
            batch.push(&record);
        }
        batch
    }

    #[test]
    fn test_single_hit_aggregation() {
        let batch = labelled(&[(100, 200, 1.0e-6, 50.0, 0)]);
        let photons = SimpleCentroidAggregation::new().aggregate(&batch, 1).unwrap();

        assert_eq!(photons.len(), 1);
        assert_eq!(photons[0].x, 100.0);
        assert_eq!(photons[0].y, 200.0);
        assert_eq!(photons[0].toa, 1.0e-6);
        assert_eq!(photons[0].multiplicity, 1);
        assert_eq!(photons[0].duration, 0.0);
    }

    #[test]
    fn test_weighted_centroid() {
        let batch = labelled(&[(0, 0, 2.0e-6, 30.0, 0), (2, 0, 1.0e-6, 10.0, 0)]);
        let photons = SimpleCentroidAggregation::new().aggregate(&batch, 1).unwrap();

        // (0*30 + 2*10) / 40
        assert_relative_eq!(photons[0].x, 0.5);
        assert_eq!(photons[0].tot, 40.0);
        assert_eq!(photons[0].toa, 1.0e-6);
        assert_eq!(photons[0].x_extent, 2);
        assert_relative_eq!(photons[0].duration, 1.0e-6);
    }

    #[test]
    fn test_arithmetic_and_max_tot_policy() {
        let batch = labelled(&[(0, 0, 2.0e-6, 30.0, 0), (2, 4, 1.0e-6, 10.0, 0)]);
        let config = AggregationConfig::default()
            .with_weighting(CentroidWeighting::Arithmetic)
            .with_toa(ToaSelection::MaxTot);
        let photons = SimpleCentroidAggregation::with_config(config)
            .aggregate(&batch, 1)
            .unwrap();

        assert_relative_eq!(photons[0].x, 1.0);
        assert_relative_eq!(photons[0].y, 2.0);
        assert_eq!(photons[0].toa, 2.0e-6);
    }

    #[test]
    fn test_mean_toa_policy() {
        let batch = labelled(&[(0, 0, 2.0e-6, 30.0, 0), (1, 0, 4.0e-6, 10.0, 0)]);
        let config = AggregationConfig::default().with_toa(ToaSelection::Mean);
        let photons = SimpleCentroidAggregation::with_config(config)
            .aggregate(&batch, 1)
            .unwrap();
        assert_relative_eq!(photons[0].toa, 3.0e-6);
    }

    #[test]
    fn test_zero_tot_weighted_centroid() {
        let batch = labelled(&[(10, 20, 1.0e-6, 0.0, 0), (30, 40, 1.0e-6, 0.0, 0)]);
        let photons = SimpleCentroidAggregation::new().aggregate(&batch, 1).unwrap();

        assert_relative_eq!(photons[0].x, 20.0);
        assert_relative_eq!(photons[0].y, 30.0);
        assert!(!photons[0].x.is_nan());
    }

    #[test]
    fn test_noise_and_non_pixels_ignored() {
        let mut batch = labelled(&[
            (10, 10, 1.0e-6, 50.0, 0),
            (11, 10, 1.1e-6, 50.0, 1),
            (90, 90, 1.2e-6, 50.0, -1),
        ]);
        batch.push(&SignalRecord::timing(SignalType::Tdc, 1.0e-6, 0.0));

        let photons = SimpleCentroidAggregation::new().aggregate(&batch, 2).unwrap();
        assert_eq!(photons.len(), 2);
        assert_eq!(photons[0].group_id, 0);
        assert_eq!(photons[1].group_id, 1);
    }

    #[test]
    fn test_label_out_of_range_error() {
        let batch = labelled(&[(10, 10, 1.0e-6, 50.0, 3)]);
        let result = SimpleCentroidAggregation::new().aggregate(&batch, 1);
        assert!(matches!(
            result,
            Err(Error::InvalidClusterLabel { label: 3, clusters: 1 })
        ));
    }
}
