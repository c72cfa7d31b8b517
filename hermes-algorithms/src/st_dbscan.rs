//! Spatiotemporal DBSCAN over time-sorted pixel hits.
//!
//! Only pixel hits take part. Neighbours are searched in a window of the
//! time-sorted pixel sequence instead of over the whole file: either a fixed
//! number of positions each way (`query_region > 0`) or outward until the
//! ToA gap exceeds `eps_temporal` (`query_region == 0`).
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::must_use_candidate,
    clippy::missing_errors_doc
)]

use hermes_core::{ProcessingConfig, Result, SignalBatch, SignalType, UNCLUSTERED};
use rayon::prelude::*;

#[derive(Clone, Debug, PartialEq)]
pub struct StDbscanConfig {
    /// Chebyshev radius in pixels.
    pub eps_spatial: u16,
    /// ToA radius in seconds.
    pub eps_temporal: f64,
    /// Neighbourhood size (the point included) that makes a core point.
    pub min_pts: usize,
    /// Window half-width in positions. 0 = bounded by `eps_temporal` only.
    pub query_region: usize,
}

impl Default for StDbscanConfig {
    fn default() -> Self {
        Self::from_config(&ProcessingConfig::default())
    }
}

impl StDbscanConfig {
    /// Clustering parameters of a validated processing configuration.
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            eps_spatial: u16::from(config.eps_spatial),
            eps_temporal: config.eps_temporal,
            min_pts: usize::from(config.min_pts),
            query_region: usize::from(config.query_region),
        }
    }
}

pub struct StDbscanClustering {
    config: StDbscanConfig,
}

/// Reusable per-position buffers, indexed by position in the pixel sequence.
#[derive(Default)]
pub struct DbscanState {
    rows: Vec<usize>,
    x: Vec<u16>,
    y: Vec<u16>,
    toa: Vec<f64>,
    labels: Vec<i32>,
    visited: Vec<bool>,
    noise: Vec<bool>,
    neighbors: Vec<usize>,
    seeds: Vec<usize>,
}

impl DbscanState {
    fn load(&mut self, batch: &SignalBatch) {
        self.rows.clear();
        self.x.clear();
        self.y.clear();
        self.toa.clear();
        for (row, &ty) in batch.signal_type.iter().enumerate() {
            if ty == SignalType::PixelHit {
                self.rows.push(row);
                self.x.push(batch.x[row]);
                self.y.push(batch.y[row]);
                self.toa.push(batch.toa[row]);
            }
        }
        let n = self.rows.len();
        self.labels.clear();
        self.labels.resize(n, UNCLUSTERED);
        self.visited.clear();
        self.visited.resize(n, false);
        self.noise.clear();
        self.noise.resize(n, false);
    }
}

impl StDbscanClustering {
    pub fn new(config: StDbscanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StDbscanConfig {
        &self.config
    }

    pub fn create_state(&self) -> DbscanState {
        DbscanState::default()
    }

    /// Labels the pixel hits of `batch` and returns the number of clusters.
    ///
    /// Cluster ids follow the order in which their first core point appears
    /// in the pixel sequence. Non-pixel rows keep their `group_id`.
    pub fn cluster(&self, batch: &mut SignalBatch, state: &mut DbscanState) -> Result<usize> {
        batch.check_columns()?;
        state.load(batch);
        let n = state.rows.len();

        batch
            .group_id
            .par_iter_mut()
            .zip(batch.signal_type.par_iter())
            .filter(|(_, &ty)| ty == SignalType::PixelHit)
            .for_each(|(id, _)| *id = UNCLUSTERED);

        if n == 0 {
            return Ok(0);
        }
        if !state.toa.windows(2).all(|w| w[0] <= w[1]) {
            log::debug!("clustering pixels that are not time sorted, neighbourhoods may be incomplete");
        }

        let mut current_cluster_id = 0;
        let mut neighbors = std::mem::take(&mut state.neighbors);
        let mut seeds = std::mem::take(&mut state.seeds);

        for p in 0..n {
            if state.visited[p] {
                continue;
            }
            state.visited[p] = true;

            self.region_query_into(state, p, &mut neighbors);

            if neighbors.len() < self.config.min_pts {
                state.noise[p] = true;
            } else {
                state.labels[p] = current_cluster_id;
                seeds.clear();
                seeds.extend_from_slice(&neighbors);
                self.expand_cluster(state, &mut seeds, current_cluster_id, &mut neighbors);
                current_cluster_id += 1;
            }
        }

        state.neighbors = neighbors;
        state.seeds = seeds;

        for (pos, &row) in state.rows.iter().enumerate() {
            batch.group_id[row] = state.labels[pos];
        }

        Ok(current_cluster_id as usize)
    }

    #[inline]
    fn is_neighbor(&self, state: &DbscanState, a: usize, b: usize) -> bool {
        let dt = (state.toa[a] - state.toa[b]).abs();
        dt <= self.config.eps_temporal
            && state.x[a].abs_diff(state.x[b]) <= self.config.eps_spatial
            && state.y[a].abs_diff(state.y[b]) <= self.config.eps_spatial
    }

    /// Collects the neighbourhood of `p`, `p` itself included.
    fn region_query_into(&self, state: &DbscanState, p: usize, neighbors: &mut Vec<usize>) {
        neighbors.clear();
        neighbors.push(p);

        let n = state.toa.len();
        let region = self.config.query_region;
        let t = state.toa[p];

        if region > 0 {
            let lo = p.saturating_sub(region);
            let hi = (p + region).min(n - 1);
            for q in (lo..p).rev().chain(p + 1..=hi) {
                if self.is_neighbor(state, p, q) {
                    neighbors.push(q);
                }
            }
            return;
        }

        for q in (0..p).rev() {
            if (t - state.toa[q]).abs() > self.config.eps_temporal {
                break;
            }
            if self.is_neighbor(state, p, q) {
                neighbors.push(q);
            }
        }
        for q in p + 1..n {
            if (state.toa[q] - t).abs() > self.config.eps_temporal {
                break;
            }
            if self.is_neighbor(state, p, q) {
                neighbors.push(q);
            }
        }
    }

    fn expand_cluster(
        &self,
        state: &mut DbscanState,
        seeds: &mut Vec<usize>,
        cluster_id: i32,
        neighbors: &mut Vec<usize>,
    ) {
        let mut i = 0;
        while i < seeds.len() {
            let current_p = seeds[i];
            i += 1;

            if state.noise[current_p] {
                state.noise[current_p] = false;
                state.labels[current_p] = cluster_id;
            }

            if !state.visited[current_p] {
                state.visited[current_p] = true;
                state.labels[current_p] = cluster_id;

                self.region_query_into(state, current_p, neighbors);
                if neighbors.len() >= self.config.min_pts {
                    seeds.extend(
                        neighbors
                            .iter()
                            .copied()
                            .filter(|&q| !state.visited[q] || state.labels[q] == UNCLUSTERED),
                    );
                }
            } else if state.labels[current_p] == UNCLUSTERED {
                state.labels[current_p] = cluster_id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_core::{SignalRecord, NOT_CLUSTERABLE};

    fn pixels(hits: &[(u16, u16, f64)]) -> SignalBatch {
        let records: Vec<SignalRecord> = hits
            .iter()
            .map(|&(x, y, t)| SignalRecord::pixel(x, y, t, 25.0))
            .collect();
        SignalBatch::from_records(&records)
    }

    fn run(batch: &mut SignalBatch, config: StDbscanConfig) -> usize {
        let algo = StDbscanClustering::new(config);
        let mut state = algo.create_state();
        algo.cluster(batch, &mut state).unwrap()
    }

    fn config(eps_spatial: u16, eps_temporal: f64, min_pts: usize, query_region: usize) -> StDbscanConfig {
        StDbscanConfig {
            eps_spatial,
            eps_temporal,
            min_pts,
            query_region,
        }
    }

    #[test]
    fn test_two_hits_one_cluster() {
        let mut batch = pixels(&[(10, 10, 1.00e-7), (11, 10, 1.05e-7)]);
        assert_eq!(run(&mut batch, config(2, 5e-7, 2, 0)), 1);
        assert_eq!(batch.group_id, vec![0, 0]);
    }

    #[test]
    fn test_temporal_gap_is_noise() {
        let mut batch = pixels(&[(10, 10, 1.00e-7), (11, 10, 1.05e-7)]);
        assert_eq!(run(&mut batch, config(2, 1e-8, 2, 0)), 0);
        assert_eq!(batch.group_id, vec![-1, -1]);
    }

    #[test]
    fn test_chebyshev_distance() {
        // Diagonal (2, 2) is within Chebyshev 2 but not Euclidean 2.
        let mut batch = pixels(&[(10, 10, 0.0), (12, 12, 0.0)]);
        assert_eq!(run(&mut batch, config(2, 1e-9, 2, 0)), 1);

        let mut batch = pixels(&[(10, 10, 0.0), (13, 10, 0.0)]);
        assert_eq!(run(&mut batch, config(2, 1e-9, 2, 0)), 0);
    }

    #[test]
    fn test_zero_eps_spatial_same_pixel_only() {
        let mut batch = pixels(&[(5, 5, 0.0), (5, 5, 1e-9), (6, 5, 2e-9)]);
        assert_eq!(run(&mut batch, config(0, 1e-8, 2, 0)), 1);
        assert_eq!(batch.group_id, vec![0, 0, -1]);
    }

    #[test]
    fn test_min_pts_one_has_no_noise() {
        let mut batch = pixels(&[(1, 1, 0.0), (100, 100, 0.0), (200, 3, 1.0)]);
        assert_eq!(run(&mut batch, config(2, 1e-8, 1, 0)), 3);
        assert!(batch.group_id.iter().all(|&g| g >= 0));
        assert_eq!(batch.group_id, vec![0, 1, 2]);
    }

    #[test]
    fn test_border_point_joins_without_propagating() {
        // Chain a-b-c in x; with min_pts 3 only b is core.
        let mut batch = pixels(&[(0, 0, 0.0), (2, 0, 1e-9), (4, 0, 2e-9), (6, 0, 3e-9)]);
        assert_eq!(run(&mut batch, config(2, 1e-8, 3, 0)), 1);
        // c is core too (b, c, d), so d joins as border of c.
        assert_eq!(batch.group_id, vec![0, 0, 0, 0]);

        let mut batch = pixels(&[(0, 0, 0.0), (2, 0, 1e-9), (4, 0, 2e-9), (7, 0, 3e-9)]);
        assert_eq!(run(&mut batch, config(2, 1e-8, 3, 0)), 1);
        // Only b is core; c is border and does not pull in the far point.
        assert_eq!(batch.group_id, vec![0, 0, 0, -1]);
    }

    #[test]
    fn test_query_region_limits_window() {
        // Three same-pixel hits at equal time; a window of 1 still links a chain.
        let mut batch = pixels(&[(1, 1, 0.0), (1, 1, 0.0), (1, 1, 0.0), (1, 1, 0.0)]);
        assert_eq!(run(&mut batch, config(0, 1e-9, 3, 1)), 1);

        // With window 1 and min_pts 4 no point sees enough neighbours.
        let mut batch = pixels(&[(1, 1, 0.0), (1, 1, 0.0), (1, 1, 0.0), (1, 1, 0.0)]);
        assert_eq!(run(&mut batch, config(0, 1e-9, 4, 1)), 0);
        // Unbounded window finds all four.
        let mut batch = pixels(&[(1, 1, 0.0), (1, 1, 0.0), (1, 1, 0.0), (1, 1, 0.0)]);
        assert_eq!(run(&mut batch, config(0, 1e-9, 4, 0)), 1);
    }

    #[test]
    fn test_non_pixels_untouched_and_skipped() {
        let mut batch = SignalBatch::from_records(&[
            SignalRecord::pixel(10, 10, 1.0e-7, 25.0),
            SignalRecord::timing(SignalType::Tdc, 1.02e-7, 0.0),
            SignalRecord::pixel(11, 10, 1.05e-7, 25.0),
        ]);
        assert_eq!(run(&mut batch, config(2, 5e-7, 2, 1)), 1);
        assert_eq!(batch.group_id, vec![0, NOT_CLUSTERABLE, 0]);
    }

    #[test]
    fn test_ids_in_first_core_order_and_deterministic() {
        let hits = [
            (50, 50, 0.0),
            (10, 10, 1e-9),
            (51, 50, 2e-9),
            (11, 10, 3e-9),
        ];
        let mut first = pixels(&hits);
        assert_eq!(run(&mut first, config(1, 1e-8, 2, 0)), 2);
        assert_eq!(first.group_id, vec![0, 1, 0, 1]);

        let mut second = pixels(&hits);
        run(&mut second, config(1, 1e-8, 2, 0));
        assert_eq!(first, second);
    }

    #[test]
    fn test_state_reuse_resets_labels() {
        let algo = StDbscanClustering::new(config(2, 5e-7, 2, 0));
        let mut state = algo.create_state();

        let mut a = pixels(&[(10, 10, 1.00e-7), (11, 10, 1.05e-7)]);
        assert_eq!(algo.cluster(&mut a, &mut state).unwrap(), 1);

        let mut b = pixels(&[(10, 10, 1.00e-7)]);
        assert_eq!(algo.cluster(&mut b, &mut state).unwrap(), 0);
        assert_eq!(b.group_id, vec![-1]);
    }
}
