//! Photon event types.

use serde::{Deserialize, Serialize};

/// One reconstructed photon: the aggregate of a single pixel cluster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhotonEvent {
    /// Centroid X coordinate (sub-pixel precision).
    pub x: f64,
    /// Centroid Y coordinate (sub-pixel precision).
    pub y: f64,
    /// Representative time of arrival in seconds.
    pub toa: f64,
    /// Summed time over threshold in nanoseconds.
    pub tot: f64,
    /// Number of pixel hits in the cluster.
    pub multiplicity: u32,
    /// Cluster id the photon was built from.
    pub group_id: i32,
    /// Span of member X coordinates in pixels.
    pub x_extent: u16,
    /// Span of member Y coordinates in pixels.
    pub y_extent: u16,
    /// Latest minus earliest member ToA, in seconds.
    pub duration: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photon_serializes_all_fields() {
        let photon = PhotonEvent {
            x: 10.5,
            y: 20.25,
            toa: 1.0e-6,
            tot: 150.0,
            multiplicity: 3,
            group_id: 7,
            x_extent: 2,
            y_extent: 1,
            duration: 5.0e-8,
        };
        let value = serde_json::to_value(photon).unwrap();
        assert_eq!(value["multiplicity"], 3);
        assert_eq!(value["group_id"], 7);
        assert_eq!(value["x_extent"], 2);
    }
}
