// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Adaptive clustering of point clouds into building candidates
//!
//! Three stages, none of which needs a caller-supplied radius:
//!
//! 1. [`gap_split`] cuts the cloud wherever the dominant horizontal axis
//!    shows an empty band wider than a fraction of its extent.
//! 2. [`eps`] estimates a density radius per group from k-NN distances.
//! 3. [`dbscan`] separates buildings inside each group that the gap split
//!    could not tell apart.

pub mod dbscan;
pub mod eps;
pub mod gap_split;
pub mod neighbors;

pub use dbscan::dbscan;
pub use eps::estimate_eps;
pub use gap_split::{split_by_gaps, SplitAxis};
pub use neighbors::GridIndex;

use crate::config::ClusteringConfig;
use crate::types::{Cluster, Point};
use serde::{Deserialize, Serialize};

/// Diagnostics from one clustering run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClusteringReport {
    /// Groups produced by the gap pre-split
    pub groups: usize,
    /// Estimated eps for each group large enough to cluster, in group order
    pub eps_per_group: Vec<f64>,
    pub noise_points: usize,
    pub clustered_points: usize,
}

/// Cluster a normalized point cloud into building candidates
pub fn cluster(points: &[Point], config: &ClusteringConfig) -> Vec<Cluster> {
    cluster_with_report(points, config).0
}

/// [`cluster`], also returning per-stage diagnostics
pub fn cluster_with_report(
    points: &[Point],
    config: &ClusteringConfig,
) -> (Vec<Cluster>, ClusteringReport) {
    let mut report = ClusteringReport::default();
    if points.is_empty() {
        return (Vec::new(), report);
    }

    let (axis, groups) = split_by_gaps(points, config.gap_split_ratio);
    report.groups = groups.len();
    tracing::debug!(?axis, groups = groups.len(), "Gap pre-split");

    let mut clusters = Vec::new();
    for group in &groups {
        let members: Vec<Point> = group.iter().map(|&i| points[i].clone()).collect();
        if members.len() < config.min_pts {
            report.noise_points += members.len();
            continue;
        }

        let eps = estimate_eps(&members, config);
        report.eps_per_group.push(eps);

        let labels = dbscan(&members, eps, config.min_pts);
        let found = labels.iter().flatten().max().map_or(0, |&m| m + 1);
        let mut buckets: Vec<Vec<Point>> = vec![Vec::new(); found];
        for (point, label) in members.into_iter().zip(&labels) {
            match label {
                Some(label) => buckets[*label].push(point),
                None => report.noise_points += 1,
            }
        }

        tracing::debug!(points = group.len(), eps, clusters = found, "Clustered group");

        for bucket in buckets {
            if let Some(cluster) = Cluster::from_points(clusters.len(), bucket) {
                report.clustered_points += cluster.point_count;
                clusters.push(cluster);
            }
        }
    }

    (clusters, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice(x0: f64, x1: f64, y0: f64, y1: f64) -> Vec<Point> {
        let step = 0.025;
        let nx = ((x1 - x0) / step).round() as usize;
        let ny = ((y1 - y0) / step).round() as usize;
        let mut points = Vec::new();
        for i in 0..=nx {
            for j in 0..=ny {
                points.push(Point::new(x0 + i as f64 * step, y0 + j as f64 * step, 0.05));
            }
        }
        points
    }

    #[test]
    fn test_empty_cloud() {
        let (clusters, report) = cluster_with_report(&[], &ClusteringConfig::default());
        assert!(clusters.is_empty());
        assert_eq!(report, ClusteringReport::default());
    }

    #[test]
    fn test_gap_separated_buildings() {
        let mut points = lattice(0.10, 0.25, 0.40, 0.55);
        points.extend(lattice(0.70, 0.85, 0.40, 0.55));
        let (clusters, report) = cluster_with_report(&points, &ClusteringConfig::default());
        assert_eq!(clusters.len(), 2);
        assert_eq!(report.groups, 2);
        assert_eq!(report.noise_points, 0);
        assert_eq!(report.clustered_points, points.len());
        assert!(clusters[0].centroid.x < clusters[1].centroid.x);
        assert_eq!(clusters[0].label, 0);
        assert_eq!(clusters[1].label, 1);
    }

    #[test]
    fn test_small_group_is_noise() {
        let mut points = lattice(0.10, 0.25, 0.40, 0.55);
        points.push(Point::new(0.9, 0.45, 0.05));
        points.push(Point::new(0.91, 0.45, 0.05));
        let (clusters, report) = cluster_with_report(&points, &ClusteringConfig::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(report.noise_points, 2);
        assert_eq!(report.eps_per_group.len(), 1);
    }
}
