// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Density radius estimation from k-nearest-neighbour distances

use crate::config::ClusteringConfig;
use crate::types::Point;

/// Median k-th neighbour distance over a strided sample, clamped into
/// `[eps_min, eps_max]`.
///
/// Distances are measured against the whole group. Groups with no more than
/// `k` points use their farthest neighbour instead.
pub fn estimate_eps(points: &[Point], config: &ClusteringConfig) -> f64 {
    if points.len() < 2 {
        return config.eps_min;
    }

    let k = config.min_pts.max(1).min(points.len() - 1);
    let sample_size = config.eps_sample_size.max(1);
    let stride = points.len().div_ceil(sample_size);

    let mut kth: Vec<f64> = points
        .iter()
        .enumerate()
        .step_by(stride)
        .map(|(i, p)| {
            let mut d2: Vec<f64> = points
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, q)| p.distance_squared(q))
                .collect();
            let (_, nth, _) = d2.select_nth_unstable_by(k - 1, f64::total_cmp);
            nth.sqrt()
        })
        .collect();

    kth.sort_by(f64::total_cmp);
    let mid = kth.len() / 2;
    let median = if kth.len() % 2 == 0 {
        (kth[mid - 1] + kth[mid]) / 2.0
    } else {
        kth[mid]
    };

    median.clamp(config.eps_min, config.eps_max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lattice(nx: usize, ny: usize, step: f64) -> Vec<Point> {
        let mut points = Vec::new();
        for i in 0..nx {
            for j in 0..ny {
                points.push(Point::new(0.1 + i as f64 * step, 0.1 + j as f64 * step, 0.0));
            }
        }
        points
    }

    #[test]
    fn test_dense_cloud_clamps_to_minimum() {
        let eps = estimate_eps(&lattice(10, 10, 0.01), &ClusteringConfig::default());
        assert_relative_eq!(eps, 0.05);
    }

    #[test]
    fn test_sparse_cloud_clamps_to_maximum() {
        let eps = estimate_eps(&lattice(4, 4, 0.3), &ClusteringConfig::default());
        assert_relative_eq!(eps, 0.15);
    }

    #[test]
    fn test_in_range_median() {
        // Interior 5th neighbour of a square lattice sits on the diagonal
        let eps = estimate_eps(&lattice(12, 12, 0.07), &ClusteringConfig::default());
        assert_relative_eq!(eps, 0.07 * 2f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_tiny_groups() {
        let config = ClusteringConfig::default();
        assert_relative_eq!(estimate_eps(&[], &config), config.eps_min);
        let pair = vec![Point::new(0.0, 0.0, 0.0), Point::new(0.1, 0.0, 0.0)];
        assert_relative_eq!(estimate_eps(&pair, &config), 0.1, epsilon = 1e-12);
    }
}
