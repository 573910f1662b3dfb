// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Point cloud cleanup ahead of clustering

use crate::config::PreprocessConfig;
use crate::types::Point;
use rustc_hash::FxHashSet;

/// Drop points with NaN or infinite coordinates. Returns the kept points and
/// the number dropped.
pub fn sanitize_points(points: &[Point]) -> (Vec<Point>, usize) {
    let kept: Vec<Point> = points.iter().filter(|p| p.is_finite()).cloned().collect();
    let dropped = points.len() - kept.len();
    (kept, dropped)
}

/// Min-max rescale each axis into [0, 1]. An axis with zero extent is
/// shifted to 0 without scaling.
pub fn normalize_points(points: &[Point]) -> Vec<Point> {
    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for p in points {
        for (axis, value) in [p.x, p.y, p.z].into_iter().enumerate() {
            min[axis] = min[axis].min(value);
            max[axis] = max[axis].max(value);
        }
    }

    let scale = |axis: usize| {
        let extent = max[axis] - min[axis];
        if extent > 0.0 {
            extent
        } else {
            1.0
        }
    };
    let (sx, sy, sz) = (scale(0), scale(1), scale(2));

    points
        .iter()
        .map(|p| Point {
            x: (p.x - min[0]) / sx,
            y: (p.y - min[1]) / sy,
            z: (p.z - min[2]) / sz,
            ..p.clone()
        })
        .collect()
}

/// Keep the first point falling into each voxel, preserving input order
pub fn voxel_downsample(points: &[Point], voxel: f64) -> Vec<Point> {
    let inv = 1.0 / voxel.max(1e-12);
    let mut seen: FxHashSet<[i64; 3]> = FxHashSet::default();
    points
        .iter()
        .filter(|p| {
            seen.insert([
                (p.x * inv).floor() as i64,
                (p.y * inv).floor() as i64,
                (p.z * inv).floor() as i64,
            ])
        })
        .cloned()
        .collect()
}

/// Outcome of [`preprocess`]
#[derive(Debug, Clone)]
pub struct PreprocessedCloud {
    pub points: Vec<Point>,
    /// Non-finite points removed
    pub dropped: usize,
    pub downsampled: bool,
}

/// Sanitize, downsample oversized clouds, and optionally normalize
pub fn preprocess(points: &[Point], config: &PreprocessConfig) -> PreprocessedCloud {
    let (mut cleaned, dropped) = sanitize_points(points);
    if dropped > 0 {
        tracing::warn!(dropped, "Dropped non-finite points");
    }

    let downsampled = cleaned.len() > config.max_points;
    if downsampled {
        let before = cleaned.len();
        cleaned = voxel_downsample(&cleaned, config.voxel_size);
        tracing::debug!(
            before,
            after = cleaned.len(),
            voxel = config.voxel_size,
            "Voxel downsampled point cloud"
        );
    }

    if config.normalize && !cleaned.is_empty() {
        cleaned = normalize_points(&cleaned);
    }

    PreprocessedCloud {
        points: cleaned,
        dropped,
        downsampled,
    }
}
