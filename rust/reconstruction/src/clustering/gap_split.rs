// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Gap pre-split along the dominant horizontal axis

use crate::types::Point;

/// Horizontal axis a split was computed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitAxis {
    X,
    Y,
}

impl SplitAxis {
    fn value(self, p: &Point) -> f64 {
        match self {
            SplitAxis::X => p.x,
            SplitAxis::Y => p.y,
        }
    }
}

/// Axis with the larger extent; x wins ties
pub fn dominant_axis(points: &[Point]) -> SplitAxis {
    let extent = |axis: SplitAxis| {
        let (lo, hi) = points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            let v = axis.value(p);
            (lo.min(v), hi.max(v))
        });
        if hi >= lo {
            hi - lo
        } else {
            0.0
        }
    };
    if extent(SplitAxis::X) >= extent(SplitAxis::Y) {
        SplitAxis::X
    } else {
        SplitAxis::Y
    }
}

/// Split points into groups wherever consecutive values along the dominant
/// axis are further apart than `ratio` times the axis extent.
///
/// Returns indices into `points`. Groups are ordered along the axis and each
/// group lists its points in sorted axis order (stable on input order).
pub fn split_by_gaps(points: &[Point], ratio: f64) -> (SplitAxis, Vec<Vec<usize>>) {
    let axis = dominant_axis(points);
    if points.is_empty() {
        return (axis, Vec::new());
    }

    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&a, &b| axis.value(&points[a]).total_cmp(&axis.value(&points[b])));

    let first = axis.value(&points[order[0]]);
    let last = axis.value(&points[order[order.len() - 1]]);
    let threshold = (last - first) * ratio;

    let mut groups = Vec::new();
    let mut current = vec![order[0]];
    for pair in order.windows(2) {
        let gap = axis.value(&points[pair[1]]) - axis.value(&points[pair[0]]);
        if gap > threshold {
            groups.push(std::mem::take(&mut current));
        }
        current.push(pair[1]);
    }
    groups.push(current);

    (axis, groups)
}
