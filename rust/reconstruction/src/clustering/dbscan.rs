// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Density-based clustering (DBSCAN) over a grid index

use super::neighbors::GridIndex;
use crate::types::Point;

/// Label each point with its cluster, or `None` for noise.
///
/// A point is core when it has at least `min_pts` other points within `eps`.
/// Clusters are numbered from 0 in the order their first core point appears
/// in `points`, so identical input always produces identical labels.
pub fn dbscan(points: &[Point], eps: f64, min_pts: usize) -> Vec<Option<usize>> {
    expand_clusters(points, eps, min_pts).0
}

/// DBSCAN labels plus the largest frontier reached while expanding.
///
/// A point enters the frontier at most once over the whole run, so the
/// frontier never exceeds `points.len()`.
fn expand_clusters(points: &[Point], eps: f64, min_pts: usize) -> (Vec<Option<usize>>, usize) {
    let mut labels: Vec<Option<usize>> = vec![None; points.len()];
    if points.len() < min_pts {
        return (labels, 0);
    }

    let index = GridIndex::build(points, eps);
    let mut visited = vec![false; points.len()];
    let mut frontier: Vec<usize> = Vec::new();
    let mut peak_frontier = 0;
    let mut next_label = 0;

    for start in 0..points.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;

        let neighbors = index.within(start, eps);
        if neighbors.len() < min_pts {
            // Noise for now; may still become a border point of a later cluster
            continue;
        }

        let label = next_label;
        next_label += 1;
        labels[start] = Some(label);

        // Mark on push so each point is queued once
        let mut enqueue =
            |k: usize, frontier: &mut Vec<usize>, labels: &mut Vec<Option<usize>>| {
                if !visited[k] {
                    visited[k] = true;
                    frontier.push(k);
                } else if labels[k].is_none() {
                    labels[k] = Some(label);
                }
            };

        for &k in neighbors.iter().rev() {
            enqueue(k, &mut frontier, &mut labels);
        }
        while let Some(j) = frontier.pop() {
            peak_frontier = peak_frontier.max(frontier.len() + 1);
            if labels[j].is_none() {
                labels[j] = Some(label);
            }
            let reach = index.within(j, eps);
            if reach.len() >= min_pts {
                for &k in reach.iter().rev() {
                    enqueue(k, &mut frontier, &mut labels);
                }
            }
        }
    }

    (labels, peak_frontier)
}
