// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Uniform grid hash for fixed-radius neighbour queries

use crate::types::Point;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

type CellKey = [i64; 3];

/// Grid index with cell edge equal to the query radius, so a radius query
/// only visits the 27 cells around the query point.
pub struct GridIndex<'a> {
    points: &'a [Point],
    cell: f64,
    buckets: FxHashMap<CellKey, SmallVec<[usize; 8]>>,
}

impl<'a> GridIndex<'a> {
    pub fn build(points: &'a [Point], cell: f64) -> Self {
        let cell = cell.max(1e-12);
        let mut buckets: FxHashMap<CellKey, SmallVec<[usize; 8]>> = FxHashMap::default();
        for (i, p) in points.iter().enumerate() {
            buckets.entry(key_of(p, cell)).or_default().push(i);
        }
        Self {
            points,
            cell,
            buckets,
        }
    }

    /// Indices of all points within `radius` of point `i`, excluding `i`.
    ///
    /// Results are ascending by index. `radius` must not exceed the cell size.
    pub fn within(&self, i: usize, radius: f64) -> SmallVec<[usize; 32]> {
        let p = &self.points[i];
        let base = key_of(p, self.cell);
        let r2 = radius * radius;

        let mut out: SmallVec<[usize; 32]> = SmallVec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = [base[0] + dx, base[1] + dy, base[2] + dz];
                    let Some(bucket) = self.buckets.get(&key) else {
                        continue;
                    };
                    for &j in bucket {
                        if j != i && p.distance_squared(&self.points[j]) <= r2 {
                            out.push(j);
                        }
                    }
                }
            }
        }
        out.sort_unstable();
        out
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn key_of(p: &Point, cell: f64) -> CellKey {
    let inv = 1.0 / cell;
    [
        (p.x * inv).floor() as i64,
        (p.y * inv).floor() as i64,
        (p.z * inv).floor() as i64,
    ]
}
