// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fusion of point cloud clusters with vision semantics
//!
//! Geometry (cluster extents) and semantics (floors, type, material) are
//! reconciled into one [`FusedBuildingRecord`] per building. How many
//! buildings exist is settled by [`decide_count`]; which cluster belongs to
//! which semantic reading is settled by [`pair_nearest`].
//!
//! Height is never read from the point cloud: the z-extent of depth-derived
//! points is unreliable, so every record's height is `floors * floor_height`.
//!
//! Connectors named by the vision model survive fusion only when both of
//! their ends became records ([`resolve_connectors`]).

use crate::config::{FusionConfig, ReconstructionConfig};
use crate::massing::span_between;
use crate::semantics::{average_confidence, SemanticExtraction};
use crate::types::{
    BuildingSemanticCandidate, BuildingType, Cluster, ConfidenceSource, ConnectorCandidate,
    FusedBuildingRecord, FusedConnector, Point2D,
};
use serde::{Deserialize, Serialize};

const UNKNOWN_MATERIAL: &str = "unknown";

/// Which channel decides the building count
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CountPolicy {
    /// Count = number of semantic candidates; unmatched clusters are dropped
    TrustSemantics,
    /// Count = number of clusters; there are no semantics
    TrustClusters,
    /// Count = the larger of both; every input yields a record
    TakeMaximum,
}

/// Outcome of count reconciliation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CountDecision {
    pub policy: CountPolicy,
    pub semantic_count: usize,
    pub cluster_count: usize,
    /// Number of records fusion will emit
    pub building_count: usize,
    pub average_confidence: f64,
}

/// Apply the count decision table.
///
/// | semantics                         | policy           |
/// |-----------------------------------|------------------|
/// | >= 2 and average confidence > 0.7 | `TrustSemantics` |
/// | none                              | `TrustClusters`  |
/// | counts differ by at most 1        | `TakeMaximum`    |
/// | otherwise                         | `TrustSemantics` |
pub fn decide_count(
    semantics: &[BuildingSemanticCandidate],
    cluster_count: usize,
    config: &FusionConfig,
) -> CountDecision {
    let semantic_count = semantics.len();
    let average = average_confidence(semantics);

    let policy = if semantic_count >= config.min_semantic_count.max(1)
        && average > config.semantic_trust_confidence
    {
        CountPolicy::TrustSemantics
    } else if semantic_count == 0 {
        CountPolicy::TrustClusters
    } else if semantic_count.abs_diff(cluster_count) <= config.count_tolerance {
        CountPolicy::TakeMaximum
    } else {
        CountPolicy::TrustSemantics
    };

    let building_count = match policy {
        CountPolicy::TrustSemantics => semantic_count,
        CountPolicy::TrustClusters => cluster_count,
        CountPolicy::TakeMaximum => semantic_count.max(cluster_count),
    };

    CountDecision {
        policy,
        semantic_count,
        cluster_count,
        building_count,
        average_confidence: average,
    }
}

/// Globally greedy nearest pairing of semantic positions to cluster
/// centroids in the image plane.
///
/// All pairs are ranked by distance (ties by semantic index, then cluster
/// index) and taken while both sides are still free. Returns
/// `(semantic_index, cluster_index)` sorted by semantic index.
pub fn pair_nearest(
    semantics: &[BuildingSemanticCandidate],
    clusters: &[Cluster],
) -> Vec<(usize, usize)> {
    let mut candidates: Vec<(f64, usize, usize)> =
        Vec::with_capacity(semantics.len() * clusters.len());
    for (si, semantic) in semantics.iter().enumerate() {
        for (ci, cluster) in clusters.iter().enumerate() {
            let d = semantic.normalized_position.distance_to(&cluster.centroid.xy());
            candidates.push((d, si, ci));
        }
    }
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut semantic_used = vec![false; semantics.len()];
    let mut cluster_used = vec![false; clusters.len()];
    let mut pairs = Vec::new();
    for (_, si, ci) in candidates {
        if semantic_used[si] || cluster_used[ci] {
            continue;
        }
        semantic_used[si] = true;
        cluster_used[ci] = true;
        pairs.push((si, ci));
    }
    pairs.sort_unstable();
    pairs
}

/// Fuse clusters and semantics into building records
pub fn fuse(
    clusters: &[Cluster],
    semantics: &[BuildingSemanticCandidate],
    config: &ReconstructionConfig,
) -> Vec<FusedBuildingRecord> {
    fuse_with_report(clusters, semantics, config).0
}

/// [`fuse`], also returning the count decision taken
pub fn fuse_with_report(
    clusters: &[Cluster],
    semantics: &[BuildingSemanticCandidate],
    config: &ReconstructionConfig,
) -> (Vec<FusedBuildingRecord>, CountDecision) {
    let decision = decide_count(semantics, clusters.len(), &config.fusion);
    tracing::debug!(
        policy = ?decision.policy,
        semantics = decision.semantic_count,
        clusters = decision.cluster_count,
        average_confidence = decision.average_confidence,
        "Count reconciled"
    );

    let pairs = pair_nearest(semantics, clusters);
    let mut semantic_matched = vec![false; semantics.len()];
    let mut cluster_matched = vec![false; clusters.len()];
    for &(si, ci) in &pairs {
        semantic_matched[si] = true;
        cluster_matched[ci] = true;
    }

    let matched_source = match decision.policy {
        CountPolicy::TakeMaximum => ConfidenceSource::Combined,
        _ => ConfidenceSource::Vision,
    };

    let mut records = Vec::with_capacity(decision.building_count);
    for &(si, ci) in &pairs {
        records.push(matched_record(&semantics[si], &clusters[ci], matched_source, config));
    }
    for (semantic, _) in semantics.iter().zip(&semantic_matched).filter(|(_, m)| !**m) {
        records.push(stub_record(semantic, config));
    }
    if decision.policy != CountPolicy::TrustSemantics {
        for (cluster, _) in clusters.iter().zip(&cluster_matched).filter(|(_, m)| !**m) {
            records.push(geometry_record(cluster, config));
        }
    }

    tracing::debug!(
        records = records.len(),
        matched = pairs.len(),
        "Fused building records"
    );
    (records, decision)
}

/// Footprint centre and extents of a cluster in model units
fn cluster_footprint(cluster: &Cluster, config: &ReconstructionConfig) -> (Point2D, f64, f64) {
    let scale = config.units_per_normalized;
    let min = config.fusion.min_footprint_dimension;
    let bbox = &cluster.bounding_box;
    let center = bbox.center();
    (
        Point2D::new(center.x * scale, center.y * scale),
        (bbox.width() * scale).max(min),
        (bbox.depth() * scale).max(min),
    )
}

fn matched_record(
    semantic: &BuildingSemanticCandidate,
    cluster: &Cluster,
    source: ConfidenceSource,
    config: &ReconstructionConfig,
) -> FusedBuildingRecord {
    let (position, width, depth) = cluster_footprint(cluster, config);
    FusedBuildingRecord::new(
        semantic.id.clone(),
        position,
        width,
        depth,
        semantic.floors,
        config.floor_height,
        semantic.building_type,
        semantic.material.clone(),
        source,
    )
    .with_cluster(cluster.label)
    .with_semantic_confidence(semantic.confidence)
}

fn stub_record(
    semantic: &BuildingSemanticCandidate,
    config: &ReconstructionConfig,
) -> FusedBuildingRecord {
    let (width, depth) = semantic.building_type.default_footprint();
    let p = semantic.normalized_position;
    FusedBuildingRecord::new(
        semantic.id.clone(),
        Point2D::new(p.x * config.units_per_normalized, p.y * config.units_per_normalized),
        width * config.units_per_metre,
        depth * config.units_per_metre,
        semantic.floors,
        config.floor_height,
        semantic.building_type,
        semantic.material.clone(),
        ConfidenceSource::Vision,
    )
    .with_semantic_confidence(semantic.confidence)
}

fn geometry_record(cluster: &Cluster, config: &ReconstructionConfig) -> FusedBuildingRecord {
    let (position, width, depth) = cluster_footprint(cluster, config);
    let floors = floors_from_extent(cluster.bounding_box.height(), &config.fusion);
    FusedBuildingRecord::new(
        format!("cluster-{}", cluster.label),
        position,
        width,
        depth,
        floors,
        config.floor_height,
        BuildingType::from_floors(floors),
        UNKNOWN_MATERIAL.to_string(),
        ConfidenceSource::Pointcloud,
    )
    .with_cluster(cluster.label)
}

/// Keep the connectors whose two ends name fused records.
///
/// A connector is dropped when an end is missing (e.g. its building lost
/// the count decision), when the two footprints touch or overlap, or when
/// the same pair of buildings is already linked. Input order is kept.
pub fn resolve_connectors(
    connectors: &[ConnectorCandidate],
    records: &[FusedBuildingRecord],
) -> Vec<FusedConnector> {
    let mut resolved: Vec<FusedConnector> = Vec::new();
    for candidate in connectors {
        let find = |id: &str| records.iter().find(|r| r.id == id);
        let (Some(from), Some(to)) = (find(&candidate.from), find(&candidate.to)) else {
            tracing::debug!(
                from = %candidate.from,
                to = %candidate.to,
                "Connector end has no building"
            );
            continue;
        };
        if span_between(from, to).is_none() {
            tracing::warn!(from = %from.id, to = %to.id, "Connected buildings overlap");
            continue;
        }
        let linked = resolved.iter().any(|c| {
            (c.from == candidate.from && c.to == candidate.to)
                || (c.from == candidate.to && c.to == candidate.from)
        });
        if linked {
            continue;
        }

        resolved.push(FusedConnector {
            id: format!("{}-{}-{}", candidate.kind.as_str(), candidate.from, candidate.to),
            from: candidate.from.clone(),
            to: candidate.to.clone(),
            kind: candidate.kind,
            width_hint: candidate.width_hint,
            height_hint: candidate.height_hint,
            level: candidate.level,
            confidence: candidate.confidence,
        });
    }
    resolved
}

/// Coarse floor estimate for clusters with no semantic reading
pub fn floors_from_extent(z_extent: f64, config: &FusionConfig) -> u32 {
    let [one, two] = config.z_floor_breakpoints;
    if z_extent < one {
        1
    } else if z_extent < two {
        2
    } else {
        3
    }
}

/// Coarse rating of how much the fused result can be trusted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FusionQuality {
    pub geometry_score: f64,
    pub semantics_score: f64,
    /// 0.6 * geometry + 0.4 * semantics
    pub total_score: f64,
    pub level: QualityLevel,
}

/// Rate a fusion from the share of points that clustered and the semantic
/// extraction.
///
/// The semantic score is the mean candidate confidence, 0.3 for a readable
/// but empty building list, and 0.2 for a malformed payload.
pub fn assess_quality(geometry_score: f64, semantics: &SemanticExtraction) -> FusionQuality {
    let geometry_score = if geometry_score.is_finite() {
        geometry_score.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let semantics_score = if semantics.malformed_payload {
        0.2
    } else if semantics.candidates.is_empty() {
        0.3
    } else {
        semantics.average_confidence()
    };

    let total_score = geometry_score * 0.6 + semantics_score * 0.4;
    let level = if total_score > 0.7 {
        QualityLevel::High
    } else if total_score > 0.4 {
        QualityLevel::Medium
    } else {
        QualityLevel::Low
    };

    FusionQuality {
        geometry_score,
        semantics_score,
        total_score,
        level,
    }
}
