// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end reconstruction scenarios on synthetic lattices.
//! Lattices use a 0.025 step, so every group estimates eps = 0.05.

use approx::assert_relative_eq;
use sketchmass_reconstruction::{
    cluster, cluster_with_report, extract_semantics, fuse, fuse_with_report, generate,
    generate_connectors, resolve_connectors, CandidateError, ConfidenceSource, ConnectorKind,
    CountPolicy, GenerationContext, Point, ReconstructionConfig, SpanAxis,
};

const STEP: f64 = 0.025;

/// Regular lattice over `[x0, x1] x [y0, y1]` at height `z`
fn lattice(x0: f64, x1: f64, y0: f64, y1: f64, z: f64) -> Vec<Point> {
    let nx = ((x1 - x0) / STEP).round() as usize;
    let ny = ((y1 - y0) / STEP).round() as usize;
    let mut points = Vec::with_capacity((nx + 1) * (ny + 1));
    for i in 0..=nx {
        for j in 0..=ny {
            points.push(Point::new(x0 + i as f64 * STEP, y0 + j as f64 * STEP, z));
        }
    }
    points
}

/// Three buildings side by side along x
fn three_buildings() -> Vec<Point> {
    let mut points = lattice(0.10, 0.25, 0.40, 0.55, 0.0);
    points.extend(lattice(0.40, 0.55, 0.40, 0.55, 0.0));
    points.extend(lattice(0.70, 0.85, 0.40, 0.55, 0.0));
    points
}

#[test]
fn test_three_separated_groups_give_three_clusters() {
    let config = ReconstructionConfig::default();
    let (clusters, report) = cluster_with_report(&three_buildings(), &config.clustering);

    assert_eq!(clusters.len(), 3);
    assert_eq!(report.groups, 3);
    assert_eq!(report.noise_points, 0);
    for eps in &report.eps_per_group {
        assert_relative_eq!(*eps, 0.05);
    }

    let centres: Vec<f64> = clusters.iter().map(|c| c.centroid.x).collect();
    assert_relative_eq!(centres[0], 0.175, epsilon = 1e-9);
    assert_relative_eq!(centres[1], 0.475, epsilon = 1e-9);
    assert_relative_eq!(centres[2], 0.775, epsilon = 1e-9);
    assert!(clusters.iter().all(|c| c.point_count == 49));
}

#[test]
fn test_clustering_is_idempotent() {
    let config = ReconstructionConfig::default();
    let points = three_buildings();
    assert_eq!(cluster(&points, &config.clustering), cluster(&points, &config.clustering));
}

#[test]
fn test_dbscan_separates_what_gap_split_cannot() {
    // Overlapping along x (the major axis), 0.08 apart along y
    let mut points = lattice(0.10, 0.60, 0.10, 0.20, 0.0);
    points.extend(lattice(0.30, 0.80, 0.28, 0.38, 0.0));

    let config = ReconstructionConfig::default();
    let (clusters, report) = cluster_with_report(&points, &config.clustering);

    assert_eq!(report.groups, 1);
    assert_eq!(clusters.len(), 2);
    assert_relative_eq!(clusters[0].centroid.y, 0.15, epsilon = 1e-9);
    assert_relative_eq!(clusters[1].centroid.y, 0.33, epsilon = 1e-9);
    assert_eq!(clusters[0].point_count + clusters[1].point_count, points.len());
}

#[test]
fn test_semantic_floors_drive_height() {
    let config = ReconstructionConfig::default();
    let clusters = cluster(&three_buildings(), &config.clustering);
    let raw = r#"```json
    {"buildings": [
        {"id": "tower", "type": "high_rise", "floors": 20, "position": {"x": 0.17, "y": 0.47}, "confidence": 0.90},
        {"id": "slab", "type": "high_rise", "floors": 15, "position": {"x": 0.48, "y": 0.48}, "confidence": 0.92},
        {"id": "block", "type": "mid_rise", "floors": 10, "position": {"x": 0.78, "y": 0.46}, "confidence": 0.94}
    ]}
    ```"#;
    let semantics = extract_semantics(raw);
    assert_eq!(semantics.candidates.len(), 3);

    let (records, decision) = fuse_with_report(&clusters, &semantics.candidates, &config);
    assert_eq!(decision.policy, CountPolicy::TrustSemantics);
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.confidence_source == ConfidenceSource::Vision));

    let heights: Vec<f64> = records.iter().map(|r| r.dimensions.height).collect();
    assert_relative_eq!(heights[0], 70.0);
    assert_relative_eq!(heights[1], 52.5);
    assert_relative_eq!(heights[2], 35.0);

    let labels: Vec<Option<usize>> = records.iter().map(|r| r.cluster_label).collect();
    assert_eq!(labels, vec![Some(0), Some(1), Some(2)]);
    assert_relative_eq!(records[0].dimensions.width, 15.0, epsilon = 1e-9);
}

#[test]
fn test_height_ignores_point_cloud_extent() {
    let config = ReconstructionConfig::default();
    // Eleven stacked layers: a z-extent of 0.4 reads as three floors
    let points: Vec<Point> = (0..=10)
        .flat_map(|layer| lattice(0.10, 0.25, 0.40, 0.55, layer as f64 * 0.04))
        .collect();
    let clusters = cluster(&points, &config.clustering);
    assert_eq!(clusters.len(), 1);
    assert_relative_eq!(clusters[0].bounding_box.height(), 0.4, epsilon = 1e-9);

    let semantics = extract_semantics(r#"[{"floors": 2, "center": [0.2, 0.5]}]"#);
    let records = fuse(&clusters, &semantics.candidates, &config);
    assert_eq!(records.len(), 1);
    assert_relative_eq!(records[0].dimensions.height, 7.0);
}

#[test]
fn test_empty_inputs_yield_no_records() {
    let config = ReconstructionConfig::default();
    let clusters = cluster(&[], &config.clustering);
    assert!(clusters.is_empty());
    assert!(fuse(&clusters, &[], &config).is_empty());
}

#[test]
fn test_generated_gfa_matches_record() {
    let config = ReconstructionConfig::default();
    let clusters = cluster(&three_buildings(), &config.clustering);
    let semantics = extract_semantics(
        r#"{"instances": [{"id": "B1", "rough_floors": 4, "center": [0.17, 0.47], "confidence": 0.6}]}"#,
    );
    let records = fuse(&clusters, &semantics.candidates, &config);
    // Counts differ by more than one, so the semantic count wins
    assert_eq!(records.len(), 1);

    let context = GenerationContext::default();
    for record in &records {
        let model = generate(record, &config, &context).unwrap();
        assert_eq!(model.floors.len(), record.floors as usize);
        assert_relative_eq!(
            model.parameters.gross_floor_area,
            record.dimensions.width * record.dimensions.depth * record.floors as f64,
            epsilon = 1e-9
        );
        assert_relative_eq!(model.parameters.building_height, record.floors as f64 * 3.5);
    }
}

#[test]
fn test_geometry_only_records_generate() {
    let config = ReconstructionConfig::default();
    let clusters = cluster(&three_buildings(), &config.clustering);
    let records = fuse(&clusters, &[], &config);
    assert_eq!(records.len(), 3);

    let context = GenerationContext::with_site_footprint(10_000.0);
    for record in &records {
        assert_eq!(record.confidence_source, ConfidenceSource::Pointcloud);
        assert_eq!(record.floors, 1);
        let model = generate(record, &config, &context).unwrap();
        assert_relative_eq!(
            model.parameters.volume_ratio,
            model.parameters.gross_floor_area / 10_000.0
        );
    }
}

#[test]
fn test_imperial_profile_scales_units() {
    let config = ReconstructionConfig::imperial();
    let clusters = cluster(&three_buildings(), &config.clustering);
    let semantics = extract_semantics(
        r#"[{"floors": 3, "center": [0.17, 0.47], "confidence": 0.9},
            {"floors": 3, "center": [0.48, 0.47], "confidence": 0.9},
            {"floors": 3, "center": [0.78, 0.47], "confidence": 0.9}]"#,
    );
    let records = fuse(&clusters, &semantics.candidates, &config);
    assert_eq!(records.len(), 3);
    assert_relative_eq!(records[0].dimensions.height, 34.5);
    assert!(records[0].dimensions.width > 45.0);

    let model = generate(&records[0], &config, &GenerationContext::default()).unwrap();
    assert_relative_eq!(model.floors[2].elevation, 23.0);
}

#[test]
fn test_dense_cloud_near_point_cap() {
    // 140 x 140 lattice: just under the default 20,000 point cap
    let n = 140;
    let step = 0.8 / (n - 1) as f64;
    let mut points = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            points.push(Point::new(0.1 + i as f64 * step, 0.1 + j as f64 * step, 0.0));
        }
    }
    let config = ReconstructionConfig::default();
    assert!(points.len() < config.preprocess.max_points);

    let (clusters, report) = cluster_with_report(&points, &config.clustering);
    assert_eq!(clusters.len(), 1);
    assert_eq!(report.noise_points, 0);
    assert_eq!(clusters[0].point_count, points.len());
}

#[test]
fn test_oversized_floor_count_never_reaches_generation() {
    let config = ReconstructionConfig::default();
    let raw = r#"[
        {"id": "huge", "floors": 4000000000, "center": [0.5, 0.5], "confidence": 0.9},
        {"id": "ok", "floors": 3, "center": [0.2, 0.5], "confidence": 0.9}
    ]"#;
    let semantics = extract_semantics(raw);
    assert_eq!(semantics.rejected.len(), 1);
    assert!(matches!(semantics.rejected[0].reason, CandidateError::InvalidFloors(_)));

    let records = fuse(&[], &semantics.candidates, &config);
    assert_eq!(records.len(), 1);
    let model = generate(&records[0], &config, &GenerationContext::default()).unwrap();
    assert_eq!(model.floors.len(), 3);
}

#[test]
fn test_bridge_between_matched_buildings() {
    let config = ReconstructionConfig::default();
    let raw = r#"{"buildings": [
        {"id": "west", "floors": 8, "position": {"x": 0.17, "y": 0.47}, "confidence": 0.9},
        {"id": "east", "floors": 4, "position": {"x": 0.48, "y": 0.47}, "confidence": 0.9}
    ], "connectors": [
        {"from": "west", "to": "east", "type": "bridge", "elev_hint": 3},
        {"from": "west", "to": "north"}
    ]}"#;
    let mut points = lattice(0.10, 0.25, 0.40, 0.55, 0.0);
    points.extend(lattice(0.40, 0.55, 0.40, 0.55, 0.0));

    let clusters = cluster(&points, &config.clustering);
    let semantics = extract_semantics(raw);
    assert_eq!(semantics.connectors.len(), 2);
    let records = fuse(&clusters, &semantics.candidates, &config);

    let connectors = resolve_connectors(&semantics.connectors, &records);
    assert_eq!(connectors.len(), 1);
    assert_eq!(connectors[0].kind, ConnectorKind::Bridge);

    let masses = generate_connectors(&connectors, &records, &config).unwrap();
    let bridge = &masses[0];
    assert_eq!(bridge.id, "bridge-west-east");
    assert_eq!(bridge.span_axis, SpanAxis::X);
    // Footprints end at x = 25 and start at x = 40
    assert_relative_eq!(bridge.origin.x, 25.0, epsilon = 1e-9);
    assert_relative_eq!(bridge.dimensions.width, 15.0, epsilon = 1e-9);
    assert_relative_eq!(bridge.origin.z, 7.0);
    assert!(bridge.origin.z + bridge.dimensions.height <= 14.0 + 1e-9);
}
