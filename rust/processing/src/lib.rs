// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconstruction pipeline shared by the CLI and batch callers.
//!
//! One request flows through preprocess, clustering, semantic extraction,
//! fusion and massing generation (buildings, then their connectors). Requests share no mutable state, so a
//! batch runs one rayon task per request and buildings within a request are
//! generated in parallel as well.

pub mod config;
pub mod error;

pub use config::PipelineSettings;
pub use error::{PipelineError, Result};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sketchmass_reconstruction::{
    assess_quality, cluster_with_report, extract_semantics, fuse_with_report, generate,
    generate_connectors, preprocess, resolve_connectors, Building3DModel, ClusteringReport,
    ConnectorMass, CountDecision, FusionQuality, GenerationContext, GenerationError, Point,
    ReconstructionConfig, RejectedEntry,
};
use std::time::Instant;

/// One image to reconstruct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructionRequest {
    pub id: String,
    /// Depth-derived point cloud in normalized image space.
    pub points: Vec<Point>,
    /// Raw text returned by the vision-language model.
    pub vision_output: String,
    /// Site area for volume ratios, in square model units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_footprint: Option<f64>,
}

/// What a request produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "buildings", rename_all = "snake_case")]
pub enum ReconstructionOutcome {
    Buildings(Vec<Building3DModel>),
    /// Neither channel found a building; not an error.
    NoBuildingsIdentified,
}

/// Wall-clock time per stage (ms).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StageTimings {
    pub preprocess_ms: u64,
    pub clustering_ms: u64,
    pub semantics_ms: u64,
    pub fusion_ms: u64,
    pub generation_ms: u64,
    pub total_ms: u64,
}

/// Per-request processing statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ReconstructionStats {
    pub input_points: usize,
    /// Non-finite points removed during preprocessing.
    pub dropped_points: usize,
    pub processed_points: usize,
    pub downsampled: bool,
    pub clustering: ClusteringReport,
    pub cluster_count: usize,
    pub candidate_count: usize,
    pub rejected_entries: Vec<RejectedEntry>,
    /// Connectors read from the vision output, before resolution
    pub connector_candidates: usize,
    pub rejected_connectors: Vec<RejectedEntry>,
    pub malformed_payload: bool,
    pub timings: StageTimings,
}

/// Result of reconstructing one request.
#[derive(Debug, Clone, Serialize)]
pub struct Reconstruction {
    pub request_id: String,
    pub outcome: ReconstructionOutcome,
    /// Bridges and corridors between generated buildings
    pub connectors: Vec<ConnectorMass>,
    pub count_decision: CountDecision,
    pub quality: FusionQuality,
    pub stats: ReconstructionStats,
}

impl Reconstruction {
    /// Generated models, empty when no building was identified.
    pub fn buildings(&self) -> &[Building3DModel] {
        match &self.outcome {
            ReconstructionOutcome::Buildings(models) => models,
            ReconstructionOutcome::NoBuildingsIdentified => &[],
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Reconstruct building massing for one request.
pub fn reconstruct(
    request: &ReconstructionRequest,
    config: &ReconstructionConfig,
) -> Result<Reconstruction> {
    config.validate()?;
    let total_start = Instant::now();
    let mut timings = StageTimings::default();

    tracing::info!(
        request_id = %request.id,
        points = request.points.len(),
        profile = %config.name,
        "Starting reconstruction"
    );

    let stage = Instant::now();
    let cloud = preprocess(&request.points, &config.preprocess);
    timings.preprocess_ms = elapsed_ms(stage);

    let stage = Instant::now();
    let (clusters, clustering) = cluster_with_report(&cloud.points, &config.clustering);
    timings.clustering_ms = elapsed_ms(stage);

    let stage = Instant::now();
    let semantics = extract_semantics(&request.vision_output);
    timings.semantics_ms = elapsed_ms(stage);

    let stage = Instant::now();
    let (records, count_decision) = fuse_with_report(&clusters, &semantics.candidates, config);
    let geometry_score = if cloud.points.is_empty() {
        0.0
    } else {
        clustering.clustered_points as f64 / cloud.points.len() as f64
    };
    let quality = assess_quality(geometry_score, &semantics);
    let fused_connectors = resolve_connectors(&semantics.connectors, &records);
    timings.fusion_ms = elapsed_ms(stage);

    tracing::debug!(
        request_id = %request.id,
        clusters = clusters.len(),
        candidates = semantics.candidates.len(),
        policy = ?count_decision.policy,
        records = records.len(),
        connectors = fused_connectors.len(),
        "Fusion complete"
    );

    let stage = Instant::now();
    let context = GenerationContext {
        site_footprint: request.site_footprint,
    };
    let (models, connectors) = records
        .par_iter()
        .map(|record| generate(record, config, &context))
        .collect::<std::result::Result<Vec<_>, GenerationError>>()
        .and_then(|models| {
            let connectors = generate_connectors(&fused_connectors, &records, config)?;
            Ok((models, connectors))
        })
        .map_err(|source| PipelineError::Generation {
            request_id: request.id.clone(),
            source,
        })?;
    timings.generation_ms = elapsed_ms(stage);
    timings.total_ms = elapsed_ms(total_start);

    let outcome = if models.is_empty() {
        ReconstructionOutcome::NoBuildingsIdentified
    } else {
        ReconstructionOutcome::Buildings(models)
    };

    tracing::info!(
        request_id = %request.id,
        buildings = records.len(),
        connectors = connectors.len(),
        quality = ?quality.level,
        clustering_ms = timings.clustering_ms,
        generation_ms = timings.generation_ms,
        total_ms = timings.total_ms,
        "Reconstruction complete"
    );

    Ok(Reconstruction {
        request_id: request.id.clone(),
        outcome,
        connectors,
        count_decision,
        quality,
        stats: ReconstructionStats {
            input_points: request.points.len(),
            dropped_points: cloud.dropped,
            processed_points: cloud.points.len(),
            downsampled: cloud.downsampled,
            cluster_count: clusters.len(),
            clustering,
            candidate_count: semantics.candidates.len(),
            rejected_entries: semantics.rejected,
            connector_candidates: semantics.connectors.len(),
            rejected_connectors: semantics.rejected_connectors,
            malformed_payload: semantics.malformed_payload,
            timings,
        },
    })
}

/// Reconstruct many requests in parallel; results keep request order.
pub fn reconstruct_batch(
    requests: &[ReconstructionRequest],
    config: &ReconstructionConfig,
) -> Vec<Result<Reconstruction>> {
    let batch_start = Instant::now();
    let results: Vec<Result<Reconstruction>> = requests
        .par_iter()
        .map(|request| reconstruct(request, config))
        .collect();

    let failed = results.iter().filter(|r| r.is_err()).count();
    tracing::info!(
        requests = requests.len(),
        failed,
        total_ms = elapsed_ms(batch_start),
        "Batch complete"
    );
    results
}
