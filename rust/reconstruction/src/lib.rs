// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Single-view building reconstruction
//!
//! Turns one sketch or photo into white-box building massing by fusing two
//! independent readings of the image:
//! 1. A depth-derived point cloud, grouped into building clusters
//! 2. A vision-language model's building list (type, floors, material)
//! 3. A fusion step that reconciles counts and attributes into one record
//!    per building
//! 4. Procedural massing (floors, rooms, facade, structure) per record, plus
//!    bridge and corridor masses between connected buildings
//!
//! # Usage
//!
//! ```rust,ignore
//! use sketchmass_reconstruction::{
//!     cluster, extract_semantics, fuse, generate, generate_connectors, resolve_connectors,
//!     GenerationContext, ReconstructionConfig,
//! };
//!
//! let config = ReconstructionConfig::default();
//! let clusters = cluster(&points, &config.clustering);
//! let semantics = extract_semantics(&vision_output);
//! let records = fuse(&clusters, &semantics.candidates, &config);
//!
//! let context = GenerationContext::default();
//! for record in &records {
//!     let model = generate(record, &config, &context)?;
//!     println!("{}: {} m2 GFA", record.id, model.parameters.gross_floor_area);
//! }
//!
//! let connectors = resolve_connectors(&semantics.connectors, &records);
//! let links = generate_connectors(&connectors, &records, &config)?;
//! ```

pub mod clustering;
pub mod config;
pub mod error;
pub mod fusion;
pub mod massing;
pub mod preprocess;
pub mod semantics;
pub mod types;

// Re-export commonly used types and functions
pub use clustering::{cluster, cluster_with_report, ClusteringReport};
pub use config::{
    ClusteringConfig, FusionConfig, MassingConfig, PreprocessConfig, ReconstructionConfig,
};
pub use error::{CandidateError, Error, GenerationError, Result};
pub use fusion::{
    assess_quality, decide_count, fuse, fuse_with_report, resolve_connectors, CountDecision,
    CountPolicy, FusionQuality, QualityLevel,
};
pub use massing::{generate, generate_connector, generate_connectors, GenerationContext};
pub use preprocess::{preprocess, PreprocessedCloud};
pub use semantics::{
    extract_semantics, extract_semantics_from_value, RejectedEntry, SemanticExtraction,
    MAX_FLOORS,
};
pub use types::{
    Building3DModel, BuildingSemanticCandidate, BuildingType, Cluster, ConfidenceSource,
    ConnectorCandidate, ConnectorKind, ConnectorMass, FusedBuildingRecord, FusedConnector, Point,
    Point2D, Point3D, SpanAxis,
};
