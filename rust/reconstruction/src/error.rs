// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for reconstruction.
//!
//! Only massing generation can fail a request. Clustering and semantic
//! extraction degrade to fewer or zero results; a dropped vision entry is
//! described by a [`CandidateError`] but never propagated. Count
//! disagreements are resolved by the fusion decision table.

use serde::Serialize;
use thiserror::Error;

/// Result type alias for reconstruction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A fused record the massing generator refuses to expand.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("building {id}: floor count must be at least 1")]
    NoFloors { id: String },

    #[error("building {id}: {floors} floors exceeds the limit of {max}")]
    TooManyFloors { id: String, floors: u32, max: u32 },

    #[error("building {id}: {dimension} must be positive and finite, got {value}")]
    NonPositiveDimension {
        id: String,
        dimension: &'static str,
        value: f64,
    },

    #[error("building {id}: height {actual} does not match {floors} floors ({expected})")]
    HeightMismatch {
        id: String,
        floors: u32,
        expected: f64,
        actual: f64,
    },

    #[error("site footprint must be positive and finite, got {0}")]
    InvalidSiteFootprint(f64),

    #[error("connector {id}: no building with id {building}")]
    UnknownConnectorEnd { id: String, building: String },

    #[error("connector {id}: buildings {from} and {to} overlap, nothing to span")]
    OverlappingConnector { id: String, from: String, to: String },
}

/// Why a vision building or connector entry was dropped during semantic
/// extraction.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CandidateError {
    #[error("entry is not a JSON object")]
    NotAnObject,

    #[error("no position found")]
    MissingPosition,

    #[error("position is not finite")]
    NonFinitePosition,

    #[error("floor count must be an integer of at least 1, got {0}")]
    InvalidFloors(String),

    #[error("no floor count and no recognizable building type")]
    MissingFloors,

    #[error("confidence must lie in [0, 1], got {0}")]
    InvalidConfidence(f64),

    #[error("connector needs distinct `from` and `to` building ids")]
    MissingEndpoint,

    #[error("{field} must lie in (0, 1], got {value}")]
    InvalidHint { field: &'static str, value: f64 },

    #[error("connector level must be an integer of at least 1, got {0}")]
    InvalidLevel(String),
}

/// Errors that can occur in the reconstruction crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot read configuration {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
