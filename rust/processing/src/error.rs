// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the reconstruction pipeline.

use sketchmass_reconstruction::GenerationError;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced at the request boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Request {request_id}: {source}")]
    Generation {
        request_id: String,
        #[source]
        source: GenerationError,
    },

    #[error(transparent)]
    Reconstruction(#[from] sketchmass_reconstruction::Error),

    #[error("Unknown profile '{0}' (expected 'metric' or 'imperial')")]
    UnknownProfile(String),
}
