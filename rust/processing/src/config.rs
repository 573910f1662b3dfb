// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pipeline settings loaded from environment variables.

use crate::error::{PipelineError, Result};
use sketchmass_reconstruction::ReconstructionConfig;
use std::path::PathBuf;

/// Process-wide pipeline settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Number of worker threads for parallel processing.
    pub worker_threads: usize,
    /// Built-in reconstruction profile name.
    pub profile: String,
    /// JSON profile file; takes precedence over `profile` when set.
    pub config_path: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
            profile: "metric".into(),
            config_path: None,
        }
    }
}

impl PipelineSettings {
    /// Load settings from `WORKER_THREADS`, `SKETCHMASS_PROFILE` and
    /// `SKETCHMASS_CONFIG`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            worker_threads: lookup("WORKER_THREADS")
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or_else(num_cpus::get),
            profile: lookup("SKETCHMASS_PROFILE").unwrap_or_else(|| "metric".into()),
            config_path: lookup("SKETCHMASS_CONFIG")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Resolve the reconstruction profile these settings select.
    pub fn reconstruction_config(&self) -> Result<ReconstructionConfig> {
        if let Some(path) = &self.config_path {
            return Ok(ReconstructionConfig::from_json_file(path)?);
        }
        ReconstructionConfig::profile(&self.profile)
            .ok_or_else(|| PipelineError::UnknownProfile(self.profile.clone()))
    }
}
