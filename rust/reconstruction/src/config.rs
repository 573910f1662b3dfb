// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reconstruction profiles
//!
//! Every component receives its configuration explicitly; there is no
//! module-level state, so concurrent requests may run different profiles
//! (e.g. metric and imperial) side by side.

use crate::error::{Error, Result};
use crate::semantics::MAX_FLOORS;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Point cloud preprocessing parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Clouds larger than this are voxel-downsampled
    pub max_points: usize,
    /// Voxel edge length in normalized space
    pub voxel_size: f64,
    /// Rescale each axis into [0, 1]. Off by default: input is expected to
    /// already be normalized in the same image space the vision model uses.
    pub normalize: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_points: 20_000,
            voxel_size: 0.005,
            normalize: false,
        }
    }
}

/// Adaptive clustering parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClusteringConfig {
    /// DBSCAN minimum neighbour count; also the k of the k-NN eps estimate
    pub min_pts: usize,
    /// A sorted-axis gap larger than this fraction of the axis extent splits groups
    pub gap_split_ratio: f64,
    /// Lower clamp for the estimated eps (normalized space)
    pub eps_min: f64,
    /// Upper clamp for the estimated eps (normalized space)
    pub eps_max: f64,
    /// Maximum number of points sampled for the k-NN eps estimate
    pub eps_sample_size: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_pts: 5,
            gap_split_ratio: 0.05,
            eps_min: 0.05,
            eps_max: 0.15,
            eps_sample_size: 100,
        }
    }
}

/// Fusion decision table thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FusionConfig {
    /// Average semantic confidence above which the semantic count is trusted
    pub semantic_trust_confidence: f64,
    /// Minimum number of semantic candidates for the confidence rule to apply
    pub min_semantic_count: usize,
    /// Count disagreement tolerated before semantics win outright
    pub count_tolerance: usize,
    /// z-extent breakpoints for geometry-only floor estimates: below the
    /// first -> 1 floor, below the second -> 2, else 3
    pub z_floor_breakpoints: [f64; 2],
    /// Smallest footprint edge taken from a cluster, in model units
    pub min_footprint_dimension: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            semantic_trust_confidence: 0.7,
            min_semantic_count: 2,
            count_tolerance: 1,
            z_floor_breakpoints: [0.15, 0.25],
            min_footprint_dimension: 3.0,
        }
    }
}

/// Procedural massing parameters, in model units
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MassingConfig {
    /// Structural grid spacing
    pub structural_grid: f64,
    /// Facade length per window
    pub window_spacing: f64,
    pub window_width: f64,
    pub window_height: f64,
    /// Sill height above floor level
    pub window_sill: f64,
    pub door_width: f64,
    pub door_height: f64,
    /// One door per this many structural bays along the front facade
    pub door_bay_interval: usize,
    /// Records with more floors are refused
    pub max_floors: u32,
    /// Narrowest connector cross-section
    pub connector_min_width: f64,
    /// Lowest connector clear height
    pub connector_min_height: f64,
}

impl Default for MassingConfig {
    fn default() -> Self {
        Self {
            structural_grid: 8.0,
            window_spacing: 4.0,
            window_width: 1.5,
            window_height: 1.8,
            window_sill: 0.9,
            door_width: 1.2,
            door_height: 2.4,
            door_bay_interval: 2,
            max_floors: MAX_FLOORS,
            connector_min_width: 3.0,
            connector_min_height: 3.0,
        }
    }
}

/// Complete reconstruction profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Profile label carried into logs
    pub name: String,
    /// Vertical spacing per floor in model units
    pub floor_height: f64,
    /// Model units spanned by one normalized image unit
    pub units_per_normalized: f64,
    /// Model units per metre (1.0 metric, ~3.28 imperial)
    pub units_per_metre: f64,
    pub preprocess: PreprocessConfig,
    pub clustering: ClusteringConfig,
    pub fusion: FusionConfig,
    pub massing: MassingConfig,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self::metric()
    }
}

const FEET_PER_METRE: f64 = 3.280_839_895;

impl ReconstructionConfig {
    /// Metric profile: 3.5 m floors on an 8 m grid
    pub fn metric() -> Self {
        Self {
            name: "metric".to_string(),
            floor_height: 3.5,
            units_per_normalized: 100.0,
            units_per_metre: 1.0,
            preprocess: PreprocessConfig::default(),
            clustering: ClusteringConfig::default(),
            fusion: FusionConfig::default(),
            massing: MassingConfig::default(),
        }
    }

    /// Imperial profile: 11.5 ft floors on a 26 ft grid
    pub fn imperial() -> Self {
        let metric = Self::metric();
        Self {
            name: "imperial".to_string(),
            floor_height: 11.5,
            units_per_normalized: metric.units_per_normalized * FEET_PER_METRE,
            units_per_metre: FEET_PER_METRE,
            fusion: FusionConfig {
                min_footprint_dimension: 10.0,
                ..metric.fusion
            },
            massing: MassingConfig {
                structural_grid: 26.0,
                window_spacing: 13.0,
                window_width: 5.0,
                window_height: 6.0,
                window_sill: 3.0,
                door_width: 4.0,
                door_height: 8.0,
                door_bay_interval: 2,
                max_floors: MAX_FLOORS,
                connector_min_width: 10.0,
                connector_min_height: 10.0,
            },
            ..metric
        }
    }

    /// Look up a built-in profile by name
    pub fn profile(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "metric" => Some(Self::metric()),
            "imperial" => Some(Self::imperial()),
            _ => None,
        }
    }

    /// Load a profile from a JSON file; missing fields take metric defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject profiles the algorithms cannot run with
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("floor_height", self.floor_height),
            ("units_per_normalized", self.units_per_normalized),
            ("units_per_metre", self.units_per_metre),
            ("preprocess.voxel_size", self.preprocess.voxel_size),
            ("clustering.gap_split_ratio", self.clustering.gap_split_ratio),
            ("clustering.eps_min", self.clustering.eps_min),
            ("fusion.min_footprint_dimension", self.fusion.min_footprint_dimension),
            ("massing.structural_grid", self.massing.structural_grid),
            ("massing.window_spacing", self.massing.window_spacing),
            ("massing.window_width", self.massing.window_width),
            ("massing.window_height", self.massing.window_height),
            ("massing.door_width", self.massing.door_width),
            ("massing.door_height", self.massing.door_height),
            ("massing.connector_min_width", self.massing.connector_min_width),
            ("massing.connector_min_height", self.massing.connector_min_height),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    field, value
                )));
            }
        }

        if self.clustering.eps_max < self.clustering.eps_min {
            return Err(Error::InvalidConfig(format!(
                "clustering.eps_max ({}) is below eps_min ({})",
                self.clustering.eps_max, self.clustering.eps_min
            )));
        }
        if self.clustering.min_pts == 0 {
            return Err(Error::InvalidConfig("clustering.min_pts must be at least 1".into()));
        }
        if self.massing.door_bay_interval == 0 {
            return Err(Error::InvalidConfig(
                "massing.door_bay_interval must be at least 1".into(),
            ));
        }
        if self.massing.max_floors == 0 {
            return Err(Error::InvalidConfig("massing.max_floors must be at least 1".into()));
        }
        let [first, second] = self.fusion.z_floor_breakpoints;
        if !(first < second) {
            return Err(Error::InvalidConfig(format!(
                "fusion.z_floor_breakpoints must be increasing, got [{}, {}]",
                first, second
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_metric() {
        let config = ReconstructionConfig::default();
        assert_eq!(config.name, "metric");
        assert_eq!(config.floor_height, 3.5);
        assert_eq!(config.massing.structural_grid, 8.0);
        assert_eq!(config.clustering.min_pts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_imperial_profile() {
        let config = ReconstructionConfig::imperial();
        assert!(config.validate().is_ok());
        assert_eq!(config.floor_height, 11.5);
        // Clustering works in normalized space and is unit independent
        assert_eq!(config.clustering, ClusteringConfig::default());
        assert!(config.units_per_normalized > 300.0);
    }

    #[test]
    fn test_profile_lookup() {
        assert_eq!(ReconstructionConfig::profile("Imperial").unwrap().name, "imperial");
        assert!(ReconstructionConfig::profile("nautical").is_none());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ReconstructionConfig =
            serde_json::from_str(r#"{"floor_height": 4.0, "massing": {"structural_grid": 9.0}}"#)
                .unwrap();
        assert_eq!(config.floor_height, 4.0);
        assert_eq!(config.massing.structural_grid, 9.0);
        assert_eq!(config.massing.window_spacing, 4.0);
        assert_eq!(config.fusion.semantic_trust_confidence, 0.7);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ReconstructionConfig::default();
        config.massing.structural_grid = 0.0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = ReconstructionConfig::default();
        config.clustering.eps_max = 0.01;
        assert!(config.validate().is_err());

        let mut config = ReconstructionConfig::default();
        config.fusion.z_floor_breakpoints = [0.3, 0.2];
        assert!(config.validate().is_err());

        let mut config = ReconstructionConfig::default();
        config.massing.max_floors = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_config_io_error() {
        let result = ReconstructionConfig::from_json_file(Path::new("/nonexistent/profile.json"));
        assert!(matches!(result, Err(Error::ConfigIo { .. })));
    }
}
