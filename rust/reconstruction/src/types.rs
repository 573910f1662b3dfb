// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core types for single-view building reconstruction

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// A 2D point (simplified for serialization)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_nalgebra(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    pub fn from_nalgebra(p: &Point2<f64>) -> Self {
        Self { x: p.x, y: p.y }
    }

    pub fn distance_to(&self, other: &Point2D) -> f64 {
        nalgebra::distance(&self.to_nalgebra(), &other.to_nalgebra())
    }
}

/// A 3D point (simplified for serialization)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_nalgebra(&self) -> Point3<f64> {
        Point3::new(self.x, self.y, self.z)
    }

    pub fn from_nalgebra(p: &Point3<f64>) -> Self {
        Self {
            x: p.x,
            y: p.y,
            z: p.z,
        }
    }

    /// Drop the vertical component
    pub fn xy(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }
}

/// A single sample of the depth-derived point cloud.
///
/// Coordinates are normalized to [0, 1] in image/depth space.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Optional return intensity from the depth estimator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f32>,
    /// Provisional building tag assigned upstream (not trusted for clustering)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tag: Option<String>,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            intensity: None,
            source_tag: None,
        }
    }

    pub fn position(&self) -> Point3D {
        Point3D::new(self.x, self.y, self.z)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn distance_squared(&self, other: &Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        dx * dx + dy * dy + dz * dz
    }
}

/// Axis-aligned bounds of a point set
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox3 {
    pub min: Point3D,
    pub max: Point3D,
}

impl BoundingBox3 {
    /// Bounds of the given points, `None` for an empty slice
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut min = first.position();
        let mut max = min;
        for p in &points[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        Some(Self { min, max })
    }

    /// Extent along x
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Extent along y
    pub fn depth(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Extent along z
    pub fn height(&self) -> f64 {
        self.max.z - self.min.z
    }

    pub fn center(&self) -> Point3D {
        Point3D::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }
}

/// Candidate building point set produced by the clustering engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    /// Cluster label (0-based, stable for identical input)
    pub label: usize,
    /// Member points in scan order
    pub points: Vec<Point>,
    pub bounding_box: BoundingBox3,
    pub centroid: Point3D,
    pub point_count: usize,
}

impl Cluster {
    /// Build a cluster from its member points, `None` if there are none
    pub fn from_points(label: usize, points: Vec<Point>) -> Option<Self> {
        let bounding_box = BoundingBox3::from_points(&points)?;
        let sum = points
            .iter()
            .fold(nalgebra::Vector3::<f64>::zeros(), |acc, p| {
                acc + p.position().to_nalgebra().coords
            });
        let centroid = Point3::from(sum / points.len() as f64);

        Some(Self {
            label,
            point_count: points.len(),
            points,
            bounding_box,
            centroid: Point3D::from_nalgebra(&centroid),
        })
    }
}

/// Coarse building classification reported by the vision model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildingType {
    HighRise,
    MidRise,
    LowRise,
    SingleStory,
}

impl BuildingType {
    /// Parse the labels vision models commonly emit
    pub fn parse(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "high_rise" | "highrise" | "tower" | "skyscraper" => Some(Self::HighRise),
            "mid_rise" | "midrise" => Some(Self::MidRise),
            "low_rise" | "lowrise" => Some(Self::LowRise),
            "single_story" | "single_storey" | "one_story" | "bungalow" => Some(Self::SingleStory),
            _ => None,
        }
    }

    /// Classify a building from its floor count
    pub fn from_floors(floors: u32) -> Self {
        match floors {
            0 | 1 => Self::SingleStory,
            2..=6 => Self::LowRise,
            7..=11 => Self::MidRise,
            _ => Self::HighRise,
        }
    }

    /// Typical floor count when the model names a type but no floors
    pub fn typical_floors(&self) -> u32 {
        match self {
            Self::HighRise => 20,
            Self::MidRise => 8,
            Self::LowRise => 3,
            Self::SingleStory => 1,
        }
    }

    /// Default footprint (width, depth) in metres for records without geometry
    pub fn default_footprint(&self) -> (f64, f64) {
        match self {
            Self::HighRise => (40.0, 30.0),
            Self::MidRise => (35.0, 25.0),
            Self::LowRise | Self::SingleStory => (30.0, 20.0),
        }
    }
}

/// Validated building reading from the vision-language model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildingSemanticCandidate {
    pub id: String,
    /// Position in normalized image space
    pub normalized_position: Point2D,
    #[serde(rename = "type")]
    pub building_type: BuildingType,
    /// Always >= 1
    pub floors: u32,
    pub material: String,
    /// Always within [0, 1]
    pub confidence: f64,
}

/// Which channel an attribute set was taken from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    Vision,
    Pointcloud,
    Combined,
}

/// Physical building extents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Dimensions {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
}

/// Reconciled single-source-of-truth description of one building
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusedBuildingRecord {
    pub id: String,
    /// Footprint centre in model units
    pub position: Point2D,
    pub dimensions: Dimensions,
    pub floors: u32,
    #[serde(rename = "type")]
    pub building_type: BuildingType,
    pub material: String,
    pub confidence_source: ConfidenceSource,
    /// Label of the cluster this record was measured from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_label: Option<usize>,
    /// Confidence of the semantic candidate this record was read from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_confidence: Option<f64>,
}

impl FusedBuildingRecord {
    /// Create a record; height is always `floors * floor_height`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        position: Point2D,
        width: f64,
        depth: f64,
        floors: u32,
        floor_height: f64,
        building_type: BuildingType,
        material: String,
        confidence_source: ConfidenceSource,
    ) -> Self {
        Self {
            id,
            position,
            dimensions: Dimensions {
                width,
                depth,
                height: floors as f64 * floor_height,
            },
            floors,
            building_type,
            material,
            confidence_source,
            cluster_label: None,
            semantic_confidence: None,
        }
    }

    pub fn with_cluster(mut self, label: usize) -> Self {
        self.cluster_label = Some(label);
        self
    }

    pub fn with_semantic_confidence(mut self, confidence: f64) -> Self {
        self.semantic_confidence = Some(confidence);
        self
    }

    pub fn footprint_area(&self) -> f64 {
        self.dimensions.width * self.dimensions.depth
    }
}

/// Floor slab classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FloorKind {
    Ground,
    Typical,
    Roof,
}

/// One storey of the massing model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FloorSlab {
    /// Level index (0 = ground)
    pub level: u32,
    /// Base elevation
    pub elevation: f64,
    /// Floor-to-floor height
    pub height: f64,
    pub kind: FloorKind,
    /// Slab area
    pub area: f64,
}

/// A structural-grid cell on one floor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: String,
    pub level: u32,
    /// Cell corner in building-local coordinates (footprint min corner = origin)
    pub origin: Point2D,
    pub width: f64,
    pub depth: f64,
    pub area: f64,
}

/// Facade side, walking counter-clockwise from the front (y = 0) edge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FacadeSide {
    Front,
    Right,
    Back,
    Left,
}

/// Window opening
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Window {
    pub level: u32,
    pub side: FacadeSide,
    /// Opening centre at sill height, building-local coordinates
    pub position: Point3D,
    pub width: f64,
    pub height: f64,
}

/// Door opening
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Door {
    pub level: u32,
    pub side: FacadeSide,
    /// Opening centre at floor level, building-local coordinates
    pub position: Point3D,
    pub width: f64,
    pub height: f64,
}

/// Facade openings of the whole building
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Facade {
    pub windows: Vec<Window>,
    pub doors: Vec<Door>,
}

/// Vertical column at a grid intersection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    /// Building-local position
    pub position: Point2D,
    pub height: f64,
}

/// Structural system classification (not a structural design)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StructuralSystem {
    Frame,
    FrameShearWall,
    CoreAndOutrigger,
}

impl StructuralSystem {
    pub fn for_floors(floors: u32) -> Self {
        match floors {
            0..=8 => Self::Frame,
            9..=20 => Self::FrameShearWall,
            _ => Self::CoreAndOutrigger,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Structure {
    pub columns: Vec<Column>,
    #[serde(rename = "type")]
    pub system: StructuralSystem,
}

/// Derived massing metrics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MassingParameters {
    pub gross_floor_area: f64,
    pub footprint: f64,
    pub volume_ratio: f64,
    pub building_height: f64,
    pub floor_height: f64,
}

/// Final parametric massing model of one building
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Building3DModel {
    pub record: FusedBuildingRecord,
    pub floors: Vec<FloorSlab>,
    pub rooms: Vec<Room>,
    pub facade: Facade,
    pub structure: Structure,
    pub parameters: MassingParameters,
}

/// How a connector links two buildings
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorKind {
    /// Elevated link between upper floors
    Bridge,
    /// Any other enclosed link; the fallback for unknown labels
    Corridor,
}

impl ConnectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bridge => "bridge",
            Self::Corridor => "corridor",
        }
    }

    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "bridge" | "skybridge" | "sky_bridge" | "skywalk" => Self::Bridge,
            _ => Self::Corridor,
        }
    }
}

/// Validated connector reading from the vision-language model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectorCandidate {
    /// Building id at one end, as named by the model
    pub from: String,
    /// Building id at the other end
    pub to: String,
    #[serde(rename = "type")]
    pub kind: ConnectorKind,
    /// Connector width as a fraction of the narrower building, in (0, 1]
    pub width_hint: f64,
    /// Connector height as a fraction of the lower building, in (0, 1]
    pub height_hint: f64,
    /// Floor the connector starts on (1 = ground)
    pub level: u32,
    pub confidence: f64,
}

/// A connector whose ends both resolved to fused building records
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FusedConnector {
    /// `{kind}-{from}-{to}`
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: ConnectorKind,
    pub width_hint: f64,
    pub height_hint: f64,
    pub level: u32,
    pub confidence: f64,
}

/// Horizontal axis a connector spans
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpanAxis {
    X,
    Y,
}

/// Box-shaped mass bridging the gap between two building footprints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectorMass {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: ConnectorKind,
    pub level: u32,
    pub span_axis: SpanAxis,
    /// Minimum corner in model units; z is the underside elevation
    pub origin: Point3D,
    /// Extents along x, y and z
    pub dimensions: Dimensions,
}
