// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Procedural massing from fused building records
//!
//! Each record expands into stacked floor slabs, a room grid per floor, a
//! facade of windows and doors, and a column grid. The footprint is an
//! axis-aligned rectangle centred on the record position; the front facade
//! is the edge at minimum y.
//!
//! Connectors become box masses spanning the gap between two footprints.

use crate::config::{MassingConfig, ReconstructionConfig};
use crate::error::GenerationError;
use crate::types::{
    Building3DModel, Column, ConnectorMass, Dimensions, Door, Facade, FacadeSide, FloorKind,
    FloorSlab, FusedBuildingRecord, FusedConnector, MassingParameters, Point2D, Point3D, Room,
    SpanAxis, Structure, StructuralSystem, Window,
};

/// Relative tolerance for the height consistency check
const HEIGHT_TOLERANCE: f64 = 1e-6;

/// Site information shared by every building of a request
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationContext {
    /// Site area for the volume ratio; each building's own footprint when unset
    pub site_footprint: Option<f64>,
}

impl GenerationContext {
    pub fn with_site_footprint(site_footprint: f64) -> Self {
        Self {
            site_footprint: Some(site_footprint),
        }
    }
}

/// Expand one fused record into a massing model
pub fn generate(
    record: &FusedBuildingRecord,
    config: &ReconstructionConfig,
    context: &GenerationContext,
) -> Result<Building3DModel, GenerationError> {
    validate_record(record, config)?;
    if let Some(site) = context.site_footprint {
        if !(site.is_finite() && site > 0.0) {
            return Err(GenerationError::InvalidSiteFootprint(site));
        }
    }

    let width = record.dimensions.width;
    let depth = record.dimensions.depth;
    let origin = Point2D::new(record.position.x - width / 2.0, record.position.y - depth / 2.0);
    let grid_x = grid_lines(width, config.massing.structural_grid);
    let grid_y = grid_lines(depth, config.massing.structural_grid);

    let floors = stack_floors(record.floors, config.floor_height, width * depth);
    let rooms = partition_rooms(&record.id, &floors, origin, &grid_x, &grid_y);
    let facade = Facade {
        windows: place_windows(&floors, origin, width, depth, &config.massing),
        doors: place_doors(origin, &grid_x, &config.massing),
    };
    let structure = Structure {
        columns: place_columns(origin, &grid_x, &grid_y, record.dimensions.height),
        system: StructuralSystem::for_floors(record.floors),
    };

    let footprint = width * depth;
    let gross_floor_area = footprint * record.floors as f64;
    let site_footprint = context.site_footprint.unwrap_or(footprint);
    let parameters = MassingParameters {
        gross_floor_area,
        footprint,
        volume_ratio: gross_floor_area / site_footprint,
        building_height: record.dimensions.height,
        floor_height: config.floor_height,
    };

    tracing::debug!(
        id = %record.id,
        floors = floors.len(),
        rooms = rooms.len(),
        windows = facade.windows.len(),
        doors = facade.doors.len(),
        columns = structure.columns.len(),
        "Generated massing"
    );

    Ok(Building3DModel {
        record: record.clone(),
        floors,
        rooms,
        facade,
        structure,
        parameters,
    })
}

fn validate_record(
    record: &FusedBuildingRecord,
    config: &ReconstructionConfig,
) -> Result<(), GenerationError> {
    if record.floors < 1 {
        return Err(GenerationError::NoFloors {
            id: record.id.clone(),
        });
    }
    if record.floors > config.massing.max_floors {
        return Err(GenerationError::TooManyFloors {
            id: record.id.clone(),
            floors: record.floors,
            max: config.massing.max_floors,
        });
    }

    let dims = &record.dimensions;
    for (dimension, value) in [
        ("width", dims.width),
        ("depth", dims.depth),
        ("height", dims.height),
    ] {
        if !(value.is_finite() && value > 0.0) {
            return Err(GenerationError::NonPositiveDimension {
                id: record.id.clone(),
                dimension,
                value,
            });
        }
    }

    let expected = record.floors as f64 * config.floor_height;
    if (dims.height - expected).abs() > HEIGHT_TOLERANCE * expected.max(1.0) {
        return Err(GenerationError::HeightMismatch {
            id: record.id.clone(),
            floors: record.floors,
            expected,
            actual: dims.height,
        });
    }
    Ok(())
}

/// Offsets of structural grid lines from 0 to `length` inclusive; the last
/// bay takes whatever remains.
fn grid_lines(length: f64, spacing: f64) -> Vec<f64> {
    let mut lines = vec![0.0];
    let mut pos = 0.0;
    while pos + spacing < length - 1e-9 {
        pos += spacing;
        lines.push(pos);
    }
    lines.push(length);
    lines
}

fn stack_floors(count: u32, floor_height: f64, area: f64) -> Vec<FloorSlab> {
    (0..count)
        .map(|level| {
            let kind = if level == 0 {
                FloorKind::Ground
            } else if level == count - 1 {
                FloorKind::Roof
            } else {
                FloorKind::Typical
            };
            FloorSlab {
                level,
                elevation: level as f64 * floor_height,
                height: floor_height,
                kind,
                area,
            }
        })
        .collect()
}

fn partition_rooms(
    building_id: &str,
    floors: &[FloorSlab],
    origin: Point2D,
    grid_x: &[f64],
    grid_y: &[f64],
) -> Vec<Room> {
    let per_floor = (grid_x.len() - 1) * (grid_y.len() - 1);
    let mut rooms = Vec::with_capacity(per_floor * floors.len());
    for floor in floors {
        let mut index = 0;
        for xs in grid_x.windows(2) {
            for ys in grid_y.windows(2) {
                let width = xs[1] - xs[0];
                let depth = ys[1] - ys[0];
                rooms.push(Room {
                    id: format!("{}-L{}-R{}", building_id, floor.level, index),
                    level: floor.level,
                    origin: Point2D::new(origin.x + xs[0], origin.y + ys[0]),
                    width,
                    depth,
                    area: width * depth,
                });
                index += 1;
            }
        }
    }
    rooms
}

/// Point at arc length `s` along the perimeter, walking counter-clockwise
/// from the front-left corner
fn perimeter_point(s: f64, origin: Point2D, width: f64, depth: f64) -> (FacadeSide, Point2D) {
    if s < width {
        return (FacadeSide::Front, Point2D::new(origin.x + s, origin.y));
    }
    let s = s - width;
    if s < depth {
        return (FacadeSide::Right, Point2D::new(origin.x + width, origin.y + s));
    }
    let s = s - depth;
    if s < width {
        return (FacadeSide::Back, Point2D::new(origin.x + width - s, origin.y + depth));
    }
    let s = s - width;
    (FacadeSide::Left, Point2D::new(origin.x, origin.y + depth - s))
}

fn place_windows(
    floors: &[FloorSlab],
    origin: Point2D,
    width: f64,
    depth: f64,
    massing: &MassingConfig,
) -> Vec<Window> {
    let perimeter = 2.0 * (width + depth);
    let per_floor = (perimeter / massing.window_spacing).floor() as usize;
    if per_floor == 0 {
        return Vec::new();
    }
    let step = perimeter / per_floor as f64;

    let mut windows = Vec::with_capacity(per_floor * floors.len());
    for floor in floors {
        for k in 0..per_floor {
            let (side, at) = perimeter_point((k as f64 + 0.5) * step, origin, width, depth);
            windows.push(Window {
                level: floor.level,
                side,
                position: Point3D::new(at.x, at.y, floor.elevation + massing.window_sill),
                width: massing.window_width,
                height: massing.window_height,
            });
        }
    }
    windows
}

/// Ground floor entrances centred in evenly spaced bays of the front facade
fn place_doors(origin: Point2D, grid_x: &[f64], massing: &MassingConfig) -> Vec<Door> {
    let bays = grid_x.len() - 1;
    let count = (bays / massing.door_bay_interval.max(1)).max(1);

    (0..count)
        .map(|k| {
            let bay = (2 * k + 1) * bays / (2 * count);
            let centre = (grid_x[bay] + grid_x[bay + 1]) / 2.0;
            Door {
                level: 0,
                side: FacadeSide::Front,
                position: Point3D::new(origin.x + centre, origin.y, 0.0),
                width: massing.door_width,
                height: massing.door_height,
            }
        })
        .collect()
}

fn place_columns(origin: Point2D, grid_x: &[f64], grid_y: &[f64], height: f64) -> Vec<Column> {
    grid_x
        .iter()
        .flat_map(|&x| {
            grid_y.iter().map(move |&y| Column {
                position: Point2D::new(origin.x + x, origin.y + y),
                height,
            })
        })
        .collect()
}

/// Empty band between two footprints: the axis it runs along, where it
/// starts on that axis, and its length. `None` when the footprints touch or
/// overlap. The axis with the wider gap wins, x on ties.
pub(crate) fn span_between(
    a: &FusedBuildingRecord,
    b: &FusedBuildingRecord,
) -> Option<(SpanAxis, f64, f64)> {
    let bounds = |r: &FusedBuildingRecord| {
        let (hw, hd) = (r.dimensions.width / 2.0, r.dimensions.depth / 2.0);
        (
            [r.position.x - hw, r.position.y - hd],
            [r.position.x + hw, r.position.y + hd],
        )
    };
    let (a_min, a_max) = bounds(a);
    let (b_min, b_max) = bounds(b);

    let gap = |axis: usize| {
        if a_max[axis] <= b_min[axis] {
            (a_max[axis], b_min[axis] - a_max[axis])
        } else {
            (b_max[axis], a_min[axis] - b_max[axis])
        }
    };
    let (x_start, x_gap) = gap(0);
    let (y_start, y_gap) = gap(1);

    if x_gap <= 0.0 && y_gap <= 0.0 {
        None
    } else if x_gap >= y_gap {
        Some((SpanAxis::X, x_start, x_gap))
    } else {
        Some((SpanAxis::Y, y_start, y_gap))
    }
}

/// Expand resolved connectors into masses between their buildings
pub fn generate_connectors(
    connectors: &[FusedConnector],
    records: &[FusedBuildingRecord],
    config: &ReconstructionConfig,
) -> Result<Vec<ConnectorMass>, GenerationError> {
    connectors
        .iter()
        .map(|connector| {
            let from = find_record(records, connector, &connector.from)?;
            let to = find_record(records, connector, &connector.to)?;
            generate_connector(connector, from, to, config)
        })
        .collect()
}

fn find_record<'a>(
    records: &'a [FusedBuildingRecord],
    connector: &FusedConnector,
    id: &str,
) -> Result<&'a FusedBuildingRecord, GenerationError> {
    records
        .iter()
        .find(|r| r.id == id)
        .ok_or_else(|| GenerationError::UnknownConnectorEnd {
            id: connector.id.clone(),
            building: id.to_string(),
        })
}

/// Box mass linking two buildings across the gap between their footprints.
///
/// The cross-section is `width_hint` of the narrower facing side and
/// `height_hint` of the lower building, no smaller than the configured
/// minimums, and never wider or taller than the buildings it joins. The
/// underside sits on the connector level, capped to the lower building's top
/// floor.
pub fn generate_connector(
    connector: &FusedConnector,
    from: &FusedBuildingRecord,
    to: &FusedBuildingRecord,
    config: &ReconstructionConfig,
) -> Result<ConnectorMass, GenerationError> {
    validate_record(from, config)?;
    validate_record(to, config)?;
    let (span_axis, start, length) =
        span_between(from, to).ok_or_else(|| GenerationError::OverlappingConnector {
            id: connector.id.clone(),
            from: from.id.clone(),
            to: to.id.clone(),
        })?;

    // Centre and extent of each footprint across the span
    let across = |r: &FusedBuildingRecord| match span_axis {
        SpanAxis::X => (r.position.y, r.dimensions.depth),
        SpanAxis::Y => (r.position.x, r.dimensions.width),
    };
    let (from_centre, from_extent) = across(from);
    let (to_centre, to_extent) = across(to);

    let narrow = from_extent.min(to_extent);
    let width = (connector.width_hint * narrow)
        .max(config.massing.connector_min_width)
        .min(narrow);
    let lo = (from_centre - from_extent / 2.0).max(to_centre - to_extent / 2.0);
    let hi = (from_centre + from_extent / 2.0).min(to_centre + to_extent / 2.0);
    let centre = if hi > lo {
        (lo + hi) / 2.0
    } else {
        (from_centre + to_centre) / 2.0
    };

    let level = connector.level.min(from.floors.min(to.floors)).max(1);
    let elevation = (level - 1) as f64 * config.floor_height;
    let lower = from.dimensions.height.min(to.dimensions.height);
    let height = (connector.height_hint * lower)
        .max(config.massing.connector_min_height)
        .min(lower - elevation);

    let (origin, dimensions) = match span_axis {
        SpanAxis::X => (
            Point3D::new(start, centre - width / 2.0, elevation),
            Dimensions {
                width: length,
                depth: width,
                height,
            },
        ),
        SpanAxis::Y => (
            Point3D::new(centre - width / 2.0, start, elevation),
            Dimensions {
                width,
                depth: length,
                height,
            },
        ),
    };

    tracing::debug!(
        id = %connector.id,
        axis = ?span_axis,
        length,
        width,
        height,
        "Generated connector"
    );

    Ok(ConnectorMass {
        id: connector.id.clone(),
        from: from.id.clone(),
        to: to.id.clone(),
        kind: connector.kind,
        level,
        span_axis,
        origin,
        dimensions,
    })
}
