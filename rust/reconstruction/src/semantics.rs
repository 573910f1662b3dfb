// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Vision model output parsing
//!
//! Turns the free-form text returned by a vision-language model into
//! validated [`BuildingSemanticCandidate`]s. Models wrap JSON in Markdown
//! fences, prepend prose, and mix two field layouts:
//!
//! ```json
//! {"buildings": [{"id": "A", "type": "high_rise", "floors": 20,
//!                 "position": {"x": 0.2, "y": 0.5}, "confidence": 0.9}]}
//! {"instances": [{"id": "B1", "building_type": "office", "rough_floors": 6,
//!                 "center": [0.4, 0.6], "confidence": 0.8}]}
//! ```
//!
//! Objects may also carry a `connectors` list (or, failing that,
//! `spatial_relations` with `"relationship": "connected"`) linking buildings
//! by id:
//!
//! ```json
//! {"connectors": [{"from": "A", "to": "B", "type": "bridge",
//!                  "width_hint": 0.2, "height_hint": 0.15, "elev_hint": 2}]}
//! ```
//!
//! Entries that fail validation are dropped and reported, never fatal.

use crate::error::CandidateError;
use crate::types::{
    BuildingSemanticCandidate, BuildingType, ConnectorCandidate, ConnectorKind, Point2D,
};
use serde::Serialize;
use serde_json::{Map, Value};

/// Largest floor count accepted from a model response
pub const MAX_FLOORS: u32 = 100;

const DEFAULT_CONFIDENCE: f64 = 0.5;
const UNKNOWN_MATERIAL: &str = "unknown";

const DEFAULT_CONNECTOR_CONFIDENCE: f64 = 0.7;
const DEFAULT_WIDTH_HINT: f64 = 0.2;
const DEFAULT_HEIGHT_HINT: f64 = 0.15;
const DEFAULT_CONNECTOR_LEVEL: u32 = 2;

/// Candidate start brackets tried before a response is declared malformed
const MAX_RECOVERY_ATTEMPTS: usize = 64;

/// A vision entry that failed validation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedEntry {
    /// Position of the entry in the list it came from
    pub index: usize,
    pub reason: CandidateError,
}

/// Result of parsing one model response
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SemanticExtraction {
    pub candidates: Vec<BuildingSemanticCandidate>,
    pub rejected: Vec<RejectedEntry>,
    pub connectors: Vec<ConnectorCandidate>,
    pub rejected_connectors: Vec<RejectedEntry>,
    /// No building list could be recovered from the response
    pub malformed_payload: bool,
}

impl SemanticExtraction {
    fn malformed() -> Self {
        Self {
            malformed_payload: true,
            ..Self::default()
        }
    }

    /// Mean candidate confidence, 0 when there are none
    pub fn average_confidence(&self) -> f64 {
        average_confidence(&self.candidates)
    }
}

/// Mean confidence of a candidate list, 0 when empty
pub fn average_confidence(candidates: &[BuildingSemanticCandidate]) -> f64 {
    if candidates.is_empty() {
        return 0.0;
    }
    candidates.iter().map(|c| c.confidence).sum::<f64>() / candidates.len() as f64
}

/// Parse raw model output into validated candidates
pub fn extract_semantics(raw_model_output: &str) -> SemanticExtraction {
    match recover_payload(raw_model_output) {
        Some(doc) => extract_semantics_from_value(&doc),
        None => {
            tracing::warn!(len = raw_model_output.len(), "No JSON payload in vision output");
            SemanticExtraction::malformed()
        }
    }
}

/// Validate an already-parsed vision document
pub fn extract_semantics_from_value(doc: &Value) -> SemanticExtraction {
    let Some(entries) = building_list(doc) else {
        tracing::warn!("Vision payload has no building list");
        return SemanticExtraction::malformed();
    };

    let mut extraction = SemanticExtraction::default();
    for (index, entry) in entries.iter().enumerate() {
        match parse_entry(index, entry) {
            Ok(candidate) => extraction.candidates.push(candidate),
            Err(reason) => {
                tracing::warn!(index, reason = %reason, "Dropped vision entry");
                extraction.rejected.push(RejectedEntry { index, reason });
            }
        }
    }

    if let Some(map) = doc.as_object() {
        read_connectors(map, &mut extraction);
    }

    tracing::debug!(
        candidates = extraction.candidates.len(),
        rejected = extraction.rejected.len(),
        connectors = extraction.connectors.len(),
        "Extracted building semantics"
    );
    extraction
}

/// Explicit `connectors`, or `connected` entries of `spatial_relations`
fn read_connectors(doc: &Map<String, Value>, extraction: &mut SemanticExtraction) {
    let entries: Vec<(usize, &Value)> = match doc.get("connectors").and_then(Value::as_array) {
        Some(list) => list.iter().enumerate().collect(),
        None => doc
            .get("spatial_relations")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .enumerate()
                    .filter(|(_, rel)| {
                        rel.get("relationship").and_then(Value::as_str) == Some("connected")
                    })
                    .collect()
            })
            .unwrap_or_default(),
    };

    for (index, entry) in entries {
        match parse_connector(entry) {
            Ok(connector) => extraction.connectors.push(connector),
            Err(reason) => {
                tracing::warn!(index, reason = %reason, "Dropped vision connector");
                extraction.rejected_connectors.push(RejectedEntry { index, reason });
            }
        }
    }
}

fn building_list(doc: &Value) -> Option<&Vec<Value>> {
    match doc {
        Value::Array(entries) => Some(entries),
        Value::Object(map) => ["buildings", "instances", "volumes"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array)),
        _ => None,
    }
}

/// Recover the first parseable JSON object or array from model text
fn recover_payload(raw: &str) -> Option<Value> {
    let text = strip_code_fences(raw);
    if let Ok(doc) = serde_json::from_str::<Value>(text) {
        if doc.is_object() || doc.is_array() {
            return Some(doc);
        }
    }

    text.char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .take(MAX_RECOVERY_ATTEMPTS)
        .find_map(|(start, _)| {
            let span = balanced_span(&text[start..])?;
            serde_json::from_str::<Value>(span).ok()
        })
}

/// Contents of the first Markdown code fence, or the whole text
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[open + 3..];
    // Skip the info string (e.g. "json")
    let body = match after.find('\n') {
        Some(newline) => &after[newline + 1..],
        None => after,
    };
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Prefix of `text` (which starts with `{` or `[`) up to its matching
/// closer, skipping brackets inside string literals
fn balanced_span(text: &str) -> Option<&str> {
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                if closers.pop() != Some(c) {
                    return None;
                }
                if closers.is_empty() {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_entry(index: usize, entry: &Value) -> Result<BuildingSemanticCandidate, CandidateError> {
    let map = entry.as_object().ok_or(CandidateError::NotAnObject)?;

    let id = map
        .get("id")
        .and_then(read_id)
        .unwrap_or_else(|| format!("v{}", index + 1));

    let normalized_position = read_position(entry)?;

    let declared_type = ["type", "building_type"]
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_str))
        .find_map(BuildingType::parse);

    let declared_floors = match ["floors", "rough_floors", "levels"]
        .iter()
        .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
    {
        Some(value) => Some(read_floors(value)?),
        None => None,
    };

    let (building_type, floors) = match (declared_type, declared_floors) {
        (Some(t), Some(f)) => (t, f),
        (None, Some(f)) => (BuildingType::from_floors(f), f),
        (Some(t), None) => (t, t.typical_floors()),
        (None, None) => return Err(CandidateError::MissingFloors),
    };

    let confidence = read_confidence(map, DEFAULT_CONFIDENCE)?;

    let material = map
        .get("material")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(UNKNOWN_MATERIAL)
        .to_string();

    Ok(BuildingSemanticCandidate {
        id,
        normalized_position,
        building_type,
        floors,
        material,
        confidence,
    })
}

fn parse_connector(entry: &Value) -> Result<ConnectorCandidate, CandidateError> {
    let map = entry.as_object().ok_or(CandidateError::NotAnObject)?;

    let from = map.get("from").and_then(read_id);
    let to = map.get("to").and_then(read_id);
    let (from, to) = match (from, to) {
        (Some(from), Some(to)) if from != to => (from, to),
        _ => return Err(CandidateError::MissingEndpoint),
    };

    let kind = ["type", "connection_type"]
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map_or(ConnectorKind::Corridor, ConnectorKind::parse);

    let level = match ["elev_hint", "connection_level"]
        .iter()
        .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
    {
        Some(value) => read_count(value)
            .ok_or_else(|| CandidateError::InvalidLevel(value.to_string()))?,
        None => DEFAULT_CONNECTOR_LEVEL,
    };

    Ok(ConnectorCandidate {
        from,
        to,
        kind,
        width_hint: read_hint(map, "width_hint", DEFAULT_WIDTH_HINT)?,
        height_hint: read_hint(map, "height_hint", DEFAULT_HEIGHT_HINT)?,
        level,
        confidence: read_confidence(map, DEFAULT_CONNECTOR_CONFIDENCE)?,
    })
}

/// Non-blank string or number
fn read_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn read_confidence(map: &Map<String, Value>, default: f64) -> Result<f64, CandidateError> {
    match map.get("confidence") {
        None | Some(Value::Null) => Ok(default),
        Some(value) => {
            let c = as_number(value).unwrap_or(f64::NAN);
            if !(0.0..=1.0).contains(&c) {
                return Err(CandidateError::InvalidConfidence(c));
            }
            Ok(c)
        }
    }
}

fn read_hint(
    map: &Map<String, Value>,
    field: &'static str,
    default: f64,
) -> Result<f64, CandidateError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => {
            let hint = as_number(value).unwrap_or(f64::NAN);
            if !(hint > 0.0 && hint <= 1.0) {
                return Err(CandidateError::InvalidHint { field, value: hint });
            }
            Ok(hint)
        }
    }
}

/// Floor count from an integer, an integral float, a numeric string, or
/// `{"count": n}`
fn read_floors(value: &Value) -> Result<u32, CandidateError> {
    read_count(value).ok_or_else(|| CandidateError::InvalidFloors(value.to_string()))
}

/// Integral count in `1..=MAX_FLOORS`
fn read_count(value: &Value) -> Option<u32> {
    if let Some(count) = value.get("count") {
        return read_count(count);
    }
    let n = as_number(value)?;
    if !n.is_finite() || n.fract() != 0.0 || n < 1.0 || n > MAX_FLOORS as f64 {
        return None;
    }
    Some(n as u32)
}

fn read_position(entry: &Value) -> Result<Point2D, CandidateError> {
    let found = entry
        .get("position")
        .and_then(|p| xy_of(p).or_else(|| p.get("coordinates").and_then(xy_of)))
        .or_else(|| entry.get("normalized_position").and_then(xy_of))
        .or_else(|| entry.get("center").and_then(xy_of))
        .or_else(|| entry.get("bbox").and_then(bbox_center));

    let (x, y) = found.ok_or(CandidateError::MissingPosition)?;
    if !(x.is_finite() && y.is_finite()) {
        return Err(CandidateError::NonFinitePosition);
    }
    Ok(Point2D::new(x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)))
}

/// `{"x": .., "y": ..}` or `[x, y]`
fn xy_of(value: &Value) -> Option<(f64, f64)> {
    match value {
        Value::Object(map) => Some((as_number(map.get("x")?)?, as_number(map.get("y")?)?)),
        Value::Array(items) if items.len() >= 2 => Some((as_number(&items[0])?, as_number(&items[1])?)),
        _ => None,
    }
}

/// Centre of `[x0, y0, x1, y1]`
fn bbox_center(value: &Value) -> Option<(f64, f64)> {
    let items = value.as_array().filter(|items| items.len() == 4)?;
    let mut coords = [0.0; 4];
    for (slot, item) in coords.iter_mut().zip(items) {
        *slot = as_number(item)?;
    }
    Some(((coords[0] + coords[2]) / 2.0, (coords[1] + coords[3]) / 2.0))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_buildings_object() {
        let raw = r#"{"buildings": [
            {"id": "A", "type": "high_rise", "floors": 20, "material": "glass",
             "position": {"x": 0.2, "y": 0.5}, "confidence": 0.9},
            {"id": "B", "type": "low_rise", "floors": 3,
             "position": {"x": 0.7, "y": 0.4}, "confidence": 0.8}
        ]}"#;
        let extraction = extract_semantics(raw);
        assert!(!extraction.malformed_payload);
        assert!(extraction.rejected.is_empty());
        assert_eq!(extraction.candidates.len(), 2);

        let a = &extraction.candidates[0];
        assert_eq!(a.id, "A");
        assert_eq!(a.building_type, BuildingType::HighRise);
        assert_eq!(a.floors, 20);
        assert_eq!(a.material, "glass");
        assert_relative_eq!(a.normalized_position.x, 0.2);
        assert_eq!(extraction.candidates[1].material, "unknown");
        assert_relative_eq!(extraction.average_confidence(), 0.85, epsilon = 1e-12);
    }

    #[test]
    fn test_fenced_instances_format() {
        let raw = "Here is the analysis:\n```json\n{\"count\": 1, \"instances\": [\
                   {\"id\": \"B1\", \"building_type\": \"office\", \"rough_floors\": 6, \
                   \"center\": [0.4, 0.6], \"confidence\": 0.8}]}\n```\nLet me know.";
        let extraction = extract_semantics(raw);
        assert_eq!(extraction.candidates.len(), 1);
        let b = &extraction.candidates[0];
        assert_eq!(b.id, "B1");
        assert_eq!(b.floors, 6);
        // "office" is not a height class, so the type follows the floors
        assert_eq!(b.building_type, BuildingType::LowRise);
        assert_relative_eq!(b.normalized_position.y, 0.6);
    }

    #[test]
    fn test_prose_around_bare_array() {
        let raw = r#"I found [two] buildings: [{"floors": "4", "center": [0.1, 0.2]},
                     {"id": 7, "floors": 2.0, "position": {"coordinates": {"x": 1.3, "y": -0.2}}}] done"#;
        let extraction = extract_semantics(raw);
        assert_eq!(extraction.candidates.len(), 2);
        assert_eq!(extraction.candidates[0].id, "v1");
        assert_eq!(extraction.candidates[0].floors, 4);
        assert_relative_eq!(extraction.candidates[0].confidence, 0.5);
        assert_eq!(extraction.candidates[1].id, "7");
        // Out-of-range positions are clamped
        assert_relative_eq!(extraction.candidates[1].normalized_position.x, 1.0);
        assert_relative_eq!(extraction.candidates[1].normalized_position.y, 0.0);
    }

    #[test]
    fn test_invalid_entries_are_reported() {
        let raw = r#"[
            {"id": "ok", "floors": 5, "position": {"x": 0.5, "y": 0.5}},
            {"id": "zero", "floors": 0, "position": {"x": 0.5, "y": 0.5}},
            {"id": "frac", "floors": 2.5, "position": {"x": 0.5, "y": 0.5}},
            {"id": "conf", "floors": 2, "confidence": 1.4, "position": {"x": 0.5, "y": 0.5}},
            {"id": "nowhere", "floors": 2},
            {"id": "bare", "position": {"x": 0.5, "y": 0.5}},
            "not an object"
        ]"#;
        let extraction = extract_semantics(raw);
        assert_eq!(extraction.candidates.len(), 1);
        let reasons: Vec<(usize, CandidateError)> = extraction
            .rejected
            .iter()
            .map(|r| (r.index, r.reason.clone()))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (1, CandidateError::InvalidFloors("0".into())),
                (2, CandidateError::InvalidFloors("2.5".into())),
                (3, CandidateError::InvalidConfidence(1.4)),
                (4, CandidateError::MissingPosition),
                (5, CandidateError::MissingFloors),
                (6, CandidateError::NotAnObject),
            ]
        );
    }

    #[test]
    fn test_type_without_floors_uses_typical_count() {
        let extraction = extract_semantics(
            r#"[{"type": "mid-rise", "normalized_position": {"x": 0.3, "y": 0.3}}]"#,
        );
        assert_eq!(extraction.candidates[0].floors, 8);
        assert_eq!(extraction.candidates[0].building_type, BuildingType::MidRise);
    }

    #[test]
    fn test_malformed_payload() {
        for raw in ["", "no json here", "{\"buildings\": [", "42", "{\"status\": \"ok\"}"] {
            let extraction = extract_semantics(raw);
            assert!(extraction.malformed_payload, "{raw:?}");
            assert!(extraction.candidates.is_empty());
        }
    }

    #[test]
    fn test_brackets_inside_strings() {
        let raw = r#"{"buildings": [{"id": "a}]", "floors": 1, "bbox": [0.1, 0.1, 0.3, 0.5]}]}"#;
        let extraction = extract_semantics(&format!("note: {raw} trailing"));
        assert_eq!(extraction.candidates.len(), 1);
        assert_eq!(extraction.candidates[0].id, "a}]");
        assert_relative_eq!(extraction.candidates[0].normalized_position.x, 0.2);
        assert_relative_eq!(extraction.candidates[0].normalized_position.y, 0.3);
    }

    #[test]
    fn test_empty_list_is_not_malformed() {
        let extraction = extract_semantics(r#"{"buildings": []}"#);
        assert!(!extraction.malformed_payload);
        assert!(extraction.candidates.is_empty());
        assert_eq!(average_confidence(&extraction.candidates), 0.0);
    }

    #[test]
    fn test_floor_count_is_capped() {
        let raw = r#"[
            {"floors": 4000000000, "center": [0.5, 0.5], "confidence": 0.9},
            {"floors": 101, "center": [0.5, 0.5]},
            {"floors": {"count": 100}, "center": [0.5, 0.5]}
        ]"#;
        let extraction = extract_semantics(raw);
        assert_eq!(extraction.candidates.len(), 1);
        assert_eq!(extraction.candidates[0].floors, MAX_FLOORS);
        assert_eq!(
            extraction.rejected,
            vec![
                RejectedEntry {
                    index: 0,
                    reason: CandidateError::InvalidFloors("4000000000".into()),
                },
                RejectedEntry {
                    index: 1,
                    reason: CandidateError::InvalidFloors("101".into()),
                },
            ]
        );
    }

    #[test]
    fn test_connectors() {
        let raw = r#"{"volumes": [
            {"id": "v1", "levels": 6, "center": [0.3, 0.5]},
            {"id": "v2", "levels": 4, "center": [0.7, 0.5]}
        ], "connectors": [
            {"from": "v1", "to": "v2", "type": "bridge", "width_hint": 0.25,
             "height_hint": 0.2, "elev_hint": 3, "confidence": 0.8},
            {"from": "v2", "to": "v1"},
            {"from": "v1", "to": "v1"},
            {"from": "v1"},
            {"from": "v1", "to": "v2", "width_hint": 1.5},
            {"from": "v1", "to": "v2", "elev_hint": 0}
        ]}"#;
        let extraction = extract_semantics(raw);
        assert_eq!(extraction.candidates.len(), 2);
        assert_eq!(extraction.connectors.len(), 2);

        let bridge = &extraction.connectors[0];
        assert_eq!((bridge.from.as_str(), bridge.to.as_str()), ("v1", "v2"));
        assert_eq!(bridge.kind, ConnectorKind::Bridge);
        assert_relative_eq!(bridge.width_hint, 0.25);
        assert_eq!(bridge.level, 3);

        // Unspecified fields fall back to a second-floor corridor
        let corridor = &extraction.connectors[1];
        assert_eq!(corridor.kind, ConnectorKind::Corridor);
        assert_relative_eq!(corridor.width_hint, 0.2);
        assert_relative_eq!(corridor.height_hint, 0.15);
        assert_eq!(corridor.level, 2);
        assert_relative_eq!(corridor.confidence, 0.7);

        let reasons: Vec<(usize, CandidateError)> = extraction
            .rejected_connectors
            .iter()
            .map(|r| (r.index, r.reason.clone()))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (2, CandidateError::MissingEndpoint),
                (3, CandidateError::MissingEndpoint),
                (
                    4,
                    CandidateError::InvalidHint {
                        field: "width_hint",
                        value: 1.5
                    }
                ),
                (5, CandidateError::InvalidLevel("0".into())),
            ]
        );
    }

    #[test]
    fn test_spatial_relations_as_connectors() {
        let raw = r#"{"buildings": [
            {"id": "A", "floors": 5, "center": [0.2, 0.5]},
            {"id": "B", "floors": 5, "center": [0.8, 0.5]}
        ], "spatial_relations": [
            {"from": "A", "to": "B", "relationship": "adjacent"},
            {"from": "A", "to": "B", "relationship": "connected",
             "connection_type": "bridge", "connection_level": 4}
        ]}"#;
        let extraction = extract_semantics(raw);
        assert_eq!(extraction.connectors.len(), 1);
        assert_eq!(extraction.connectors[0].kind, ConnectorKind::Bridge);
        assert_eq!(extraction.connectors[0].level, 4);

        // A bare building array has nowhere to carry connectors
        let bare = extract_semantics(r#"[{"id": "A", "floors": 2, "center": [0.2, 0.5]}]"#);
        assert!(bare.connectors.is_empty());
    }

    #[test]
    fn test_recovery_gives_up_on_bracket_noise() {
        let noise = "{".repeat(50_000);
        let raw = format!("{noise} [{{\"floors\": 2, \"center\": [0.5, 0.5]}}]");
        let extraction = extract_semantics(&raw);
        assert!(extraction.malformed_payload);
        assert!(extraction.candidates.is_empty());
    }
}
