//! Core record and hierarchy types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AggregationError, Result};

/// Identifier of an administrative location.
pub type LocationId = u32;

/// ID-raster value for pixels outside every polygon. Never used for a shape.
pub const NO_LOCATION: LocationId = 0;

/// The (scenario, measure, draw) combination a run is computing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunTags {
    pub scenario: String,
    pub measure: String,
    pub draw: String,
}

impl RunTags {
    pub fn new(scenario: impl Into<String>, measure: impl Into<String>, draw: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            measure: measure.into(),
            draw: draw.into(),
        }
    }
}

impl fmt::Display for RunTags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.scenario, self.measure, self.draw)
    }
}

/// `numerator / denominator`, or NaN when the denominator is zero.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator != 0.0 {
        numerator / denominator
    } else {
        f64::NAN
    }
}

/// One population-weighted climate value for a location and year.
///
/// `value` is `weighted_climate / population`, NaN when population is zero.
/// Field order is the column order of persisted tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimateRecord {
    pub location_id: LocationId,
    pub year: i32,
    pub scenario: String,
    pub measure: String,
    pub draw: String,
    pub weighted_climate: f64,
    pub population: f64,
    pub value: f64,
}

/// Most-detailed record produced by the windowed reducer.
pub type DetailedRecord = ClimateRecord;

/// Record at any hierarchy level produced by the rollup.
pub type AggregateRecord = ClimateRecord;

impl ClimateRecord {
    /// Build a record, deriving `value` from the two sums.
    pub fn new(
        location_id: LocationId,
        year: i32,
        tags: &RunTags,
        weighted_climate: f64,
        population: f64,
    ) -> Self {
        Self {
            location_id,
            year,
            scenario: tags.scenario.clone(),
            measure: tags.measure.clone(),
            draw: tags.draw.clone(),
            weighted_climate,
            population,
            value: ratio(weighted_climate, population),
        }
    }

    pub fn tags(&self) -> RunTags {
        RunTags::new(&self.scenario, &self.measure, &self.draw)
    }
}

/// Population total for a location and year, independent of climate inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationRecord {
    pub location_id: LocationId,
    pub year: i32,
    pub population: f64,
}

/// Parent and level of one location in a hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub location_id: LocationId,
    pub parent_id: Option<LocationId>,
    pub level: u32,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub most_detailed: bool,
}

impl HierarchyNode {
    /// A root has no parent, is its own parent, or sits at level 0.
    pub fn is_root(&self) -> bool {
        self.level == 0 || self.parent_id.map_or(true, |p| p == self.location_id)
    }

    /// The parent aggregates flow into, if any.
    pub fn rollup_parent(&self) -> Option<LocationId> {
        if self.is_root() {
            None
        } else {
            self.parent_id
        }
    }
}

/// A flat parent/child table describing one administrative hierarchy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HierarchyTable {
    nodes: BTreeMap<LocationId, HierarchyNode>,
}

impl HierarchyTable {
    /// Build a table, rejecting duplicate IDs and parents that are missing or
    /// not at a lower level than their children.
    pub fn from_nodes(nodes: impl IntoIterator<Item = HierarchyNode>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for node in nodes {
            let id = node.location_id;
            if map.insert(id, node).is_some() {
                return Err(AggregationError::InvalidHierarchy(format!(
                    "duplicate location_id {id}"
                )));
            }
        }

        for node in map.values() {
            let Some(parent_id) = node.rollup_parent() else {
                continue;
            };
            let parent = map.get(&parent_id).ok_or_else(|| {
                AggregationError::InvalidHierarchy(format!(
                    "location {} references missing parent {}",
                    node.location_id, parent_id
                ))
            })?;
            if parent.level >= node.level {
                return Err(AggregationError::InvalidHierarchy(format!(
                    "parent {} (level {}) is not above child {} (level {})",
                    parent_id, parent.level, node.location_id, node.level
                )));
            }
        }

        Ok(Self { nodes: map })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, location_id: LocationId) -> bool {
        self.nodes.contains_key(&location_id)
    }

    pub fn get(&self, location_id: LocationId) -> Option<&HierarchyNode> {
        self.nodes.get(&location_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &HierarchyNode> {
        self.nodes.values()
    }

    /// Deepest level in the table (0 for an empty table).
    pub fn max_level(&self) -> u32 {
        self.nodes.values().map(|n| n.level).max().unwrap_or(0)
    }

    /// Locations at `level`, in ascending ID order.
    pub fn locations_at_level(&self, level: u32) -> impl Iterator<Item = &HierarchyNode> {
        self.nodes.values().filter(move |n| n.level == level)
    }

    /// Direct children of `location_id`.
    pub fn children_of(&self, location_id: LocationId) -> Vec<LocationId> {
        self.nodes
            .values()
            .filter(|n| n.rollup_parent() == Some(location_id))
            .map(|n| n.location_id)
            .collect()
    }

    /// IDs flagged as most detailed.
    pub fn most_detailed(&self) -> Vec<LocationId> {
        self.nodes
            .values()
            .filter(|n| n.most_detailed)
            .map(|n| n.location_id)
            .collect()
    }
}
