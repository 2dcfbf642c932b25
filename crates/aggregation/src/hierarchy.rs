//! Bottom-up rollup of most-detailed results through a location hierarchy.
//!
//! Levels are processed from the deepest up. A location's row is the sum of
//! its children's rows when it has any, otherwise its own detailed row; that
//! row is emitted and then pushed into its parent. Each location therefore
//! contributes to its direct parent exactly once, whatever depth its
//! siblings sit at.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{AggregationError, Result};
use crate::reduce::LocationSums;
use crate::types::{
    AggregateRecord, ClimateRecord, DetailedRecord, HierarchyTable, LocationId, PopulationRecord,
    RunTags,
};

/// Values that can be summed into a parent.
pub trait Accumulate: Clone {
    fn accumulate(&mut self, other: &Self);
}

impl Accumulate for LocationSums {
    fn accumulate(&mut self, other: &Self) {
        self.add(other);
    }
}

impl Accumulate for f64 {
    fn accumulate(&mut self, other: &Self) {
        *self += *other;
    }
}

/// Rows per location, keyed by whatever distinguishes rows of one location.
pub type LocationRows<K, V> = BTreeMap<LocationId, BTreeMap<K, V>>;

/// Roll `detailed` rows up through `hierarchy`.
///
/// The result holds one entry per hierarchy location that has data, either
/// its own or from descendants. Locations outside the hierarchy are dropped.
pub fn rollup<K, V>(detailed: &LocationRows<K, V>, hierarchy: &HierarchyTable) -> LocationRows<K, V>
where
    K: Ord + Clone,
    V: Accumulate,
{
    let mut pending: LocationRows<K, V> = BTreeMap::new();
    let mut output: LocationRows<K, V> = BTreeMap::new();

    for level in (0..=hierarchy.max_level()).rev() {
        for node in hierarchy.locations_at_level(level) {
            let rows = match pending.remove(&node.location_id) {
                Some(aggregated) => aggregated,
                None => match detailed.get(&node.location_id) {
                    Some(own) => own.clone(),
                    None => continue,
                },
            };

            if let Some(parent) = node.rollup_parent() {
                let target = pending.entry(parent).or_default();
                for (key, value) in &rows {
                    target
                        .entry(key.clone())
                        .and_modify(|v| v.accumulate(value))
                        .or_insert_with(|| value.clone());
                }
            }
            output.insert(node.location_id, rows);
        }
        debug!(level, locations = output.len(), "Aggregated hierarchy level");
    }

    output
}

type ClimateKey = (i32, RunTags);

/// Aggregate detailed climate records to every level of `hierarchy`.
///
/// Output is sorted by `(location_id, year, scenario, measure, draw)` and
/// limited to locations in the hierarchy. Ratios are recomputed from the
/// summed parts at each level. Two input rows for the same location, year and
/// run are rejected.
pub fn aggregate_hierarchy(
    records: &[DetailedRecord],
    hierarchy: &HierarchyTable,
) -> Result<Vec<AggregateRecord>> {
    let mut detailed: LocationRows<ClimateKey, LocationSums> = BTreeMap::new();
    for record in records {
        let sums = LocationSums {
            weighted_climate: record.weighted_climate,
            population: record.population,
        };
        match detailed
            .entry(record.location_id)
            .or_default()
            .entry((record.year, record.tags()))
        {
            Entry::Vacant(slot) => {
                slot.insert(sums);
            }
            Entry::Occupied(_) => {
                return Err(duplicate(record.location_id, record.year, &record.tags()));
            }
        }
    }

    Ok(rollup(&detailed, hierarchy)
        .into_iter()
        .flat_map(|(location_id, rows)| {
            rows.into_iter().map(move |((year, tags), sums)| {
                ClimateRecord::new(
                    location_id,
                    year,
                    &tags,
                    sums.weighted_climate,
                    sums.population,
                )
            })
        })
        .collect())
}

fn duplicate(location_id: LocationId, year: i32, tags: &RunTags) -> AggregationError {
    AggregationError::DuplicateRecord(format!("location {location_id} year {year} ({tags})"))
}

/// Population per (location, year) taken from detailed climate records.
///
/// Population does not depend on scenario, measure or draw, so the first
/// record seen for each pair is used. Repeated rows for the same run are
/// rejected as in [`aggregate_hierarchy`].
pub fn population_records(records: &[DetailedRecord]) -> Result<Vec<PopulationRecord>> {
    let mut runs: BTreeSet<(LocationId, i32, RunTags)> = BTreeSet::new();
    let mut seen: BTreeMap<(LocationId, i32), f64> = BTreeMap::new();
    for record in records {
        let tags = record.tags();
        if runs.contains(&(record.location_id, record.year, tags.clone())) {
            return Err(duplicate(record.location_id, record.year, &tags));
        }
        runs.insert((record.location_id, record.year, tags));
        seen.entry((record.location_id, record.year))
            .or_insert(record.population);
    }
    Ok(seen
        .into_iter()
        .map(|((location_id, year), population)| PopulationRecord {
            location_id,
            year,
            population,
        })
        .collect())
}

/// Aggregate population alone to every level of `hierarchy`.
///
/// Output is sorted by `(location_id, year)`.
pub fn aggregate_population(
    records: &[PopulationRecord],
    hierarchy: &HierarchyTable,
) -> Result<Vec<PopulationRecord>> {
    let mut detailed: LocationRows<i32, f64> = BTreeMap::new();
    for record in records {
        let rows = detailed.entry(record.location_id).or_default();
        if rows.insert(record.year, record.population).is_some() {
            return Err(AggregationError::DuplicateRecord(format!(
                "population for location {} year {}",
                record.location_id, record.year
            )));
        }
    }

    Ok(rollup(&detailed, hierarchy)
        .into_iter()
        .flat_map(|(location_id, rows)| {
            rows.into_iter().map(move |(year, population)| PopulationRecord {
                location_id,
                year,
                population,
            })
        })
        .collect())
}
