//! Run configuration for the aggregator.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{AggregationError, Result};
use crate::types::RunTags;

/// Default pixel margin added around each location's bounding box.
pub const DEFAULT_PIXEL_BUFFER: usize = 10;

/// Placeholder substituted by the year in `population_time_point_format`.
pub const YEAR_PLACEHOLDER: &str = "{year}";

/// Inclusive range of years processed by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.start..=self.end).contains(&year)
    }
}

impl Default for YearRange {
    fn default() -> Self {
        Self::new(1950, 2100)
    }
}

/// Where a shape hierarchy's geometries and rollup metadata come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShapeSourceKind {
    /// Shapes carry only `location_id`; the named location table says which
    /// locations are most detailed. Only those are rasterized.
    JoinedLocations { locations_table: String },
    /// Every shape is already a most-detailed location.
    MostDetailedShapes,
}

/// A set of administrative shapes and the output hierarchies built from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeHierarchySpec {
    pub name: String,
    pub source: ShapeSourceKind,
    pub outputs: Vec<String>,
}

impl ShapeHierarchySpec {
    pub fn most_detailed(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            outputs: vec![name.clone()],
            name,
            source: ShapeSourceKind::MostDetailedShapes,
        }
    }

    pub fn joined(name: impl Into<String>, locations_table: impl Into<String>, outputs: Vec<String>) -> Self {
        Self {
            name: name.into(),
            source: ShapeSourceKind::JoinedLocations {
                locations_table: locations_table.into(),
            },
            outputs,
        }
    }
}

/// Immutable configuration shared by every unit of work in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub scenarios: Vec<String>,
    pub measures: Vec<String>,
    pub draws: Vec<String>,
    pub years: YearRange,

    /// Population time point for a year, e.g. `{year}q1` gives `2020q1`.
    pub population_time_point_format: String,

    /// Time point whose population grid defines the reference raster.
    pub template_time_point: String,

    /// Pixels added on every side of a location's bounding box before clipping.
    pub pixel_buffer: usize,

    pub shape_hierarchies: Vec<ShapeHierarchySpec>,

    /// The unit that also writes the population-only rollup.
    /// `None` means the first scenario, measure and draw.
    pub population_reference: Option<RunTags>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            scenarios: to_strings(&["ssp126", "ssp245", "ssp585"]),
            measures: to_strings(&[
                "mean_temperature",
                "mean_high_temperature",
                "mean_low_temperature",
                "total_precipitation",
                "days_over_30C",
            ]),
            draws: (0..100).map(|d| format!("{d:03}")).collect(),
            years: YearRange::default(),
            population_time_point_format: format!("{YEAR_PLACEHOLDER}q1"),
            template_time_point: "2020q1".to_string(),
            pixel_buffer: DEFAULT_PIXEL_BUFFER,
            shape_hierarchies: vec![
                ShapeHierarchySpec::joined(
                    "gbd_2021",
                    "gbd_2021",
                    to_strings(&["gbd_2021", "fhs_2021"]),
                ),
                ShapeHierarchySpec::most_detailed("lsae_1209"),
                ShapeHierarchySpec::most_detailed("lsae_1285"),
            ],
            population_reference: None,
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn check_list(kind: &str, values: &[String]) -> Result<()> {
    if values.is_empty() {
        return Err(AggregationError::invalid_config(format!("{kind} list is empty")));
    }
    let mut seen = BTreeSet::new();
    for v in values {
        if v.trim().is_empty() {
            return Err(AggregationError::invalid_config(format!("blank entry in {kind} list")));
        }
        if !seen.insert(v.as_str()) {
            return Err(AggregationError::invalid_config(format!("duplicate {kind} '{v}'")));
        }
    }
    Ok(())
}

/// Reject an output version that is not a single plain directory name.
pub fn check_version(version: &str) -> Result<()> {
    let plain = !version.trim().is_empty()
        && version != "."
        && version != ".."
        && !version.contains(['/', '\\', '\0']);
    if plain {
        Ok(())
    } else {
        Err(AggregationError::InvalidVersion(version.to_string()))
    }
}

impl AggregationConfig {
    /// Check the configuration once, before any work starts.
    pub fn validate(&self) -> Result<()> {
        check_list("scenario", &self.scenarios)?;
        check_list("measure", &self.measures)?;
        check_list("draw", &self.draws)?;

        if self.years.is_empty() {
            return Err(AggregationError::invalid_config(format!(
                "year range {}..={} is empty",
                self.years.start, self.years.end
            )));
        }

        if !self.population_time_point_format.contains(YEAR_PLACEHOLDER) {
            return Err(AggregationError::invalid_config(format!(
                "population_time_point_format '{}' has no {YEAR_PLACEHOLDER} placeholder",
                self.population_time_point_format
            )));
        }

        if self.template_time_point.trim().is_empty() {
            return Err(AggregationError::invalid_config("template_time_point is empty"));
        }

        if self.shape_hierarchies.is_empty() {
            return Err(AggregationError::invalid_config("no shape hierarchies configured"));
        }

        let mut shape_names = BTreeSet::new();
        let mut output_names = BTreeSet::new();
        for spec in &self.shape_hierarchies {
            if !shape_names.insert(spec.name.as_str()) {
                return Err(AggregationError::invalid_config(format!(
                    "duplicate shape hierarchy '{}'",
                    spec.name
                )));
            }
            if spec.outputs.is_empty() {
                return Err(AggregationError::invalid_config(format!(
                    "shape hierarchy '{}' has no output hierarchies",
                    spec.name
                )));
            }
            for output in &spec.outputs {
                if !output_names.insert(output.as_str()) {
                    return Err(AggregationError::invalid_config(format!(
                        "output hierarchy '{output}' is claimed by more than one shape hierarchy"
                    )));
                }
            }
        }

        if let Some(reference) = &self.population_reference {
            self.check_tags(reference)?;
        }

        Ok(())
    }

    /// Reject scenario, measure or draw values outside the configured lists.
    pub fn check_tags(&self, tags: &RunTags) -> Result<()> {
        let checks = [
            ("scenario", &self.scenarios, &tags.scenario),
            ("measure", &self.measures, &tags.measure),
            ("draw", &self.draws, &tags.draw),
        ];
        for (kind, allowed, value) in checks {
            if !allowed.contains(value) {
                return Err(AggregationError::UnknownTag {
                    kind,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    /// The shape hierarchy that backs `name`, either directly or as one of
    /// its outputs.
    pub fn resolve_hierarchy(&self, name: &str) -> Result<&ShapeHierarchySpec> {
        self.shape_hierarchies
            .iter()
            .find(|s| s.name == name)
            .or_else(|| {
                self.shape_hierarchies
                    .iter()
                    .find(|s| s.outputs.iter().any(|o| o == name))
            })
            .ok_or_else(|| AggregationError::UnknownHierarchy(name.to_string()))
    }

    /// Every output hierarchy, in configuration order.
    pub fn output_hierarchies(&self) -> impl Iterator<Item = &str> {
        self.shape_hierarchies
            .iter()
            .flat_map(|s| s.outputs.iter().map(String::as_str))
    }

    /// Population time point for `year`.
    pub fn population_time_point(&self, year: i32) -> String {
        self.population_time_point_format
            .replace(YEAR_PLACEHOLDER, &year.to_string())
    }

    /// The unit that writes the population-only rollup.
    pub fn population_reference(&self) -> Option<RunTags> {
        if let Some(reference) = &self.population_reference {
            return Some(reference.clone());
        }
        Some(RunTags::new(
            self.scenarios.first()?,
            self.measures.first()?,
            self.draws.first()?,
        ))
    }

    pub fn is_population_reference(&self, tags: &RunTags) -> bool {
        self.population_reference().as_ref() == Some(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AggregationConfig::default();
        config.validate().unwrap();
        assert_eq!(config.draws.len(), 100);
        assert_eq!(config.draws[7], "007");
        assert_eq!(config.years.len(), 151);
        assert_eq!(config.pixel_buffer, DEFAULT_PIXEL_BUFFER);
    }

    #[test]
    fn test_check_version() {
        check_version("2024_10_01").unwrap();
        check_version("v1.2").unwrap();
        for bad in ["", " ", ".", "..", "../x", "a/b", "a\\b"] {
            assert!(
                matches!(check_version(bad), Err(AggregationError::InvalidVersion(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_population_time_point() {
        let config = AggregationConfig::default();
        assert_eq!(config.population_time_point(1975), "1975q1");
    }

    #[test]
    fn test_resolve_hierarchy() {
        let config = AggregationConfig::default();
        assert_eq!(config.resolve_hierarchy("gbd_2021").unwrap().name, "gbd_2021");
        assert_eq!(config.resolve_hierarchy("fhs_2021").unwrap().name, "gbd_2021");
        assert_eq!(config.resolve_hierarchy("lsae_1285").unwrap().name, "lsae_1285");
        assert!(matches!(
            config.resolve_hierarchy("gbd_2019"),
            Err(AggregationError::UnknownHierarchy(name)) if name == "gbd_2019"
        ));
    }

    #[test]
    fn test_output_hierarchies() {
        let config = AggregationConfig::default();
        let outputs: Vec<_> = config.output_hierarchies().collect();
        assert_eq!(outputs, vec!["gbd_2021", "fhs_2021", "lsae_1209", "lsae_1285"]);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AggregationConfig::default();
        config.scenarios.clear();
        assert!(config.validate().is_err());

        let mut config = AggregationConfig::default();
        config.years = YearRange::new(2000, 1999);
        assert!(config.validate().is_err());

        let mut config = AggregationConfig::default();
        config.measures.push("mean_temperature".to_string());
        assert!(config.validate().is_err());

        let mut config = AggregationConfig::default();
        config.population_time_point_format = "2020q1".to_string();
        assert!(config.validate().is_err());

        let mut config = AggregationConfig::default();
        config.shape_hierarchies[1].outputs.push("fhs_2021".to_string());
        assert!(config.validate().is_err());

        let mut config = AggregationConfig::default();
        config.population_reference = Some(RunTags::new("ssp999", "mean_temperature", "000"));
        assert!(matches!(
            config.validate(),
            Err(AggregationError::UnknownTag { kind: "scenario", .. })
        ));
    }

    #[test]
    fn test_population_reference_defaults_to_first_tags() {
        let config = AggregationConfig::default();
        let reference = RunTags::new("ssp126", "mean_temperature", "000");
        assert!(config.is_population_reference(&reference));
        assert!(!config.is_population_reference(&RunTags::new("ssp245", "mean_temperature", "000")));
    }

    #[test]
    fn test_yaml_round_trip_with_partial_fields() {
        let yaml = r#"
scenarios: [ssp245]
draws: ["000", "001"]
years: { start: 2000, end: 2002 }
pixel_buffer: 25
shape_hierarchies:
  - name: lsae_1209
    source: { kind: most_detailed_shapes }
    outputs: [lsae_1209]
"#;
        let config: AggregationConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.pixel_buffer, 25);
        assert_eq!(config.years.iter().collect::<Vec<_>>(), vec![2000, 2001, 2002]);
        assert_eq!(config.measures.len(), 5);
        assert_eq!(config.shape_hierarchies[0].source, ShapeSourceKind::MostDetailedShapes);
    }
}
