//! Combining per-draw result tables.

use crate::error::{AggregationError, Result};
use crate::types::AggregateRecord;

/// Concatenate per-draw tables of one (hierarchy, scenario, measure) into a
/// single table sorted by `(location_id, year, draw)`.
///
/// Fails if the tables mix scenarios or measures, or if a draw appears in
/// more than one table.
pub fn compile_draws(tables: Vec<Vec<AggregateRecord>>) -> Result<Vec<AggregateRecord>> {
    let mut combined: Vec<AggregateRecord> = tables.into_iter().flatten().collect();

    if let Some(first) = combined.first() {
        let (scenario, measure) = (first.scenario.clone(), first.measure.clone());
        if let Some(other) = combined
            .iter()
            .find(|r| r.scenario != scenario || r.measure != measure)
        {
            return Err(AggregationError::IncompatibleTables(format!(
                "{}/{} mixed with {}/{}",
                scenario, measure, other.scenario, other.measure
            )));
        }
    }

    combined.sort_by(|a, b| {
        (a.location_id, a.year, &a.draw).cmp(&(b.location_id, b.year, &b.draw))
    });

    if let Some(pair) = combined.windows(2).find(|w| {
        (w[0].location_id, w[0].year, &w[0].draw) == (w[1].location_id, w[1].year, &w[1].draw)
    }) {
        return Err(AggregationError::IncompatibleTables(format!(
            "duplicate row for location {} year {} draw {}",
            pair[0].location_id, pair[0].year, pair[0].draw
        )));
    }

    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClimateRecord, RunTags};

    fn table(draw: &str, value: f64) -> Vec<AggregateRecord> {
        let tags = RunTags::new("ssp245", "total_precipitation", draw);
        vec![
            ClimateRecord::new(2, 2021, &tags, value, 1.0),
            ClimateRecord::new(1, 2020, &tags, value, 1.0),
        ]
    }

    #[test]
    fn test_compile_sorts_by_location_year_draw() {
        let compiled = compile_draws(vec![table("001", 1.0), table("000", 0.0)]).unwrap();
        let keys: Vec<_> = compiled
            .iter()
            .map(|r| (r.location_id, r.year, r.draw.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![(1, 2020, "000"), (1, 2020, "001"), (2, 2021, "000"), (2, 2021, "001")]
        );
    }

    #[test]
    fn test_compile_rejects_mixed_measures() {
        let mut other = table("001", 1.0);
        other[0].measure = "mean_temperature".to_string();
        assert!(matches!(
            compile_draws(vec![table("000", 0.0), other]),
            Err(AggregationError::IncompatibleTables(_))
        ));
    }

    #[test]
    fn test_compile_rejects_duplicate_draws() {
        assert!(compile_draws(vec![table("000", 0.0), table("000", 1.0)]).is_err());
    }

    #[test]
    fn test_compile_empty() {
        assert!(compile_draws(vec![]).unwrap().is_empty());
    }
}
