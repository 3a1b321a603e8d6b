use std::collections::HashMap;

use anyhow::{bail, ensure, Result};
use shared::{
    domain::{ColorScale, Dataset, ValueRange},
    protocol::DatasetSummary,
};

/// A dataset together with the color scale it renders under. The two tables
/// of the original page (`datasets`, `colorThemes`) are stored as one entry
/// so a single lookup covers both.
#[derive(Debug, Clone)]
pub struct DatasetEntry {
    pub dataset: Dataset,
    pub scale: ColorScale,
}

/// Immutable name -> entry table, validated once at construction and shared
/// read-only with the sequencer.
#[derive(Debug)]
pub struct DatasetRegistry {
    region_codes: Vec<String>,
    entries: HashMap<String, DatasetEntry>,
}

impl DatasetRegistry {
    pub fn new(
        region_codes: Vec<String>,
        datasets: Vec<(Dataset, ColorScale)>,
    ) -> Result<Self> {
        let mut entries = HashMap::new();
        for (dataset, scale) in datasets {
            ensure!(
                dataset.values.len() == region_codes.len(),
                "dataset '{}' has {} values for {} regions",
                dataset.name,
                dataset.values.len(),
                region_codes.len()
            );
            ensure!(
                dataset.values.iter().all(|v| v.is_finite()),
                "dataset '{}' contains a non-finite value",
                dataset.name
            );
            validate_scale(&dataset.name, &scale)?;
            let name = dataset.name.clone();
            if entries
                .insert(name.clone(), DatasetEntry { dataset, scale })
                .is_some()
            {
                bail!("duplicate dataset name '{name}'");
            }
        }
        Ok(Self {
            region_codes,
            entries,
        })
    }

    pub fn get(&self, name: &str) -> Option<&DatasetEntry> {
        self.entries.get(name)
    }

    pub fn region_codes(&self) -> &[String] {
        &self.region_codes
    }

    /// Dataset names in stable (sorted) order, for slider indexing.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn summaries(&self) -> Vec<DatasetSummary> {
        let mut summaries: Vec<DatasetSummary> = self
            .entries
            .values()
            .filter_map(|entry| {
                let range = ValueRange::from_values(&entry.dataset.values)?;
                Some(DatasetSummary {
                    name: entry.dataset.name.clone(),
                    label: entry.dataset.label.clone(),
                    unit: entry.dataset.unit.clone(),
                    min: range.min,
                    max: range.max,
                })
            })
            .collect();
        summaries.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        summaries
    }
}

fn validate_scale(dataset: &str, scale: &ColorScale) -> Result<()> {
    let stops = scale.stops();
    ensure!(
        stops.len() >= 2,
        "color scale for '{dataset}' needs at least two stops"
    );
    ensure!(
        stops.first().map(|s| s.position) == Some(0.0),
        "color scale for '{dataset}' must start at position 0"
    );
    ensure!(
        stops.last().map(|s| s.position) == Some(1.0),
        "color scale for '{dataset}' must end at position 1"
    );
    for pair in stops.windows(2) {
        ensure!(
            pair[0].position < pair[1].position,
            "color scale for '{dataset}' has non-increasing stop positions"
        );
    }
    Ok(())
}
