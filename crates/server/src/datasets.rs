use anyhow::Result;
use map_core::DatasetRegistry;
use shared::domain::{ColorScale, ColorStop, Dataset};

/// The 50 states plus DC, ordered to match the feature ids of the folium
/// `us-states.json` boundaries.
pub const REGION_CODES: [&str; 51] = [
    "AL", "AK", "AZ", "AR", "CA", "CO", "CT", "DE", "DC", "FL", "GA", "HI", "ID", "IL", "IN",
    "IA", "KS", "KY", "LA", "ME", "MD", "MA", "MI", "MN", "MS", "MO", "MT", "NE", "NV", "NH",
    "NJ", "NM", "NY", "NC", "ND", "OH", "OK", "OR", "PA", "RI", "SC", "SD", "TN", "TX", "UT",
    "VT", "VA", "WA", "WV", "WI", "WY",
];

const UNEMPLOYMENT: [f64; 51] = [
    4.7, 4.2, 5.4, 4.4, 6.2, 4.5, 5.1, 4.8, 6.0, 4.6, 4.9, 4.3, 4.4, 5.6, 4.5, 4.1, 4.4, 5.2,
    5.8, 4.6, 4.7, 4.9, 5.3, 4.3, 5.9, 4.6, 4.8, 4.2, 6.1, 4.3, 5.5, 6.0, 5.4, 4.9, 4.4, 5.1,
    4.7, 5.0, 5.2, 5.3, 4.8, 4.2, 4.7, 5.0, 4.4, 4.5, 4.6, 5.1, 5.7, 4.5, 5.0,
];

const POPULATION_MILLIONS: [f64; 51] = [
    5.02, 0.73, 7.15, 3.01, 39.54, 5.77, 3.61, 0.99, 0.69, 21.54, 10.71, 1.46, 1.84, 12.81,
    6.79, 3.19, 2.94, 4.51, 4.66, 1.36, 6.18, 7.03, 10.08, 5.71, 2.96, 6.15, 1.08, 1.96, 3.10,
    1.38, 9.29, 2.12, 20.20, 10.44, 0.78, 11.80, 3.96, 4.24, 13.00, 1.10, 5.12, 0.89, 6.91,
    29.15, 3.27, 0.64, 8.63, 7.71, 1.79, 5.89, 0.58,
];

const GDP_BILLIONS: [f64; 51] = [
    243.0, 55.0, 400.2, 143.4, 3353.5, 421.1, 290.5, 81.0, 144.4, 1170.3, 661.2, 91.9, 94.2,
    893.9, 396.4, 205.3, 184.4, 222.4, 257.2, 73.1, 432.6, 627.1, 542.0, 393.0, 119.9, 344.1,
    57.0, 136.4, 185.4, 93.2, 652.7, 105.4, 1868.1, 615.2, 60.3, 721.4, 202.1, 258.9, 839.3,
    64.2, 254.2, 58.4, 407.2, 1994.8, 210.7, 34.9, 578.1, 667.8, 83.0, 356.0, 41.4,
];

fn viridis() -> ColorScale {
    ColorScale(vec![
        ColorStop::new(0.0, "#440154"),
        ColorStop::new(0.25, "#3b528b"),
        ColorStop::new(0.5, "#21918c"),
        ColorStop::new(0.75, "#5ec962"),
        ColorStop::new(1.0, "#fde725"),
    ])
}

fn plasma() -> ColorScale {
    ColorScale(vec![
        ColorStop::new(0.0, "#0d0887"),
        ColorStop::new(0.25, "#7e03a8"),
        ColorStop::new(0.5, "#cc4778"),
        ColorStop::new(0.75, "#f89540"),
        ColorStop::new(1.0, "#f0f921"),
    ])
}

fn blues() -> ColorScale {
    ColorScale(vec![
        ColorStop::new(0.0, "#f7fbff"),
        ColorStop::new(0.5, "#6baed6"),
        ColorStop::new(1.0, "#08306b"),
    ])
}

pub fn builtin_registry() -> Result<DatasetRegistry> {
    let region_codes = REGION_CODES.iter().map(|code| code.to_string()).collect();
    DatasetRegistry::new(
        region_codes,
        vec![
            (
                Dataset {
                    name: "unemployment".into(),
                    label: "Unemployment rate".into(),
                    unit: Some("%".into()),
                    values: UNEMPLOYMENT.to_vec(),
                },
                viridis(),
            ),
            (
                Dataset {
                    name: "population".into(),
                    label: "Resident population".into(),
                    unit: Some("millions".into()),
                    values: POPULATION_MILLIONS.to_vec(),
                },
                plasma(),
            ),
            (
                Dataset {
                    name: "gdp".into(),
                    label: "Gross state product".into(),
                    unit: Some("$B".into()),
                    values: GDP_BILLIONS.to_vec(),
                },
                blues(),
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::domain::ValueRange;

    #[test]
    fn builtin_datasets_cover_every_region() {
        let registry = builtin_registry().expect("registry");
        assert_eq!(registry.region_codes().len(), 51);
        for name in ["unemployment", "population", "gdp"] {
            let entry = registry.get(name).expect(name);
            assert_eq!(entry.dataset.values.len(), 51);
        }
    }

    #[test]
    fn region_codes_are_unique() {
        let mut codes: Vec<&str> = REGION_CODES.to_vec();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 51);
    }

    #[test]
    fn unemployment_range_matches_data() {
        let range = ValueRange::from_values(&UNEMPLOYMENT).expect("range");
        assert_eq!(range.min, 4.1);
        assert_eq!(range.max, 6.2);
    }

    #[test]
    fn names_are_slider_ordered() {
        let registry = builtin_registry().expect("registry");
        assert_eq!(registry.names(), vec!["gdp", "population", "unemployment"]);
    }
}
