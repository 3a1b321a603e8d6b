use serde::{
    de::{self, SeqAccess, Visitor},
    ser::SerializeTuple,
    Deserialize, Deserializer, Serialize, Serializer,
};

/// A named series of per-region values, aligned by index to a fixed
/// region-code sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub values: Vec<f64>,
}

/// One stop of a color scale. Serialized in Plotly's pair form:
/// `[position, "color"]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorStop {
    pub position: f64,
    pub color: String,
}

impl ColorStop {
    pub fn new(position: f64, color: impl Into<String>) -> Self {
        Self {
            position,
            color: color.into(),
        }
    }
}

impl Serialize for ColorStop {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut pair = serializer.serialize_tuple(2)?;
        pair.serialize_element(&self.position)?;
        pair.serialize_element(&self.color)?;
        pair.end()
    }
}

impl<'de> Deserialize<'de> for ColorStop {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PairVisitor;

        impl<'de> Visitor<'de> for PairVisitor {
            type Value = ColorStop;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a [position, color] pair")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ColorStop, A::Error> {
                let position = seq
                    .next_element::<f64>()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let color = seq
                    .next_element::<String>()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                Ok(ColorStop { position, color })
            }
        }

        deserializer.deserialize_tuple(2, PairVisitor)
    }
}

/// Ordered color stops mapping normalized value position to color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorScale(pub Vec<ColorStop>);

impl ColorScale {
    pub fn stops(&self) -> &[ColorStop] {
        &self.0
    }
}

/// Inclusive value bounds of a dataset, computed by a full scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    /// Returns `None` for an empty sequence; `min == max` is a legal
    /// (degenerate) range for single-value datasets.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut iter = values.iter().copied();
        let first = iter.next()?;
        let mut range = ValueRange {
            min: first,
            max: first,
        };
        for v in iter {
            range.min = range.min.min(v);
            range.max = range.max.max(v);
        }
        Some(range)
    }
}

/// The last display configuration the sequencer successfully applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySnapshot {
    pub dataset: String,
    pub range: ValueRange,
    pub opacity: f64,
}

/// Duration and easing of the fade-in animation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSpec {
    pub duration_ms: u64,
    pub easing: String,
}

impl Default for TransitionSpec {
    fn default() -> Self {
        Self {
            duration_ms: 5700,
            easing: "cubic-in-out".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_stop_serializes_as_pair() {
        let stop = ColorStop::new(0.5, "#b91c1c");
        let json = serde_json::to_string(&stop).expect("serialize");
        assert_eq!(json, r##"[0.5,"#b91c1c"]"##);

        let back: ColorStop = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, stop);
    }

    #[test]
    fn value_range_scans_full_sequence() {
        let range = ValueRange::from_values(&[4.7, 4.2, 6.2, 4.1, 5.0]).expect("range");
        assert_eq!(range.min, 4.1);
        assert_eq!(range.max, 6.2);
    }

    #[test]
    fn value_range_of_empty_sequence_is_none() {
        assert!(ValueRange::from_values(&[]).is_none());
    }

    #[test]
    fn single_value_yields_degenerate_range() {
        let range = ValueRange::from_values(&[42.0]).expect("range");
        assert_eq!(range.min, 42.0);
        assert_eq!(range.max, 42.0);
    }
}
