use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Documented physical extent of one signal type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRange {
    pub physical_min: f64,
    pub physical_max: f64,
    pub unit: String,
    /// Human-readable reference range, e.g. "60-100 BPM (resting)".
    pub normal_range: String,
    /// File-name words that disqualify a match, e.g. `quality` for heart_rate_quality.
    pub exclude: Vec<String>,
}

impl SignalRange {
    fn new(min: f64, max: f64, unit: &str, normal_range: &str, exclude: &[&str]) -> Self {
        Self {
            physical_min: min,
            physical_max: max,
            unit: unit.to_string(),
            normal_range: normal_range.to_string(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Config file signal definition (deserialized from TOML `[[signals]]`).
#[derive(Debug, Deserialize, Clone)]
pub struct CustomSignalRange {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub unit: String,
    #[serde(default)]
    pub normal_range: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Immutable signal-type → range lookup. Built once at start-up and passed
/// to whoever needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRangeTable {
    ranges: BTreeMap<String, SignalRange>,
}

impl Default for SignalRangeTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SignalRangeTable {
    pub fn new(entries: impl IntoIterator<Item = (String, SignalRange)>) -> Self {
        Self {
            ranges: entries
                .into_iter()
                .map(|(name, range)| (name.to_lowercase(), range))
                .collect(),
        }
    }

    /// Ranges for the smart-shirt signals.
    pub fn builtin() -> Self {
        Self::new([
            (
                "heart_rate".to_string(),
                SignalRange::new(40.0, 200.0, "BPM", "60-100 BPM (resting)", &["quality"]),
            ),
            (
                "breathing_rate".to_string(),
                SignalRange::new(8.0, 30.0, "breaths/min", "12-20 breaths/min", &["quality"]),
            ),
            (
                "acceleration".to_string(),
                SignalRange::new(-20.0, 20.0, "g", "±2g (normal movement)", &[]),
            ),
            (
                "systolic_pressure".to_string(),
                SignalRange::new(80.0, 200.0, "mmHg", "90-140 mmHg", &["adjusted"]),
            ),
            (
                "activity".to_string(),
                SignalRange::new(0.0, 100.0, "level", "0-100 scale", &["quality"]),
            ),
        ])
    }

    /// Built-ins with config entries layered on top (same name replaces).
    pub fn with_custom(custom: &[CustomSignalRange]) -> Self {
        let mut table = Self::builtin();
        for c in custom {
            if c.min >= c.max {
                log::warn!(
                    "Ignoring signal range '{}': min {} is not below max {}",
                    c.name,
                    c.min,
                    c.max
                );
                continue;
            }
            table.ranges.insert(
                c.name.to_lowercase(),
                SignalRange {
                    physical_min: c.min,
                    physical_max: c.max,
                    unit: c.unit.clone(),
                    normal_range: c.normal_range.clone().unwrap_or_else(|| "N/A".to_string()),
                    exclude: c.exclude.iter().map(|e| e.to_lowercase()).collect(),
                },
            );
        }
        table
    }

    pub fn get(&self, signal_type: &str) -> Option<&SignalRange> {
        self.ranges.get(&signal_type.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SignalRange)> {
        self.ranges.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolve a table's file stem (e.g. `acceleration_X`) to a signal type.
    ///
    /// Exact names win; otherwise the longest type name contained in the stem
    /// whose exclusion words are all absent.
    pub fn classify(&self, signal_name: &str) -> Option<&str> {
        let name = signal_name.to_lowercase();
        if let Some((key, _)) = self.ranges.get_key_value(&name) {
            return Some(key.as_str());
        }
        self.ranges
            .iter()
            .filter(|(key, range)| {
                name.contains(key.as_str())
                    && !range.exclude.iter().any(|x| name.contains(x.as_str()))
            })
            .max_by_key(|(key, _)| key.len())
            .map(|(key, _)| key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_builtin_names() {
        let t = SignalRangeTable::builtin();
        assert_eq!(t.classify("heart_rate"), Some("heart_rate"));
        assert_eq!(t.classify("Heart_Rate"), Some("heart_rate"));
        assert_eq!(t.classify("acceleration_X"), Some("acceleration"));
        assert_eq!(t.classify("breathing_rate"), Some("breathing_rate"));
        assert_eq!(t.classify("systolic_pressure"), Some("systolic_pressure"));
        assert_eq!(t.classify("activity"), Some("activity"));
    }

    #[test]
    fn test_classify_respects_exclusions() {
        let t = SignalRangeTable::builtin();
        assert_eq!(t.classify("heart_rate_quality"), None);
        assert_eq!(t.classify("systolic_pressure_adjusted"), None);
        assert_eq!(t.classify("ECG_I"), None);
    }

    #[test]
    fn test_custom_overrides_and_extends() {
        let custom = vec![
            CustomSignalRange {
                name: "heart_rate".into(),
                min: 30.0,
                max: 220.0,
                unit: "BPM".into(),
                normal_range: None,
                exclude: vec![],
            },
            CustomSignalRange {
                name: "SpO2".into(),
                min: 70.0,
                max: 100.0,
                unit: "%".into(),
                normal_range: Some("95-100 %".into()),
                exclude: vec![],
            },
            CustomSignalRange {
                name: "broken".into(),
                min: 5.0,
                max: 5.0,
                unit: "x".into(),
                normal_range: None,
                exclude: vec![],
            },
        ];
        let t = SignalRangeTable::with_custom(&custom);
        assert_eq!(t.get("heart_rate").unwrap().physical_min, 30.0);
        assert_eq!(t.get("spo2").unwrap().unit, "%");
        assert!(t.get("broken").is_none());
        assert_eq!(t.len(), 6);
    }
}
