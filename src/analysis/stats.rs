use serde::Serialize;

/// Descriptive statistics over one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Describe {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation (divides by n).
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
}

/// `None` for an empty slice.
pub fn describe(values: &[f64]) -> Option<Describe> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    Some(Describe {
        count: values.len(),
        mean,
        std: var.sqrt(),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        q25: percentile_sorted(&sorted, 25.0),
        median: percentile_sorted(&sorted, 50.0),
        q75: percentile_sorted(&sorted, 75.0),
    })
}

/// Percentile of an ascending slice, linear interpolation between closest ranks.
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (pct / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_basic() {
        let d = describe(&[4.0, 1.0, 3.0, 2.0]).unwrap();
        assert_eq!(d.count, 4);
        assert_eq!(d.mean, 2.5);
        assert_eq!(d.min, 1.0);
        assert_eq!(d.max, 4.0);
        // population variance of 1..4 is 1.25
        assert!((d.std - 1.25f64.sqrt()).abs() < 1e-12);
        assert_eq!(d.q25, 1.75);
        assert_eq!(d.median, 2.5);
        assert_eq!(d.q75, 3.25);
    }

    #[test]
    fn test_single_value() {
        let d = describe(&[7.0]).unwrap();
        assert_eq!(d.std, 0.0);
        assert_eq!(d.q25, 7.0);
        assert_eq!(d.q75, 7.0);
    }

    #[test]
    fn test_empty() {
        assert!(describe(&[]).is_none());
    }
}
