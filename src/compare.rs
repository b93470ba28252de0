use std::fmt;

use thiserror::Error;

use crate::slices::SlicePoint;

/// Summary statistics of one dCp column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

impl Stats {
    pub fn from_values(values: &[f64]) -> Result<Self, CompareError> {
        if values.is_empty() {
            return Err(CompareError::Empty);
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
        for &v in values {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }
        Ok(Stats {
            min,
            max,
            mean,
            std: var.sqrt(),
        })
    }
}

/// Side by side comparison of two Cp tables.
///
/// The absolute difference is taken over the common prefix of the two tables,
/// matching them row by row.
#[derive(Debug, Clone, Copy)]
pub struct Comparison {
    pub first: Stats,
    pub second: Stats,
    pub common_len: usize,
    pub max_abs_diff: f64,
    pub mean_abs_diff: f64,
}

impl Comparison {
    pub fn of(first: &[SlicePoint], second: &[SlicePoint]) -> Result<Self, CompareError> {
        let a: Vec<f64> = first.iter().map(|p| p.dcp).collect();
        let b: Vec<f64> = second.iter().map(|p| p.dcp).collect();
        let stats_a = Stats::from_values(&a)?;
        let stats_b = Stats::from_values(&b)?;

        let common_len = a.len().min(b.len());
        let diffs: Vec<f64> = a
            .iter()
            .zip(&b)
            .map(|(va, vb)| (va - vb).abs())
            .collect();
        let max_abs_diff = diffs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mean_abs_diff = diffs.iter().sum::<f64>() / common_len as f64;

        Ok(Comparison {
            first: stats_a,
            second: stats_b,
            common_len,
            max_abs_diff,
            mean_abs_diff,
        })
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<8} {:>10} {:>10} {:>10} {:>10}", "", "min", "max", "mean", "std")?;
        for (label, stats) in [("first", &self.first), ("second", &self.second)] {
            writeln!(
                f,
                "{:<8} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                label, stats.min, stats.max, stats.mean, stats.std
            )?;
        }
        writeln!(f, "common rows:   {}", self.common_len)?;
        writeln!(f, "max |ΔCp|:     {:.6}", self.max_abs_diff)?;
        write!(f, "mean |ΔCp|:    {:.6}", self.mean_abs_diff)
    }
}

#[derive(Debug, Error)]
pub enum CompareError {
    #[error("cannot compute statistics of an empty table")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn table(values: &[f64]) -> Vec<SlicePoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &dcp)| SlicePoint {
                x: i as f64,
                y: 0.0,
                dcp,
            })
            .collect()
    }

    #[test]
    fn stats_of_known_values() {
        let stats = Stats::from_values(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_abs_diff_eq!(stats.min, 1.0);
        assert_abs_diff_eq!(stats.max, 4.0);
        assert_abs_diff_eq!(stats.mean, 2.5);
        // population standard deviation
        assert_abs_diff_eq!(stats.std, (1.25_f64).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn empty_table_is_rejected() {
        assert!(matches!(Stats::from_values(&[]), Err(CompareError::Empty)));
    }

    #[test]
    fn comparison_uses_common_prefix() {
        let a = table(&[-1.0, -2.0, -3.0, -4.0]);
        let b = table(&[-1.5, -2.0, -2.0]);
        let cmp = Comparison::of(&a, &b).unwrap();
        assert_eq!(cmp.common_len, 3);
        assert_abs_diff_eq!(cmp.max_abs_diff, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cmp.mean_abs_diff, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn identical_tables_have_zero_difference() {
        let a = table(&[-0.5, -1.0]);
        let cmp = Comparison::of(&a, &a).unwrap();
        assert_abs_diff_eq!(cmp.max_abs_diff, 0.0);
        assert_abs_diff_eq!(cmp.mean_abs_diff, 0.0);
    }
}
