//! Descriptive statistics over plain `f64` slices.
//!
//! Empty input yields NaN rather than an error; reports print it as-is.

use super::{Cell, Dataset};
use std::collections::HashSet;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Quantile by linear interpolation between closest ranks.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let sorted = sorted(values);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(f64::NAN)
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(f64::NAN)
}

/// Pearson correlation over paired values.
///
/// Returns None with fewer than two pairs or zero variance on either side.
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in pairs {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx.sqrt() * syy.sqrt()))
}

/// Correlation between two columns over rows where both are present.
pub fn column_correlation(data: &Dataset, a: usize, b: usize) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = data
        .rows()
        .iter()
        .filter_map(|row| Some((row[a].as_number()?, row[b].as_number()?)))
        .collect();
    pearson(&pairs)
}

/// Column pairs (in column order) whose |r| exceeds `threshold`.
pub fn correlated_pairs(data: &Dataset, threshold: f64) -> Vec<(usize, usize, f64)> {
    let numeric = data.numeric_columns();
    let mut pairs = Vec::new();
    for (i, &a) in numeric.iter().enumerate() {
        for &b in &numeric[i + 1..] {
            if let Some(r) = column_correlation(data, a, b) {
                if r.abs() > threshold {
                    pairs.push((a, b, r));
                }
            }
        }
    }
    pairs
}

/// Rows identical to an earlier row.
pub fn duplicate_rows(data: &Dataset) -> usize {
    let mut seen = HashSet::new();
    data.rows()
        .iter()
        .filter(|row| {
            let key: Vec<String> = row
                .iter()
                .map(|cell| match cell {
                    Cell::Missing => "\u{0}missing".to_string(),
                    other => other.display(),
                })
                .collect();
            !seen.insert(key)
        })
        .count()
}

/// Present values of a column with their counts, most frequent first.
///
/// Ties keep first-seen order.
pub fn value_counts(data: &Dataset, idx: usize) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for cell in data.column(idx).filter(|c| !c.is_missing()) {
        let value = cell.display();
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Count of values outside the 1.5 × IQR fences.
pub fn iqr_outliers(values: &[f64]) -> usize {
    if values.is_empty() {
        return 0;
    }
    let q1 = quantile(values, 0.25);
    let q3 = quantile(values, 0.75);
    let iqr = q3 - q1;
    let (lo, hi) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);
    values.iter().filter(|&&v| v < lo || v > hi).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_central_tendency() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!(close(mean(&v), 2.5));
        assert!(close(median(&v), 2.5));
        assert!(close(median(&[5.0, 1.0, 3.0]), 3.0));
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn test_sample_std_dev() {
        // sample variance of 2,4,4,4,5,5,7,9 is 32/7
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(close(std_dev(&v), (32.0f64 / 7.0).sqrt()));
        assert!(std_dev(&[1.0]).is_nan());
    }

    #[test]
    fn test_quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(close(quantile(&v, 0.25), 2.0));
        assert!(close(quantile(&v, 0.75), 4.0));
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!(close(quantile(&v, 0.25), 1.75));
        assert!(close(quantile(&v, 0.0), 1.0));
        assert!(close(quantile(&v, 1.0), 4.0));
    }

    #[test]
    fn test_pearson() {
        let pos: Vec<_> = (0..10).map(|i| (i as f64, 2.0 * i as f64 + 1.0)).collect();
        assert!(close(pearson(&pos).unwrap(), 1.0));
        let neg: Vec<_> = (0..10).map(|i| (i as f64, -(i as f64))).collect();
        assert!(close(pearson(&neg).unwrap(), -1.0));
        let flat: Vec<_> = (0..10).map(|i| (i as f64, 3.0)).collect();
        assert_eq!(pearson(&flat), None);
        assert_eq!(pearson(&[(1.0, 1.0)]), None);
    }

    #[test]
    fn test_iqr_outliers() {
        let mut v: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(iqr_outliers(&v), 0);
        v.push(1000.0);
        assert_eq!(iqr_outliers(&v), 1);
    }

    #[test]
    fn test_duplicates_and_value_counts() {
        let data = Dataset::from_csv("k,v\na,1\nb,2\na,1\nb,\nb,\n".as_bytes()).unwrap();
        assert_eq!(duplicate_rows(&data), 2);
        assert_eq!(
            value_counts(&data, 0),
            vec![("b".to_string(), 3), ("a".to_string(), 2)]
        );
    }
}
