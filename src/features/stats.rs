//! Small numeric helpers shared by the feature builder and model stages.
//!
//! All helpers ignore `NaN` inputs, matching how the feature table encodes
//! missing cells. Empty input yields `NaN`.

use statrs::statistics::{Data, Median, Statistics};

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

pub fn median(values: &[f64]) -> f64 {
    let present = finite(values);
    if present.is_empty() {
        return f64::NAN;
    }
    Data::new(present).median()
}

/// Median absolute deviation around `center`.
pub fn median_abs_deviation(values: &[f64], center: f64) -> f64 {
    let deviations: Vec<f64> = values
        .iter()
        .filter(|v| !v.is_nan())
        .map(|v| (v - center).abs())
        .collect();
    median(&deviations)
}

pub fn mean(values: &[f64]) -> f64 {
    let present = finite(values);
    if present.is_empty() {
        return f64::NAN;
    }
    Statistics::mean(present.iter())
}

/// Sample standard deviation (n - 1 denominator); `NaN` below two values.
pub fn sample_std(values: &[f64]) -> f64 {
    let present = finite(values);
    if present.len() < 2 {
        return f64::NAN;
    }
    Statistics::std_dev(present.iter())
}

/// Population standard deviation (n denominator).
pub fn population_std(values: &[f64]) -> f64 {
    let present = finite(values);
    if present.is_empty() {
        return f64::NAN;
    }
    Statistics::population_std_dev(present.iter())
}

pub fn min(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, f64::min)
}

pub fn max(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, f64::max)
}

pub fn count_present(values: &[f64]) -> usize {
    values.iter().filter(|v| !v.is_nan()).count()
}

/// Fill `NaN` gaps with the previous present value, then fill any leading
/// gap with the first present value. A column with no present values is
/// left untouched.
pub fn forward_backward_fill(values: &mut [f64]) {
    let mut last = f64::NAN;
    for v in values.iter_mut() {
        if v.is_nan() {
            *v = last;
        } else {
            last = *v;
        }
    }

    let mut next = f64::NAN;
    for v in values.iter_mut().rev() {
        if v.is_nan() {
            *v = next;
        } else {
            next = *v;
        }
    }
}
