//! correlation::shrinkage — regularized lag-covariance matrix for GLS fits.
//!
//! Purpose
//! -------
//! Estimate the covariance between correlation channels from the blocked,
//! normalized products of channels `1..N`, and regularize it by shrinking the
//! variances toward their median and the correlations toward zero. The
//! resulting `(N−1)×(N−1)` matrix is what a GLS fitter consumes alongside
//! the ACF.
//!
//! Key behaviors
//! -------------
//! - Sample covariance `C` (divided by `m − 1`), filled for `i ≥ j` and
//!   mirrored.
//! - Variance weight `λ = Σ_i Σ_k ((x_ik − x̄_i)² − C_ii)² · m/(m−1)³
//!   / Σ_i (C_ii − median)²`, clamped to `[0, 1]`.
//! - Correlation matrix `R_ij = C_ij / sqrt(C_ii · C_jj)`.
//! - Covariance weight `ρ = Σ_{i>j} Σ_k (y_ik·y_jk − R_ij)² · m/(m−1)³
//!   / Σ_{i>j} R_ij²`, with `y = (x − x̄)/sqrt(C_ii)`, clamped to `[0, 1]`.
//! - Regularized matrix: `s_i = λ·median + (1−λ)·C_ii`; diagonal `s_i / m`,
//!   off-diagonal `(1−ρ)·R_ij·sqrt(s_i·s_j) / m`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Input rows are channels, columns are the `m ≥ 2` blocked samples; all
//!   rows have been truncated to the same `m`.
//! - A zero denominator in either weight resolves to full shrinkage (`1`).
//! - A channel with zero variance has zero correlation with every other
//!   channel.
//! - Both the raw and regularized matrices are exactly symmetric.
//!
//! Compatibility
//! -------------
//! - The median covers the `N − 1` diagonal entries of channels `1..N` only.
//!   Results stored by the ImFCS Java plugin took it over `N` entries that
//!   included a zero placeholder for channel 0, which biases the median low.
//!   `λ` and the regularized diagonal therefore differ from those results
//!   whenever the two medians differ.
//! - The per-pair spread in `ρ` starts from zero for every `(i, j)`. The
//!   Java plugin carried the running sum of a row across its pairs and
//!   rescaled it by `m/(m−1)³` each time. `ρ` and the off-diagonal entries
//!   differ from those results as soon as a row has two or more pairs.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use statrs::statistics::{Data, Median};

use crate::correlation::errors::{CorrelationError, CorrelationResult};

/// Everything the shrinkage estimator derives from one set of products.
#[derive(Debug, Clone, PartialEq)]
pub struct ShrinkageOutcome {
    /// Raw sample covariance `C`.
    pub covariance: Array2<f64>,
    /// Correlation matrix `R`.
    pub correlation: Array2<f64>,
    /// Median of the diagonal of `C`.
    pub median_variance: f64,
    /// Variance shrinkage weight `λ ∈ [0, 1]`.
    pub variance_weight: f64,
    /// Covariance shrinkage weight `ρ ∈ [0, 1]`.
    pub covariance_weight: f64,
    /// Regularized covariance of the channel means.
    pub regularized: Array2<f64>,
}

/// Estimate and regularize the covariance of normalized channel products.
///
/// Parameters
/// ----------
/// - `normalized`: `(channels, m)` matrix whose row `i` holds the blocked
///   products of one channel divided by its `direct · delayed` monitors.
///
/// Errors
/// ------
/// - [`CorrelationError::TooFewProducts`] if `m < 2` (the sample covariance
///   is undefined).
///
/// Examples
/// --------
/// ```rust
/// # use fcs_correlator::correlation::shrinkage::estimate_shrinkage;
/// # use ndarray::array;
/// let x = array![[0.1, -0.2, 0.3, 0.0], [0.2, 0.1, -0.1, 0.4], [-0.3, 0.2, 0.0, 0.1]];
/// let out = estimate_shrinkage(x.view()).unwrap();
/// assert!((0.0..=1.0).contains(&out.variance_weight));
/// assert_eq!(out.regularized[[0, 2]], out.regularized[[2, 0]]);
/// ```
pub fn estimate_shrinkage(normalized: ArrayView2<'_, f64>) -> CorrelationResult<ShrinkageOutcome> {
    let (channels, m) = normalized.dim();
    if m < 2 {
        return Err(CorrelationError::TooFewProducts { channel: 1, available: m, required: 2 });
    }
    let samples = m as f64;
    let scale = samples / (samples - 1.0).powi(3);

    let means = normalized.sum_axis(Axis(1)) / samples;
    let centered = &normalized - &means.view().insert_axis(Axis(1));

    // ---- Sample covariance ----
    let mut covariance = Array2::<f64>::zeros((channels, channels));
    for i in 0..channels {
        for j in 0..=i {
            let value = centered.row(i).dot(&centered.row(j)) / (samples - 1.0);
            covariance[[i, j]] = value;
            covariance[[j, i]] = value;
        }
    }
    let variances: Array1<f64> = covariance.diag().to_owned();
    let median_variance = Data::new(variances.to_vec()).median();

    // ---- Variance shrinkage ----
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, row) in centered.outer_iter().enumerate() {
        let spread: f64 = row.iter().map(|&x| (x * x - variances[i]).powi(2)).sum();
        numerator += spread * scale;
        denominator += (variances[i] - median_variance).powi(2);
    }
    let variance_weight = shrinkage_weight(numerator, denominator);

    // ---- Correlation and covariance shrinkage ----
    let std_devs = variances.mapv(f64::sqrt);
    let correlation = Array2::from_shape_fn((channels, channels), |(i, j)| {
        let denom = std_devs[i] * std_devs[j];
        if denom > 0.0 { covariance[[i, j]] / denom } else { 0.0 }
    });
    let standardized = Array2::from_shape_fn((channels, m), |(i, k)| {
        if std_devs[i] > 0.0 { centered[[i, k]] / std_devs[i] } else { 0.0 }
    });

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for i in 0..channels {
        for j in 0..i {
            let r = correlation[[i, j]];
            let spread: f64 = standardized
                .row(i)
                .iter()
                .zip(standardized.row(j).iter())
                .map(|(&yi, &yj)| (yi * yj - r).powi(2))
                .sum();
            numerator += spread * scale;
            denominator += r * r;
        }
    }
    let covariance_weight = shrinkage_weight(numerator, denominator);

    // ---- Regularized matrix ----
    let shrunk = variances.mapv(|v| variance_weight * median_variance + (1.0 - variance_weight) * v);
    let mut regularized = Array2::<f64>::zeros((channels, channels));
    for i in 0..channels {
        regularized[[i, i]] = shrunk[i] / samples;
        for j in 0..i {
            let value =
                (1.0 - covariance_weight) * correlation[[i, j]] * (shrunk[i] * shrunk[j]).sqrt() / samples;
            regularized[[i, j]] = value;
            regularized[[j, i]] = value;
        }
    }

    Ok(ShrinkageOutcome {
        covariance,
        correlation,
        median_variance,
        variance_weight,
        covariance_weight,
        regularized,
    })
}

// ---- Helper methods ----

/// `clamp(numerator / denominator, 0, 1)`, with degenerate ratios mapped to 1.
#[inline]
fn shrinkage_weight(numerator: f64, denominator: f64) -> f64 {
    let ratio = numerator / denominator;
    if denominator > 0.0 && ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 1.0 }
}
