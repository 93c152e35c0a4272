//! correlation::pixel — per-pixel correlation results.
//!
//! A [`PixelModel`] holds the ACF of one pixel (or pixel pair) together with
//! its per-channel variance and standard deviation, plus the optional arrays
//! a downstream fitter writes back (fitted curve, residuals, MSD, parameter
//! table). Sliding-window runs accumulate window results into a parent model
//! and average them once all windows are in.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};

use crate::correlation::errors::{CorrelationError, CorrelationResult};

/// Result grid indexed `[x, y]`; unset cells are `None`.
pub type PixelGrid = Array2<Option<PixelModel>>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PixelModel {
    acf: Array1<f64>,
    variance_acf: Array1<f64>,
    standard_deviation_acf: Array1<f64>,
    fitted_acf: Option<Array1<f64>>,
    residuals: Option<Array1<f64>>,
    msd: Option<Array1<f64>>,
    fit_parameters: Option<BTreeMap<String, f64>>,
    sliding_windows: usize,
}

impl PixelModel {
    /// Build a model from a freshly computed correlation.
    ///
    /// Errors
    /// ------
    /// - [`CorrelationError::LayoutMismatch`] if the arrays differ in length.
    /// - [`CorrelationError::NonFiniteCorrelation`] for the first channel whose
    ///   ACF or variance is NaN or ±inf.
    pub fn new(acf: Array1<f64>, variance_acf: Array1<f64>) -> CorrelationResult<Self> {
        if acf.len() != variance_acf.len() {
            return Err(CorrelationError::LayoutMismatch {
                reason: format!("acf has {} channels, variance has {}", acf.len(), variance_acf.len()),
            });
        }
        let non_finite = acf.iter().zip(variance_acf.iter()).position(|(a, v)| !a.is_finite() || !v.is_finite());
        if let Some(channel) = non_finite {
            return Err(CorrelationError::NonFiniteCorrelation { channel });
        }
        let standard_deviation_acf = variance_acf.mapv(f64::sqrt);
        Ok(PixelModel { acf, variance_acf, standard_deviation_acf, ..PixelModel::default() })
    }

    pub fn acf(&self) -> &Array1<f64> {
        &self.acf
    }

    pub fn variance_acf(&self) -> &Array1<f64> {
        &self.variance_acf
    }

    pub fn standard_deviation_acf(&self) -> &Array1<f64> {
        &self.standard_deviation_acf
    }

    pub fn fitted_acf(&self) -> Option<&Array1<f64>> {
        self.fitted_acf.as_ref()
    }

    pub fn residuals(&self) -> Option<&Array1<f64>> {
        self.residuals.as_ref()
    }

    pub fn msd(&self) -> Option<&Array1<f64>> {
        self.msd.as_ref()
    }

    pub fn fit_parameters(&self) -> Option<&BTreeMap<String, f64>> {
        self.fit_parameters.as_ref()
    }

    /// Number of sliding windows averaged into this model (0 for a full-trace run).
    pub fn sliding_windows(&self) -> usize {
        self.sliding_windows
    }

    // ---- Restoration and fitter write-back ----

    pub fn set_acf(&mut self, acf: Array1<f64>) {
        self.acf = acf;
    }

    /// Restore a standard deviation without a matching variance (the
    /// persisted layout does not carry variances); the variance is rebuilt
    /// as its square.
    pub fn set_standard_deviation_acf(&mut self, sd: Array1<f64>) {
        self.variance_acf = sd.mapv(|s| s * s);
        self.standard_deviation_acf = sd;
    }

    pub fn set_fitted_acf(&mut self, fitted: Option<Array1<f64>>) {
        self.fitted_acf = fitted;
    }

    pub fn set_residuals(&mut self, residuals: Option<Array1<f64>>) {
        self.residuals = residuals;
    }

    pub fn set_msd(&mut self, msd: Option<Array1<f64>>) {
        self.msd = msd;
    }

    pub fn set_fit_parameters(&mut self, parameters: Option<BTreeMap<String, f64>>) {
        self.fit_parameters = parameters;
    }

    // ---- Sliding windows ----

    /// Add one window's `acf` and `variance_acf` into the running sums.
    ///
    /// Errors
    /// ------
    /// - [`CorrelationError::LayoutMismatch`] if the window's channel count
    ///   differs from earlier windows.
    pub fn add_sliding_window(&mut self, window: &PixelModel) -> CorrelationResult<()> {
        if self.sliding_windows == 0 {
            self.acf = window.acf.clone();
            self.variance_acf = window.variance_acf.clone();
        } else {
            if window.acf.len() != self.acf.len() {
                return Err(CorrelationError::LayoutMismatch {
                    reason: format!(
                        "sliding window has {} channels, expected {}",
                        window.acf.len(),
                        self.acf.len()
                    ),
                });
            }
            self.acf += &window.acf;
            self.variance_acf += &window.variance_acf;
        }
        self.sliding_windows += 1;
        Ok(())
    }

    /// Turn the accumulated sums into means; the standard deviation is the
    /// square root of the mean variance. No-op when nothing was added.
    pub fn average_sliding_windows(&mut self) {
        if self.sliding_windows == 0 {
            return;
        }
        let count = self.sliding_windows as f64;
        self.acf /= count;
        self.variance_acf /= count;
        self.standard_deviation_acf = self.variance_acf.mapv(f64::sqrt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Construction and the derived standard deviation.
    // - Rejection of non-finite ACF or variance entries.
    // - Sliding-window accumulation and averaging.
    // - Channel-count mismatch between windows.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify that the standard deviation is the square root of the variance.
    //
    // Given
    // -----
    // - `variance = [4, 9]`.
    //
    // Expect
    // ------
    // - `sd = [2, 3]` and no fitter outputs.
    fn new_derives_standard_deviation() {
        let model = PixelModel::new(array![0.1, 0.2], array![4.0, 9.0]).unwrap();
        assert_eq!(model.standard_deviation_acf(), &array![2.0, 3.0]);
        assert!(model.fitted_acf().is_none());
        assert_eq!(model.sliding_windows(), 0);
    }

    #[test]
    // Purpose
    // -------
    // Ensure a model never holds NaN or infinite entries.
    //
    // Given
    // -----
    // - A NaN ACF entry at channel 1; an infinite variance at channel 2.
    //
    // Expect
    // ------
    // - `NonFiniteCorrelation` naming the offending channel.
    fn new_rejects_non_finite_entries() {
        let nan_acf = PixelModel::new(array![0.1, f64::NAN, 0.3], array![1.0, 1.0, 1.0]).unwrap_err();
        let inf_var = PixelModel::new(array![0.1, 0.2, 0.3], array![1.0, 1.0, f64::INFINITY]).unwrap_err();

        assert_eq!(nan_acf, CorrelationError::NonFiniteCorrelation { channel: 1 });
        assert_eq!(inf_var, CorrelationError::NonFiniteCorrelation { channel: 2 });
    }

    #[test]
    // Purpose
    // -------
    // Check that windows average acf and variance, with sd from the mean variance.
    //
    // Given
    // -----
    // - Windows with acf `[1, 2]`, `[3, 4]` and variances `[1, 4]`, `[9, 16]`.
    //
    // Expect
    // ------
    // - acf `[2, 3]`, variance `[5, 10]`, sd `[√5, √10]`, 2 windows.
    fn sliding_windows_average_acf_and_variance() {
        // Arrange
        let first = PixelModel::new(array![1.0, 2.0], array![1.0, 4.0]).unwrap();
        let second = PixelModel::new(array![3.0, 4.0], array![9.0, 16.0]).unwrap();
        let mut parent = PixelModel::default();

        // Act
        parent.add_sliding_window(&first).unwrap();
        parent.add_sliding_window(&second).unwrap();
        parent.average_sliding_windows();

        // Assert
        assert_eq!(parent.acf(), &array![2.0, 3.0]);
        assert_eq!(parent.variance_acf(), &array![5.0, 10.0]);
        assert_relative_eq!(parent.standard_deviation_acf()[0], 5.0_f64.sqrt());
        assert_relative_eq!(parent.standard_deviation_acf()[1], 10.0_f64.sqrt());
        assert_eq!(parent.sliding_windows(), 2);
    }

    #[test]
    // Purpose
    // -------
    // Ensure windows with different channel counts are rejected.
    //
    // Given
    // -----
    // - A 2-channel window followed by a 3-channel window.
    //
    // Expect
    // ------
    // - `LayoutMismatch` on the second add.
    fn sliding_window_channel_mismatch_is_rejected() {
        let mut parent = PixelModel::default();
        parent.add_sliding_window(&PixelModel::new(array![1.0, 2.0], array![1.0, 1.0]).unwrap()).unwrap();
        let err = parent
            .add_sliding_window(&PixelModel::new(array![1.0, 2.0, 3.0], array![1.0, 1.0, 1.0]).unwrap())
            .unwrap_err();
        assert!(matches!(err, CorrelationError::LayoutMismatch { .. }));
    }
}
