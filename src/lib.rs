//! fcs_correlator — imaging FCS correlation core with optional Python bindings.
//!
//! Purpose
//! -------
//! Serve as the crate root for Rust callers and as the PyO3 bridge that
//! exposes the correlator to Python via the `_fcs_correlator` extension
//! module. The numerical work (multi-tau correlation, block-transformation
//! error estimation, covariance shrinkage) lives in [`correlation`].
//!
//! Key behaviors
//! -------------
//! - Re-export the [`correlation`] module as the public crate surface.
//! - With the `python-bindings` feature, define a `Correlator` class over a
//!   3-D NumPy image stack and the `#[pymodule]` initializer.
//!
//! Invariants & assumptions
//! ------------------------
//! - This file performs only FFI glue, argument parsing, and error mapping;
//!   every [`correlation::CorrelationError`] reaches Python as `ValueError`.
//!
//! Conventions
//! -----------
//! - Python arguments use the same names as the Rust options (`p`, `q`,
//!   `frame_time`, `binning`, ...). Named options accept their display
//!   names, e.g. `fit_strategy="GLS"` or `bleach_correction="Sliding Window"`.
//! - Arrays are returned as Python lists (`list[float]`, `list[list[float]]`).
//!
//! Downstream usage
//! ----------------
//! - Rust code depends on [`correlation`] (or its `prelude`) directly and can
//!   ignore the feature-gated items.

pub mod correlation;
pub mod utils;

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::{
    correlation::{
        correlator::{Correlator, PixelRequest},
        source::{FrameSource, ImageStack, NoBleachCorrection},
    },
    utils::{build_options, extract_image_stack, matrix_rows},
};

/// FcsCorrelator — Python-facing correlator bound to one image stack.
///
/// Parameters
/// ----------
/// Constructed from Python via
/// `Correlator(frames, frame_time, /, p=16, q=8, binning=(1, 1), ...)`:
/// - `frames`: 3-D array-like `(frames, height, width)` of float64.
/// - `frame_time`: seconds per frame, `> 0`.
/// - `p`, `q`: multi-tau settings (`p` a multiple of 4, `q ≥ 1`).
/// - `binning`, `ccf_distance`: pixel binning and DC-FCCS offset.
/// - `bleach_correction`, `sliding_window_length`, `fit_model`,
///   `fit_strategy`: named options, see [`correlation::options`].
///
/// Notes
/// -----
/// - No bleach correction is applied besides sliding windows; traces are
///   expected to be pre-corrected.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "fcs_correlator", name = "Correlator")]
pub struct FcsCorrelator {
    stack: ImageStack,
    inner: Correlator,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl FcsCorrelator {
    #[new]
    #[pyo3(
        signature = (
            frames,
            frame_time,
            p = 16,
            q = 8,
            binning = (1, 1),
            ccf_distance = (0, 0),
            bleach_correction = None,
            sliding_window_length = 0,
            fit_model = None,
            fit_strategy = None,
        ),
        text_signature = "(frames, frame_time, /, p=16, q=8, binning=(1, 1), ccf_distance=(0, 0), \
                          bleach_correction=None, sliding_window_length=0, fit_model=None, \
                          fit_strategy=None)"
    )]
    pub fn new<'py>(
        frames: &Bound<'py, PyAny>, frame_time: f64, p: usize, q: usize, binning: (usize, usize),
        ccf_distance: (i64, i64), bleach_correction: Option<&str>, sliding_window_length: usize,
        fit_model: Option<&str>, fit_strategy: Option<&str>,
    ) -> PyResult<Self> {
        let stack = extract_image_stack(frames)?;
        let options = build_options(
            frame_time,
            p,
            q,
            binning,
            ccf_distance,
            bleach_correction,
            sliding_window_length,
            fit_model,
            fit_strategy,
        )?;
        Ok(FcsCorrelator { stack, inner: Correlator::new(options) })
    }

    /// Correlate `(x, y)` against `(x2, y2)` (default: itself) over the
    /// inclusive frame range, returning the ACF.
    #[pyo3(
        signature = (x, y, x2 = None, y2 = None, initial = 0, last = None),
        text_signature = "(self, x, y, /, x2=None, y2=None, initial=0, last=None)"
    )]
    pub fn correlate(
        &mut self, x: usize, y: usize, x2: Option<usize>, y2: Option<usize>, initial: usize,
        last: Option<usize>,
    ) -> PyResult<Vec<f64>> {
        let last = match last {
            Some(last) => last,
            None => self
                .stack
                .num_frames()
                .checked_sub(1)
                .ok_or_else(|| PyValueError::new_err("image stack has no frames"))?,
        };
        let request = PixelRequest::cross(x, y, x2.unwrap_or(x), y2.unwrap_or(y), initial, last);
        let model = self.inner.correlate(&self.stack, &NoBleachCorrection, request)?;
        Ok(model.acf().to_vec())
    }

    /// ACF stored at `(x, y)`, or `None` if that pixel was not correlated.
    pub fn acf(&self, x: usize, y: usize) -> Option<Vec<f64>> {
        self.inner.pixel_model(x, y).map(|m| m.acf().to_vec())
    }

    /// Standard deviation of the ACF stored at `(x, y)`.
    pub fn standard_deviation(&self, x: usize, y: usize) -> Option<Vec<f64>> {
        self.inner.pixel_model(x, y).map(|m| m.standard_deviation_acf().to_vec())
    }

    #[getter]
    pub fn lag_times(&self) -> Option<Vec<f64>> {
        self.inner.lag_times().map(|l| l.to_vec())
    }

    #[getter]
    pub fn sample_times(&self) -> Option<Vec<usize>> {
        self.inner.sample_times().map(|s| s.to_vec())
    }

    #[getter]
    pub fn block_index(&self) -> Option<usize> {
        self.inner.block_index()
    }

    /// Rows `[block_times, values, errors]` of the last block-variance curve.
    #[getter]
    pub fn variance_blocks(&self) -> Option<Vec<Vec<f64>>> {
        self.inner.variance_blocks().map(|rows| matrix_rows(&rows))
    }

    #[getter]
    pub fn regularized_covariance_matrix(&self) -> Option<Vec<Vec<f64>>> {
        self.inner.regularized_covariance_matrix().map(matrix_rows)
    }

    pub fn reset_results(&mut self) {
        self.inner.reset_results();
    }
}

/// _fcs_correlator — PyO3 module initializer for the Python extension.
///
/// Errors
/// ------
/// - `PyErr` if registering the class fails.
#[cfg(feature = "python-bindings")]
#[pymodule]
fn _fcs_correlator<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    m.add_class::<FcsCorrelator>()?;
    Ok(())
}
