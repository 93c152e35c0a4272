//! Python-side input extraction for the bindings in `lib.rs`.

#[cfg(feature = "python-bindings")]
use std::str::FromStr;

#[cfg(feature = "python-bindings")]
use ndarray::{Array2, Array3};

#[cfg(feature = "python-bindings")]
use numpy::PyReadonlyArray3;

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyTypeError, exceptions::PyValueError, prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::correlation::{
    options::{BleachCorrection, CorrelatorOptions, FitModel, FitStrategy, MultiTau},
    source::ImageStack,
};

/// Convert a `(frames, height, width)` NumPy array or nested sequence into an
/// [`ImageStack`].
#[cfg(feature = "python-bindings")]
pub fn extract_image_stack<'py>(raw_frames: &Bound<'py, PyAny>) -> PyResult<ImageStack> {
    if let Ok(arr_ro) = raw_frames.extract::<PyReadonlyArray3<f64>>() {
        return Ok(ImageStack::new(arr_ro.as_array().to_owned())?);
    }

    let nested: Vec<Vec<Vec<f64>>> = raw_frames.extract().map_err(|_| {
        PyTypeError::new_err("expected a 3-D numpy.ndarray or nested sequence of float64 (frames, height, width)")
    })?;
    let frames = nested.len();
    let height = nested.first().map_or(0, Vec::len);
    let width = nested.first().and_then(|f| f.first()).map_or(0, Vec::len);
    let ragged = nested.iter().any(|frame| frame.len() != height || frame.iter().any(|row| row.len() != width));
    if ragged {
        return Err(PyValueError::new_err("image stack must be rectangular"));
    }
    let flat: Vec<f64> = nested.into_iter().flatten().flatten().collect();
    let array = Array3::from_shape_vec((frames, height, width), flat)
        .map_err(|e| PyValueError::new_err(format!("invalid image stack shape: {e}")))?;
    Ok(ImageStack::new(array)?)
}

/// Build [`CorrelatorOptions`] from keyword arguments, parsing the named
/// options with their display names ("GLS", "DC-FCCS (2D)", "Sliding Window").
#[cfg(feature = "python-bindings")]
pub fn build_options(
    frame_time: f64, p: usize, q: usize, binning: (usize, usize), ccf_distance: (i64, i64),
    bleach_correction: Option<&str>, sliding_window_length: usize, fit_model: Option<&str>,
    fit_strategy: Option<&str>,
) -> PyResult<CorrelatorOptions> {
    let bleach = bleach_correction.map(BleachCorrection::from_str).transpose()?.unwrap_or_default();
    let model = fit_model.map(FitModel::from_str).transpose()?.unwrap_or_default();
    let strategy = fit_strategy.map(FitStrategy::from_str).transpose()?.unwrap_or_default();

    let options = CorrelatorOptions::new(MultiTau::new(p, q)?, frame_time)?
        .with_binning(binning.0, binning.1)?
        .with_ccf_distance(ccf_distance.0, ccf_distance.1)
        .with_bleach_correction(bleach)
        .with_sliding_window_length(sliding_window_length)
        .with_fit_model(model)
        .with_fit_strategy(strategy);
    Ok(options)
}

/// Row-major `Vec<Vec<f64>>` copy of a matrix.
#[cfg(feature = "python-bindings")]
#[inline]
pub fn matrix_rows(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
    matrix.outer_iter().map(|row| row.to_vec()).collect()
}
