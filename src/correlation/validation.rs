//! correlation::validation — shared input guards for correlation requests.
//!
//! Purpose
//! -------
//! Centralize the cheap precondition checks every correlation request runs
//! before touching a frame source or allocating product buffers: frame
//! ranges, pixel bounds (including the binning window), DC-FCCS region
//! overlap, and the shape and finiteness of intensity traces.
//!
//! Key behaviors
//! -------------
//! - Map each violated precondition onto a structured [`CorrelationError`]
//!   carrying the offending values.
//! - Never allocate beyond what error construction requires.
//!
//! Invariants & assumptions
//! ------------------------
//! - Frame indices are inclusive: `[initial, last]` covers
//!   `last − initial + 1` frames.
//! - A pixel `(x, y)` with binning `(bx, by)` reads the window
//!   `[x, x + bx) × [y, y + by)`, which must lie inside the image.
//! - DC-FCCS regions overlap when `|ccf.x| < bx` and `|ccf.y| < by`.
//!
//! Downstream usage
//! ----------------
//! - The correlator calls these guards at the top of every request so that
//!   a failing request never leaves a partially written grid cell.

use ndarray::ArrayView1;

use crate::correlation::{
    errors::{CorrelationError, CorrelationResult},
    options::CorrelatorOptions,
};

/// Validate an inclusive frame range against the stack length.
///
/// Returns
/// -------
/// The number of frames in the range, `last − initial + 1`.
///
/// Errors
/// ------
/// - [`CorrelationError::InvalidFrameRange`] if `initial > last` or
///   `last >= available`.
///
/// Examples
/// --------
/// ```rust
/// # use fcs_correlator::correlation::validation::validate_frame_range;
/// assert_eq!(validate_frame_range(0, 99, 100).unwrap(), 100);
/// assert!(validate_frame_range(10, 5, 100).is_err());
/// assert!(validate_frame_range(0, 100, 100).is_err());
/// ```
pub fn validate_frame_range(initial: usize, last: usize, available: usize) -> CorrelationResult<usize> {
    if initial > last || last >= available {
        return Err(CorrelationError::InvalidFrameRange { initial, last, available });
    }
    Ok(last - initial + 1)
}

/// Check that the binning window anchored at `(x, y)` fits in the image.
///
/// Errors
/// ------
/// - [`CorrelationError::PixelOutOfBounds`] otherwise.
pub fn validate_pixel(
    x: usize, y: usize, binning: (usize, usize), dimensions: (usize, usize),
) -> CorrelationResult<()> {
    let (width, height) = dimensions;
    let fits_x = x.checked_add(binning.0).is_some_and(|end| end <= width);
    let fits_y = y.checked_add(binning.1).is_some_and(|end| end <= height);
    if !fits_x || !fits_y {
        return Err(CorrelationError::PixelOutOfBounds { x, y, width, height });
    }
    Ok(())
}

/// Reject DC-FCCS requests whose two detection regions overlap.
///
/// Only applies when the configured fit model is DC-FCCS; every other model
/// passes unconditionally.
///
/// Errors
/// ------
/// - [`CorrelationError::OverlappingRegions`] when
///   `|ccf.x| < binning.x && |ccf.y| < binning.y`.
pub fn check_dual_color_overlap(options: &CorrelatorOptions) -> CorrelationResult<()> {
    if !options.fit_model().is_dual_color() {
        return Ok(());
    }
    let ccf = options.ccf_distance();
    let binning = options.binning();
    if ccf.0.unsigned_abs() < binning.0 as u64 && ccf.1.unsigned_abs() < binning.1 as u64 {
        return Err(CorrelationError::OverlappingRegions { ccf, binning });
    }
    Ok(())
}

/// Validate a pair of intensity traces before correlation.
///
/// Errors
/// ------
/// - [`CorrelationError::TraceLengthMismatch`] if the traces differ in length.
/// - [`CorrelationError::TraceTooShort`] if they are empty.
/// - [`CorrelationError::NonFiniteIntensity`] for the first NaN/±∞ sample
///   found in either trace.
pub fn validate_traces(direct: ArrayView1<'_, f64>, delayed: ArrayView1<'_, f64>) -> CorrelationResult<()> {
    if direct.len() != delayed.len() {
        return Err(CorrelationError::TraceLengthMismatch { first: direct.len(), second: delayed.len() });
    }
    if direct.is_empty() {
        return Err(CorrelationError::TraceTooShort { len: 0, required: 1 });
    }
    for trace in [direct.iter(), delayed.iter()] {
        if let Some((index, &value)) = trace.enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(CorrelationError::NonFiniteIntensity { index, value });
        }
    }
    Ok(())
}
