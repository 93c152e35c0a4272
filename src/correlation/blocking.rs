//! correlation::blocking — block transformation and blocking-level selection.
//!
//! Purpose
//! -------
//! Estimate how far the per-sample products of a correlation channel must be
//! coarsened before their samples behave as independent. The products of the
//! representative channel ([`BLOCK_LAG`]) are repeatedly averaged in pairs
//! and the standard error of their mean is tracked per level; the level where
//! that curve plateaus becomes the blocking level used for every channel.
//!
//! Key behaviors
//! -------------
//! - [`block_count`] derives the number of levels,
//!   `floor(log2(num_samples[BLOCK_LAG])) − 2`, and rejects schedules with
//!   fewer levels than `correlator_q`.
//! - [`block_transform`] builds the [`BlockVarianceCurve`]: per level `i`
//!   with `n_i` products (`n_i = n_{i−1} / 2`, truncating),
//!   `var_i = (Σp²/n_i − (Σp/n_i)²) / (n_i · (direct·delayed)²)`;
//!   the curve stores `sqrt(var_i)`, its error `sqrt(var_i)/sqrt(2(n_i − 1))`,
//!   and the block time `sample_time · 2^i · frame_time`.
//! - [`select_block_index`] scans the curve for the last triple whose error
//!   bars separate while the value keeps rising, then takes the first level
//!   after it where error bars overlap again. Without such a plateau it falls
//!   back to `block_count − 3` (or `block_count − 1` for three levels or
//!   fewer). The result is never below `correlator_q − 1`.
//!
//! Invariants & assumptions
//! ------------------------
//! - `correlator_q − 1 ≤ block_index ≤ block_count − 1` for every accepted
//!   schedule.
//! - Every level holds at least 8 products, so `n_i − 1 > 0`.
//! - Rounding noise can drive `var_i` fractionally below zero; it is clamped
//!   to zero. A variance that overflows to NaN or ±inf is an error, never a
//!   clamped zero.
//!
//! Testing notes
//! -------------
//! - Unit tests pin the selection scan on hand-built curves (plateau found,
//!   fallback for long and short curves, clamping to `q − 1`) and check the
//!   curve arithmetic on a periodic trace.

use ndarray::{Array1, Array2};
use tracing::warn;

use crate::correlation::{
    errors::{CorrelationError, CorrelationResult},
    lag_schedule::LagSchedule,
    products::{ChannelProducts, block_average, clamp_variance, sum_and_sum_of_squares},
};

/// Channel whose products drive the block transformation.
pub const BLOCK_LAG: usize = 1;

/// Standard error of the block means per blocking level.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockVarianceCurve {
    block_times: Array1<f64>,
    values: Array1<f64>,
    errors: Array1<f64>,
}

impl BlockVarianceCurve {
    /// Assemble a curve from parallel arrays of equal length.
    ///
    /// Errors
    /// ------
    /// - [`CorrelationError::LayoutMismatch`] if the lengths differ.
    pub fn new(block_times: Array1<f64>, values: Array1<f64>, errors: Array1<f64>) -> CorrelationResult<Self> {
        if block_times.len() != values.len() || values.len() != errors.len() {
            return Err(CorrelationError::LayoutMismatch {
                reason: format!(
                    "block curve arrays differ in length ({}, {}, {})",
                    block_times.len(),
                    values.len(),
                    errors.len()
                ),
            });
        }
        Ok(BlockVarianceCurve { block_times, values, errors })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn block_times(&self) -> &Array1<f64> {
        &self.block_times
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn errors(&self) -> &Array1<f64> {
        &self.errors
    }

    pub fn upper(&self, level: usize) -> f64 {
        self.values[level] + self.errors[level]
    }

    pub fn lower(&self, level: usize) -> f64 {
        self.values[level] - self.errors[level]
    }

    /// Stack as a `3 × len` matrix: block times, values, errors.
    pub fn to_rows(&self) -> Array2<f64> {
        let mut rows = Array2::<f64>::zeros((3, self.len()));
        rows.row_mut(0).assign(&self.block_times);
        rows.row_mut(1).assign(&self.values);
        rows.row_mut(2).assign(&self.errors);
        rows
    }
}

/// Block curve plus the level chosen from it.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockingOutcome {
    pub curve: BlockVarianceCurve,
    pub block_index: usize,
}

/// Number of blocking levels available for `schedule`.
///
/// Errors
/// ------
/// - [`CorrelationError::InsufficientSamples`] if fewer than `correlator_q`
///   levels exist (this includes every non-positive count).
pub fn block_count(schedule: &LagSchedule, correlator_q: usize) -> CorrelationResult<usize> {
    let samples = schedule.num_samples()[BLOCK_LAG];
    let count = if samples == 0 { -2 } else { samples.ilog2() as isize - 2 };
    let required = correlator_q.max(1);
    if count < required as isize {
        return Err(CorrelationError::InsufficientSamples { block_count: count, required });
    }
    Ok(count as usize)
}

/// Build the block curve from the products of the representative channel.
///
/// Parameters
/// ----------
/// - `products`: products of [`BLOCK_LAG`] at its native binning.
/// - `sample_time`: sample time of that channel.
/// - `frame_time`: seconds per frame.
/// - `levels`: number of levels, as returned by [`block_count`].
///
/// Errors
/// ------
/// - [`CorrelationError::NonFiniteCorrelation`] if a level variance
///   overflows.
pub fn block_transform(
    products: &ChannelProducts, sample_time: usize, frame_time: f64, levels: usize,
) -> CorrelationResult<BlockVarianceCurve> {
    let norm_sq = products.normalization().powi(2);
    let mut block_times = Array1::<f64>::zeros(levels);
    let mut values = Array1::<f64>::zeros(levels);
    let mut errors = Array1::<f64>::zeros(levels);

    let mut blocked = products.products.clone();
    for level in 0..levels {
        if level > 0 {
            blocked = block_average(blocked.view());
        }
        let n = blocked.len() as f64;
        let (sum, sum_sq) = sum_and_sum_of_squares(blocked.view());
        let variance = clamp_variance((sum_sq / n - (sum / n).powi(2)) / (n * norm_sq), BLOCK_LAG)?;

        block_times[level] = (sample_time << level) as f64 * frame_time;
        values[level] = variance.sqrt();
        errors[level] = values[level] / (2.0 * (n - 1.0)).sqrt();
    }

    Ok(BlockVarianceCurve { block_times, values, errors })
}

/// Pick the blocking level from `curve`.
///
/// The scan order and fallback thresholds are fixed; stored results depend
/// on them.
///
/// Examples
/// --------
/// ```rust
/// # use fcs_correlator::correlation::blocking::{BlockVarianceCurve, select_block_index};
/// # use ndarray::Array1;
/// // Flat curve with tight error bars: no rising triple, so fall back to len − 3.
/// let curve = BlockVarianceCurve::new(
///     Array1::linspace(1.0, 8.0, 8),
///     Array1::from_elem(8, 1.0),
///     Array1::from_elem(8, 0.01),
/// )
/// .unwrap();
/// assert_eq!(select_block_index(&curve, 1), 5);
/// ```
pub fn select_block_index(curve: &BlockVarianceCurve, correlator_q: usize) -> usize {
    let count = curve.len();
    let overlaps = |i: usize| curve.upper(i) > curve.lower(i + 1) && curve.upper(i + 1) > curve.lower(i);
    let increases = |i: usize| curve.values()[i + 1] - curve.values()[i] > 0.0;

    let mut last_rising = None;
    for i in 0..count.saturating_sub(2) {
        let overlap = overlaps(i) && overlaps(i + 1);
        let rising = increases(i) && increases(i + 1);
        if !overlap && rising {
            last_rising = Some(i);
        }
    }

    let mut index = 0;
    if let Some(last) = last_rising {
        for i in (last + 1)..count.saturating_sub(4) {
            if overlaps(i) && overlaps(i + 1) {
                index = i + 1;
                break;
            }
        }
    }

    if index == 0 {
        index = if count > 3 { count - 3 } else { count.saturating_sub(1) };
        warn!(block_count = count, block_index = index, "no blocking plateau found; using maximal blocking");
    }

    index.max(correlator_q.saturating_sub(1))
}
