//! correlation::products — per-channel correlation products.
//!
//! Purpose
//! -------
//! Turn a pair of intensity traces into the per-sample correlation products
//! of one lag channel, together with the direct and delayed monitors that
//! normalize them. This is the arithmetic core shared by the block
//! transformer, the correlation function, and the shrinkage estimator.
//!
//! Key behaviors
//! -------------
//! - [`BinnedTraces`] owns working copies of both traces and coarsens them by
//!   pairwise summation whenever a channel's sample time doubles.
//! - [`BinnedTraces::channel_products`] forms, for `d = lag / sample_time`
//!   and `n = binned_len − d`:
//!   - `direct = mean(a[0..n))`, `delayed = mean(b[d..d+n))`,
//!   - `prod[k] = a[k]·b[k+d] − delayed·a[k] − direct·b[k+d] + direct·delayed`.
//! - [`block_average`] halves a product array by averaging adjacent pairs.
//!
//! Invariants & assumptions
//! ------------------------
//! - Monitors must exceed [`MONITOR_FLOOR`]; zero, negative, or non-finite
//!   monitors are reported as [`CorrelationError::NonPositiveMonitor`] rather
//!   than producing NaN downstream.
//! - Rebinning truncates: an odd trailing sample is dropped.
//!
//! Conventions
//! -----------
//! - `a` is the direct trace and `b` the delayed trace; for an
//!   autocorrelation both hold the same samples.
//! - No logging happens here.

use ndarray::{Array1, ArrayView1, Zip, s};

use crate::correlation::{
    errors::{CorrelationError, CorrelationResult},
    validation::validate_traces,
};

/// Smallest monitor value accepted as a normalization constant.
pub const MONITOR_FLOOR: f64 = 1e-12;

/// Products of one lag channel at the current binning.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelProducts {
    pub products: Array1<f64>,
    pub direct_monitor: f64,
    pub delayed_monitor: f64,
}

impl ChannelProducts {
    /// `direct_monitor · delayed_monitor`.
    pub fn normalization(&self) -> f64 {
        self.direct_monitor * self.delayed_monitor
    }

    /// Normalized correlation value `Σprod / (n · direct · delayed)`.
    pub fn correlation_mean(&self) -> f64 {
        self.products.sum() / (self.products.len() as f64 * self.normalization())
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

/// Working copies of the direct and delayed traces at a given sample time.
#[derive(Debug, Clone)]
pub struct BinnedTraces {
    direct: Array1<f64>,
    delayed: Array1<f64>,
    sample_time: usize,
    bin_count: usize,
}

impl BinnedTraces {
    /// Copy and validate two equally long traces at sample time 1.
    ///
    /// Errors
    /// ------
    /// - Propagates [`validate_traces`] errors.
    pub fn new(direct: ArrayView1<'_, f64>, delayed: ArrayView1<'_, f64>) -> CorrelationResult<Self> {
        validate_traces(direct, delayed)?;
        Ok(BinnedTraces { direct: direct.to_owned(), delayed: delayed.to_owned(), sample_time: 1, bin_count: 0 })
    }

    pub fn len(&self) -> usize {
        self.direct.len()
    }

    pub fn is_empty(&self) -> bool {
        self.direct.is_empty()
    }

    pub fn sample_time(&self) -> usize {
        self.sample_time
    }

    /// Number of pairwise summations applied so far (`log2(sample_time)`).
    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    /// Coarsen both traces until their sample time reaches `sample_time`.
    ///
    /// Each step replaces `x[i]` with `x[2i] + x[2i+1]` and halves the length.
    /// Requests for a sample time at or below the current one are no-ops.
    pub fn rebin_to(&mut self, sample_time: usize) {
        while self.sample_time < sample_time {
            self.direct = pairwise_sum(&self.direct);
            self.delayed = pairwise_sum(&self.delayed);
            self.sample_time <<= 1;
            self.bin_count += 1;
        }
    }

    /// Form the products of `channel` whose lag (in frames) is `lag`.
    ///
    /// Errors
    /// ------
    /// - [`CorrelationError::TraceTooShort`] if the binned traces cannot hold
    ///   one product at this delay.
    /// - [`CorrelationError::NonPositiveMonitor`] if either monitor does not
    ///   exceed [`MONITOR_FLOOR`].
    pub fn channel_products(&self, channel: usize, lag: usize) -> CorrelationResult<ChannelProducts> {
        let delay = lag / self.sample_time;
        let binned = self.len();
        if delay >= binned {
            return Err(CorrelationError::TraceTooShort {
                len: binned * self.sample_time,
                required: (delay + 1) * self.sample_time,
            });
        }
        let n = binned - delay;

        let a = self.direct.slice(s![..n]);
        let b = self.delayed.slice(s![delay..delay + n]);
        let direct_monitor = a.sum() / n as f64;
        let delayed_monitor = b.sum() / n as f64;
        if !monitor_is_valid(direct_monitor) || !monitor_is_valid(delayed_monitor) {
            return Err(CorrelationError::NonPositiveMonitor {
                channel,
                direct: direct_monitor,
                delayed: delayed_monitor,
            });
        }

        let mut products = Array1::<f64>::zeros(n);
        Zip::from(&mut products).and(&a).and(&b).for_each(|p, &x, &y| {
            *p = x * y - delayed_monitor * x - direct_monitor * y + direct_monitor * delayed_monitor;
        });

        Ok(ChannelProducts { products, direct_monitor, delayed_monitor })
    }
}

/// Halve `products` by averaging adjacent pairs; an odd tail is dropped.
///
/// Examples
/// --------
/// ```rust
/// # use fcs_correlator::correlation::products::block_average;
/// # use ndarray::array;
/// let blocked = block_average(array![1.0, 3.0, 5.0, 7.0, 100.0].view());
/// assert_eq!(blocked, array![2.0, 6.0]);
/// ```
pub fn block_average(products: ArrayView1<'_, f64>) -> Array1<f64> {
    Array1::from_shape_fn(products.len() / 2, |i| (products[2 * i] + products[2 * i + 1]) / 2.0)
}

/// Return `(Σp, Σp²)` over `products`.
pub fn sum_and_sum_of_squares(products: ArrayView1<'_, f64>) -> (f64, f64) {
    products.iter().fold((0.0, 0.0), |(sum, sum_sq), &p| (sum + p, sum_sq + p * p))
}

/// Clamp a round-off negative variance to zero.
///
/// Errors
/// ------
/// - [`CorrelationError::NonFiniteCorrelation`] if `variance` is NaN or ±inf.
pub fn clamp_variance(variance: f64, channel: usize) -> CorrelationResult<f64> {
    if !variance.is_finite() {
        return Err(CorrelationError::NonFiniteCorrelation { channel });
    }
    Ok(variance.max(0.0))
}

// ---- Helper methods ----

#[inline]
fn pairwise_sum(trace: &Array1<f64>) -> Array1<f64> {
    Array1::from_shape_fn(trace.len() / 2, |i| trace[2 * i] + trace[2 * i + 1])
}

#[inline]
fn monitor_is_valid(monitor: f64) -> bool {
    monitor.is_finite() && monitor > MONITOR_FLOOR
}
