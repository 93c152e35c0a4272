//! correlation::context — one correlation call as a pure pipeline.
//!
//! Purpose
//! -------
//! Run the full correlation of two intensity traces (block transformation,
//! per-channel correlation function, and, for GLS fits, covariance
//! shrinkage) without touching any shared state. Everything the call
//! produces besides the [`PixelModel`] is returned in a
//! [`CorrelationContext`] owned by the caller, so concurrent calls for
//! different pixels never alias scratch buffers.
//!
//! Key behaviors
//! -------------
//! - Block-transform the products of [`BLOCK_LAG`] and choose the blocking
//!   level.
//! - For every channel: rebin the traces to the channel's sample time, form
//!   the products, block them `block_index − bin_count` further times, and
//!   truncate them to
//!   `min_products = num_samples[last] >> max(block_index − log2(sample_times[last]), 0)`.
//! - `variance_acf[i] = (Σp²/m − (Σp/m)²) / ((m − 1)·(direct·delayed)²)`.
//! - Non-GLS: `acf[i]` is the normalized mean of the unblocked products.
//!   GLS: `acf[i]` is the mean of the truncated normalized products,
//!   `acf[0] = 0`, and the regularized covariance is attached to the context.
//!
//! Invariants & assumptions
//! ------------------------
//! - Both traces have exactly `schedule.num_frames()` samples.
//! - Blocking halves with integer truncation at every level, so odd product
//!   counts drop their trailing sample.
//! - No value stored in the returned model is NaN or infinite; products that
//!   overflow surface as `CorrelationError::NonFiniteCorrelation`.

use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1, s};
use tracing::debug;

use crate::correlation::{
    blocking::{BLOCK_LAG, BlockingOutcome, block_count, block_transform, select_block_index},
    errors::{CorrelationError, CorrelationResult},
    lag_schedule::LagSchedule,
    options::CorrelatorOptions,
    pixel::PixelModel,
    products::{BinnedTraces, block_average, clamp_variance, sum_and_sum_of_squares},
    shrinkage::{ShrinkageOutcome, estimate_shrinkage},
};

/// State produced by one correlation call alongside its [`PixelModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationContext {
    pub schedule: Arc<LagSchedule>,
    pub blocking: BlockingOutcome,
    /// Products per channel after blocking and truncation.
    pub min_products: usize,
    /// Present only for GLS fits.
    pub shrinkage: Option<ShrinkageOutcome>,
}

impl CorrelationContext {
    pub fn block_index(&self) -> usize {
        self.blocking.block_index
    }

    /// Regularized covariance for GLS fits, `(N−1)×(N−1)`.
    pub fn regularized_covariance(&self) -> Option<&Array2<f64>> {
        self.shrinkage.as_ref().map(|s| &s.regularized)
    }
}

/// Correlate `direct` against `delayed` over `schedule`.
///
/// Parameters
/// ----------
/// - `direct`, `delayed`: intensity traces after bleach correction. Pass the
///   same trace twice for an autocorrelation.
/// - `schedule`: lag schedule built for `direct.len()` frames.
/// - `options`: supplies `q`, the frame time, and the fit strategy.
///
/// Errors
/// ------
/// - [`CorrelationError::TraceLengthMismatch`] if the traces do not match
///   each other or the schedule.
/// - [`CorrelationError::NonFiniteIntensity`] /
///   [`CorrelationError::NonPositiveMonitor`] for degenerate traces.
/// - [`CorrelationError::InsufficientSamples`] if the schedule has fewer
///   blocking levels than `q`.
/// - [`CorrelationError::TooFewProducts`] if blocking leaves fewer than two
///   products per channel.
pub fn correlate_traces(
    direct: ArrayView1<'_, f64>, delayed: ArrayView1<'_, f64>, schedule: Arc<LagSchedule>,
    options: &CorrelatorOptions,
) -> CorrelationResult<(PixelModel, CorrelationContext)> {
    if direct.len() != schedule.num_frames() {
        return Err(CorrelationError::TraceLengthMismatch {
            first: direct.len(),
            second: schedule.num_frames(),
        });
    }
    let mut traces = BinnedTraces::new(direct, delayed)?;

    // ---- Block transformation ----
    let q = options.multi_tau().q();
    let levels = block_count(&schedule, q)?;
    let blocking = {
        // BLOCK_LAG lies in the linear region, so the traces need no rebinning.
        let sample_time = schedule.sample_times()[BLOCK_LAG];
        let products = traces.channel_products(BLOCK_LAG, schedule.lags()[BLOCK_LAG])?;
        let curve = block_transform(&products, sample_time, options.frame_time(), levels)?;
        let block_index = select_block_index(&curve, q);
        BlockingOutcome { curve, block_index }
    };
    let block_index = blocking.block_index;

    let last = schedule.last_channel();
    let last_bins = schedule.sample_times()[last].trailing_zeros() as usize;
    let min_products = schedule.num_samples()[last] >> block_index.saturating_sub(last_bins);
    if min_products < 2 {
        return Err(CorrelationError::TooFewProducts { channel: last, available: min_products, required: 2 });
    }

    // ---- Correlation function ----
    let channels = schedule.channel_number();
    let gls = options.fit_strategy().needs_covariance();
    let mut correlation_mean = Array1::<f64>::zeros(channels);
    let mut variance_acf = Array1::<f64>::zeros(channels);
    let mut normalized =
        if gls { Array2::<f64>::zeros((channels, min_products)) } else { Array2::zeros((0, 0)) };

    for channel in 0..channels {
        traces.rebin_to(schedule.sample_times()[channel]);
        let products = traces.channel_products(channel, schedule.lags()[channel])?;
        let norm = products.normalization();
        correlation_mean[channel] = products.correlation_mean();
        if !correlation_mean[channel].is_finite() {
            return Err(CorrelationError::NonFiniteCorrelation { channel });
        }

        let mut blocked = products.products;
        for _ in traces.bin_count()..block_index {
            blocked = block_average(blocked.view());
        }
        if blocked.len() < min_products {
            return Err(CorrelationError::TooFewProducts {
                channel,
                available: blocked.len(),
                required: min_products,
            });
        }
        let truncated = blocked.slice(s![..min_products]);

        let m = min_products as f64;
        let (sum, sum_sq) = sum_and_sum_of_squares(truncated);
        variance_acf[channel] =
            clamp_variance((sum_sq / m - (sum / m).powi(2)) / ((m - 1.0) * norm * norm), channel)?;

        if gls {
            normalized.row_mut(channel).assign(&truncated.mapv(|p| p / norm));
        }
    }

    // ---- Output ----
    let (acf, shrinkage) = if gls {
        let mut acf = Array1::<f64>::zeros(channels);
        for channel in 1..channels {
            acf[channel] = normalized.row(channel).sum() / min_products as f64;
        }
        let shrinkage = estimate_shrinkage(normalized.slice(s![1.., ..]))?;
        (acf, Some(shrinkage))
    } else {
        (correlation_mean, None)
    };

    debug!(channels, block_index, min_products, gls, "correlated traces");

    let model = PixelModel::new(acf, variance_acf)?;
    Ok((model, CorrelationContext { schedule, blocking, min_products, shrinkage }))
}
