//! correlation::lag_schedule — multi-tau lag schedule and its cache.
//!
//! Purpose
//! -------
//! Derive the four parallel arrays of a multi-tau correlator (integer lags,
//! lag times, sample times, and usable sample counts) for a given scheme,
//! frame time, and trace length, and cache the most recent schedule so
//! repeated requests over the same frame range do not rebuild it.
//!
//! Key behaviors
//! -------------
//! - [`LagSchedule::new`] builds the schedule:
//!   - linear region `lags[i] = i` for `i ∈ [0, p/2]` with sample time 1,
//!   - group `g ∈ [1, q]`, channel `c ∈ [1, p/2]` at index `g·p/2 + c` with
//!     `lags = 2^(g−1)·c + (p/4)·2^g` and sample time `2^(g−1)` for `g ≥ 2`
//!     (group 1 keeps sample time 1),
//!   - `num_samples[i] = (num_frames − lags[i]) / sample_times[i]`.
//! - [`LagScheduleCache`] holds a single schedule keyed by
//!   `(num_frames, p, q, frame_time)`; any key change rebuilds it and
//!   [`LagScheduleCache::invalidate`] drops it explicitly.
//!
//! Invariants & assumptions
//! ------------------------
//! - `lags` is strictly increasing; `sample_times` is non-decreasing and a
//!   power of two; `num_samples` is non-increasing.
//! - Every channel has at least one usable sample; shorter traces are
//!   rejected with [`CorrelationError::TraceTooShort`].
//! - After `k` pairwise rebinnings of an `n`-frame trace the binned length is
//!   `n >> k`, and `sample_times[i] == 1 << k` at that point, so
//!   `num_samples[i]` equals the product count the correlation core forms
//!   for channel `i`.
//!
//! Downstream usage
//! ----------------
//! - The correlation core, block transformer, and shrinkage estimator all
//!   read the same `Arc<LagSchedule>` through a per-call context.
use std::sync::Arc;

use ndarray::Array1;
use tracing::debug;

use crate::correlation::{
    errors::{CorrelationError, CorrelationResult},
    options::MultiTau,
};

/// LagSchedule — the multi-tau lag grid for one trace length.
#[derive(Debug, Clone, PartialEq)]
pub struct LagSchedule {
    multi_tau: MultiTau,
    num_frames: usize,
    lags: Array1<usize>,
    lag_times: Array1<f64>,
    sample_times: Array1<usize>,
    num_samples: Array1<usize>,
}

impl LagSchedule {
    /// Build the schedule for `num_frames` frames.
    ///
    /// Parameters
    /// ----------
    /// - `multi_tau`: validated `(p, q)` scheme.
    /// - `frame_time`: seconds per frame; lag times are `lags · frame_time`.
    /// - `num_frames`: length of the (unbinned) intensity trace.
    ///
    /// Errors
    /// ------
    /// - [`CorrelationError::TraceTooShort`] if the last channel would have no
    ///   usable sample, i.e. `num_frames < lags[last] + sample_times[last]`.
    ///
    /// Examples
    /// --------
    /// ```rust
    /// # use fcs_correlator::correlation::{lag_schedule::LagSchedule, options::MultiTau};
    /// let schedule = LagSchedule::new(&MultiTau::new(16, 2).unwrap(), 1e-3, 64).unwrap();
    /// assert_eq!(schedule.channel_number(), 25);
    /// assert_eq!(schedule.lags()[24], 32);
    /// assert_eq!(schedule.num_samples()[24], 16);
    /// ```
    pub fn new(multi_tau: &MultiTau, frame_time: f64, num_frames: usize) -> CorrelationResult<Self> {
        let channels = multi_tau.channel_number();
        let half = multi_tau.group_width();
        let quarter = multi_tau.p() / 4;

        let mut lags = Array1::<usize>::zeros(channels);
        let mut sample_times = Array1::<usize>::ones(channels);

        for i in 0..=half {
            lags[i] = i;
        }
        for group in 1..=multi_tau.q() {
            let stride = 1usize << (group - 1);
            for channel in 1..=half {
                let index = group * half + channel;
                lags[index] = stride * channel + quarter * (stride << 1);
                sample_times[index] = stride;
            }
        }

        let last = channels - 1;
        let required = lags[last] + sample_times[last];
        if num_frames < required {
            return Err(CorrelationError::TraceTooShort { len: num_frames, required });
        }

        let lag_times = lags.mapv(|lag| lag as f64 * frame_time);
        let num_samples = Array1::from_shape_fn(channels, |i| (num_frames - lags[i]) / sample_times[i]);

        Ok(LagSchedule { multi_tau: *multi_tau, num_frames, lags, lag_times, sample_times, num_samples })
    }

    pub fn multi_tau(&self) -> MultiTau {
        self.multi_tau
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn channel_number(&self) -> usize {
        self.lags.len()
    }

    pub fn lags(&self) -> &Array1<usize> {
        &self.lags
    }

    pub fn lag_times(&self) -> &Array1<f64> {
        &self.lag_times
    }

    pub fn sample_times(&self) -> &Array1<usize> {
        &self.sample_times
    }

    pub fn num_samples(&self) -> &Array1<usize> {
        &self.num_samples
    }

    /// Index of the last (longest-lag) channel.
    pub fn last_channel(&self) -> usize {
        self.lags.len() - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScheduleKey {
    num_frames: usize,
    multi_tau: MultiTau,
    frame_time_bits: u64,
}

/// Single-slot cache for the most recently used [`LagSchedule`].
#[derive(Debug, Clone, Default)]
pub struct LagScheduleCache {
    slot: Option<(ScheduleKey, Arc<LagSchedule>)>,
}

impl LagScheduleCache {
    pub fn new() -> Self {
        LagScheduleCache::default()
    }

    /// Return the cached schedule for this key, rebuilding it on a miss.
    ///
    /// Errors
    /// ------
    /// - Propagates [`LagSchedule::new`] errors; the slot is left untouched.
    pub fn get_or_build(
        &mut self, multi_tau: &MultiTau, frame_time: f64, num_frames: usize,
    ) -> CorrelationResult<Arc<LagSchedule>> {
        let key = ScheduleKey { num_frames, multi_tau: *multi_tau, frame_time_bits: frame_time.to_bits() };
        if let Some((cached, schedule)) = &self.slot {
            if *cached == key {
                return Ok(Arc::clone(schedule));
            }
        }

        let schedule = Arc::new(LagSchedule::new(multi_tau, frame_time, num_frames)?);
        debug!(
            num_frames,
            p = multi_tau.p(),
            q = multi_tau.q(),
            channels = schedule.channel_number(),
            "computed lag schedule"
        );
        self.slot = Some((key, Arc::clone(&schedule)));
        Ok(schedule)
    }

    /// The cached schedule, if any.
    pub fn current(&self) -> Option<&Arc<LagSchedule>> {
        self.slot.as_ref().map(|(_, schedule)| schedule)
    }

    pub fn invalidate(&mut self) {
        self.slot = None;
    }
}
