//! correlation::options — multi-tau scheme and correlator configuration.
//!
//! Purpose
//! -------
//! Collect every knob that influences a correlation request in one validated
//! place: the multi-tau scheme `(p, q)`, the frame time, pixel binning, the
//! cross-correlation distance, the bleach-correction mode (which also switches
//! sliding-window correlation on), the fit model, and the fit strategy that
//! decides whether a regularized covariance matrix is produced.
//!
//! Key behaviors
//! -------------
//! - [`MultiTau::new`] validates `p` and `q` and derives the channel count
//!   `p/2·(q+1)+1`; [`MultiTau::with_channel_number`] additionally checks an
//!   externally supplied channel count against that relation.
//! - [`CorrelatorOptions::new`] validates the frame time; the remaining knobs
//!   use builder-style `with_*` setters with documented defaults.
//! - [`BleachCorrection`], [`FitModel`], and [`FitStrategy`] parse from and
//!   print to their display names ("Sliding Window", "DC-FCCS (2D)", "GLS").
//!
//! Invariants & assumptions
//! ------------------------
//! - `p >= 4` and `p % 4 == 0`, so the first exponential group continues the
//!   linear region without repeating a lag.
//! - `q >= 1`.
//! - `frame_time` is finite and strictly positive.
//! - Binning is at least 1×1.
//!
//! Conventions
//! -----------
//! - Options are immutable for the duration of a correlation run; the
//!   correlator clones them at construction and invalidates its lag-schedule
//!   cache whenever they are replaced.
//! - Invalid configurations surface as [`CorrelationError`] variants of kind
//!   `InvalidSettings`; no constructor panics.
//!
//! Testing notes
//! -------------
//! - Unit tests cover validation of `p`, `q`, the channel-count relation,
//!   frame time, binning, defaults, and name parsing of the enums.
use std::{fmt, str::FromStr};

use crate::correlation::errors::{CorrelationError, CorrelationResult};

/// MultiTau — validated multi-tau scheme `(p, q)`.
///
/// `p` is the number of channels in the first (linear) group and `q` the
/// number of exponentially coarsened groups that follow it. Each later group
/// contributes `p/2` channels, so the schedule has `p/2·(q+1)+1` channels in
/// total (channel 0 is the zero-lag channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MultiTau {
    p: usize,
    q: usize,
}

impl MultiTau {
    /// Construct a validated multi-tau scheme.
    ///
    /// Errors
    /// ------
    /// - [`CorrelationError::InvalidCorrelatorP`] if `p < 4` or `p % 4 != 0`.
    /// - [`CorrelationError::InvalidCorrelatorQ`] if `q == 0`.
    ///
    /// Examples
    /// --------
    /// ```rust
    /// # use fcs_correlator::correlation::options::MultiTau;
    /// let scheme = MultiTau::new(16, 8).unwrap();
    /// assert_eq!(scheme.channel_number(), 73);
    /// assert!(MultiTau::new(6, 2).is_err());
    /// ```
    pub fn new(p: usize, q: usize) -> CorrelationResult<Self> {
        if p < 4 || p % 4 != 0 {
            return Err(CorrelationError::InvalidCorrelatorP { p });
        }
        if q == 0 {
            return Err(CorrelationError::InvalidCorrelatorQ { q });
        }
        Ok(MultiTau { p, q })
    }

    /// Construct a scheme and check an externally supplied channel count.
    ///
    /// Errors
    /// ------
    /// - Any error of [`MultiTau::new`].
    /// - [`CorrelationError::ChannelNumberMismatch`] if `channel_number` is not
    ///   `p/2·(q+1)+1`.
    pub fn with_channel_number(p: usize, q: usize, channel_number: usize) -> CorrelationResult<Self> {
        let scheme = MultiTau::new(p, q)?;
        let expected = scheme.channel_number();
        if channel_number != expected {
            return Err(CorrelationError::ChannelNumberMismatch {
                expected,
                actual: channel_number,
            });
        }
        Ok(scheme)
    }

    pub fn p(&self) -> usize {
        self.p
    }

    pub fn q(&self) -> usize {
        self.q
    }

    /// Channels per exponential group (`p/2`).
    pub fn group_width(&self) -> usize {
        self.p / 2
    }

    /// Total number of lag channels, including channel 0.
    pub fn channel_number(&self) -> usize {
        self.group_width() * (self.q + 1) + 1
    }
}

/// Bleach-correction mode applied by the trace provider.
///
/// Only [`BleachCorrection::SlidingWindow`] changes how the correlator itself
/// behaves; every other mode is performed by the [`BleachCorrector`]
/// collaborator before traces reach the correlation core.
///
/// [`BleachCorrector`]: crate::correlation::source::BleachCorrector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BleachCorrection {
    #[default]
    None,
    SlidingWindow,
    SingleExp,
    DoubleExp,
    Polynomial,
    LinSegment,
}

impl BleachCorrection {
    pub fn as_str(&self) -> &'static str {
        match self {
            BleachCorrection::None => "none",
            BleachCorrection::SlidingWindow => "Sliding Window",
            BleachCorrection::SingleExp => "Single Exp",
            BleachCorrection::DoubleExp => "Double Exp",
            BleachCorrection::Polynomial => "Polynomial",
            BleachCorrection::LinSegment => "Lin Segment",
        }
    }
}

impl fmt::Display for BleachCorrection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BleachCorrection {
    type Err = CorrelationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize_name(s);
        let mode = match key.as_str() {
            "none" => BleachCorrection::None,
            "slidingwindow" => BleachCorrection::SlidingWindow,
            "singleexp" => BleachCorrection::SingleExp,
            "doubleexp" => BleachCorrection::DoubleExp,
            "polynomial" => BleachCorrection::Polynomial,
            "linsegment" => BleachCorrection::LinSegment,
            _ => {
                return Err(CorrelationError::UnknownOption {
                    option: "bleach correction",
                    value: s.to_string(),
                });
            }
        };
        Ok(mode)
    }
}

/// Fit model identifier. The correlator only inspects it to decide whether
/// traces are requested in dual-color mode (DC-FCCS).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitModel {
    DcFccs2d,
    #[default]
    ItirFcs2d,
    ItirFcs2dAlt,
    SpimFcs3d,
}

impl FitModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitModel::DcFccs2d => "DC-FCCS (2D)",
            FitModel::ItirFcs2d => "ITIR-FCS (2D)",
            FitModel::ItirFcs2dAlt => "ITIR-FCS (2D) 2",
            FitModel::SpimFcs3d => "SPIM-FCS (3D)",
        }
    }

    pub fn is_dual_color(&self) -> bool {
        matches!(self, FitModel::DcFccs2d)
    }
}

impl fmt::Display for FitModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FitModel {
    type Err = CorrelationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = normalize_name(s);
        let model = match key.as_str() {
            "dcfccs(2d)" | "dcfccs" => FitModel::DcFccs2d,
            "itirfcs(2d)" | "itirfcs" => FitModel::ItirFcs2d,
            "itirfcs(2d)2" => FitModel::ItirFcs2dAlt,
            "spimfcs(3d)" | "spimfcs" => FitModel::SpimFcs3d,
            _ => {
                return Err(CorrelationError::UnknownOption {
                    option: "fit model",
                    value: s.to_string(),
                });
            }
        };
        Ok(model)
    }
}

/// Fit back-end that will consume the correlation output.
///
/// Every strategy receives the same `(acf, lag_times, covariance)` triple;
/// only [`FitStrategy::Gls`] makes the correlator build the regularized
/// covariance matrix and report the ACF as the mean of the blocked products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitStrategy {
    #[default]
    Ols,
    Gls,
    Bayes,
}

impl FitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitStrategy::Ols => "OLS",
            FitStrategy::Gls => "GLS",
            FitStrategy::Bayes => "Bayes",
        }
    }

    pub fn needs_covariance(&self) -> bool {
        matches!(self, FitStrategy::Gls)
    }
}

impl fmt::Display for FitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FitStrategy {
    type Err = CorrelationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_name(s).as_str() {
            "ols" | "standard" => Ok(FitStrategy::Ols),
            "gls" => Ok(FitStrategy::Gls),
            "bayes" | "bayesian" => Ok(FitStrategy::Bayes),
            _ => Err(CorrelationError::UnknownOption {
                option: "fit strategy",
                value: s.to_string(),
            }),
        }
    }
}

/// CorrelatorOptions — experiment settings read by the correlator.
///
/// Fields
/// ------
/// - `multi_tau`: validated `(p, q)` scheme.
/// - `frame_time`: seconds per frame, finite and `> 0`.
/// - `binning`: pixel binning `(x, y)`, default `(1, 1)`.
/// - `ccf_distance`: cross-correlation offset `(dx, dy)`, default `(0, 0)`.
/// - `bleach_correction`: default [`BleachCorrection::None`].
/// - `sliding_window_length`: frames per window, default `0` (unset). Only
///   read when `bleach_correction` is [`BleachCorrection::SlidingWindow`].
/// - `fit_model`: default [`FitModel::ItirFcs2d`].
/// - `fit_strategy`: default [`FitStrategy::Ols`].
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatorOptions {
    multi_tau: MultiTau,
    frame_time: f64,
    binning: (usize, usize),
    ccf_distance: (i64, i64),
    bleach_correction: BleachCorrection,
    sliding_window_length: usize,
    fit_model: FitModel,
    fit_strategy: FitStrategy,
}

impl CorrelatorOptions {
    /// Construct options with validated frame time and default knobs.
    ///
    /// Errors
    /// ------
    /// - [`CorrelationError::InvalidFrameTime`] if `frame_time` is not finite
    ///   or not strictly positive.
    ///
    /// Examples
    /// --------
    /// ```rust
    /// # use fcs_correlator::correlation::options::{CorrelatorOptions, FitStrategy, MultiTau};
    /// let opts = CorrelatorOptions::new(MultiTau::new(16, 8).unwrap(), 1e-3)
    ///     .unwrap()
    ///     .with_fit_strategy(FitStrategy::Gls);
    /// assert!(opts.fit_strategy().needs_covariance());
    /// assert_eq!(opts.binning(), (1, 1));
    /// ```
    pub fn new(multi_tau: MultiTau, frame_time: f64) -> CorrelationResult<Self> {
        if !frame_time.is_finite() || frame_time <= 0.0 {
            return Err(CorrelationError::InvalidFrameTime { value: frame_time });
        }
        Ok(CorrelatorOptions {
            multi_tau,
            frame_time,
            binning: (1, 1),
            ccf_distance: (0, 0),
            bleach_correction: BleachCorrection::None,
            sliding_window_length: 0,
            fit_model: FitModel::ItirFcs2d,
            fit_strategy: FitStrategy::Ols,
        })
    }

    /// Set the pixel binning.
    ///
    /// Errors
    /// ------
    /// - [`CorrelationError::InvalidBinning`] if either dimension is zero.
    pub fn with_binning(mut self, x: usize, y: usize) -> CorrelationResult<Self> {
        if x == 0 || y == 0 {
            return Err(CorrelationError::InvalidBinning { x, y });
        }
        self.binning = (x, y);
        Ok(self)
    }

    pub fn with_ccf_distance(mut self, dx: i64, dy: i64) -> Self {
        self.ccf_distance = (dx, dy);
        self
    }

    pub fn with_bleach_correction(mut self, mode: BleachCorrection) -> Self {
        self.bleach_correction = mode;
        self
    }

    pub fn with_sliding_window_length(mut self, frames: usize) -> Self {
        self.sliding_window_length = frames;
        self
    }

    pub fn with_fit_model(mut self, model: FitModel) -> Self {
        self.fit_model = model;
        self
    }

    pub fn with_fit_strategy(mut self, strategy: FitStrategy) -> Self {
        self.fit_strategy = strategy;
        self
    }

    pub fn multi_tau(&self) -> MultiTau {
        self.multi_tau
    }

    pub fn frame_time(&self) -> f64 {
        self.frame_time
    }

    pub fn binning(&self) -> (usize, usize) {
        self.binning
    }

    pub fn ccf_distance(&self) -> (i64, i64) {
        self.ccf_distance
    }

    pub fn bleach_correction(&self) -> BleachCorrection {
        self.bleach_correction
    }

    pub fn sliding_window_length(&self) -> usize {
        self.sliding_window_length
    }

    pub fn fit_model(&self) -> FitModel {
        self.fit_model
    }

    pub fn fit_strategy(&self) -> FitStrategy {
        self.fit_strategy
    }

    /// Whether requests are split into independent sliding windows.
    pub fn uses_sliding_window(&self) -> bool {
        self.bleach_correction == BleachCorrection::SlidingWindow
    }
}

// ---- Helper methods ----

/// Lower-case and drop spaces, dashes, and underscores so that
/// "Sliding Window", "sliding_window", and "SLIDING-WINDOW" compare equal.
#[inline]
fn normalize_name(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Validation of `MultiTau::new` / `MultiTau::with_channel_number`.
    // - Frame-time and binning validation in `CorrelatorOptions`.
    // - Documented defaults and name parsing of the option enums.
    //
    // They intentionally DO NOT cover:
    // - How the options drive a correlation request (see `correlator.rs`).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify the channel-count relation for the common (16, 8) scheme.
    //
    // Given
    // -----
    // - `p = 16`, `q = 8`.
    //
    // Expect
    // ------
    // - `group_width() == 8` and `channel_number() == 8·9+1 == 73`.
    fn multi_tau_derives_channel_number() {
        // Act
        let scheme = MultiTau::new(16, 8).expect("(16, 8) is a valid scheme");

        // Assert
        assert_eq!(scheme.group_width(), 8);
        assert_eq!(scheme.channel_number(), 73);
    }

    #[test]
    // Purpose
    // -------
    // Ensure invalid `p` and `q` values are rejected with the matching variant.
    //
    // Given
    // -----
    // - `p ∈ {0, 2, 6, 10}` with a valid `q`, and `q = 0` with a valid `p`.
    //
    // Expect
    // ------
    // - `InvalidCorrelatorP` / `InvalidCorrelatorQ` carrying the input.
    fn multi_tau_rejects_invalid_p_and_q() {
        for p in [0, 2, 6, 10] {
            assert_eq!(MultiTau::new(p, 2), Err(CorrelationError::InvalidCorrelatorP { p }));
        }
        assert_eq!(MultiTau::new(16, 0), Err(CorrelationError::InvalidCorrelatorQ { q: 0 }));
    }

    #[test]
    // Purpose
    // -------
    // Verify that an inconsistent externally supplied channel count is caught.
    //
    // Given
    // -----
    // - `(p, q) = (16, 2)` whose channel count is 25, checked against 25 and 24.
    //
    // Expect
    // ------
    // - 25 is accepted; 24 yields `ChannelNumberMismatch { expected: 25, actual: 24 }`.
    fn with_channel_number_checks_relation() {
        assert!(MultiTau::with_channel_number(16, 2, 25).is_ok());
        assert_eq!(
            MultiTau::with_channel_number(16, 2, 24),
            Err(CorrelationError::ChannelNumberMismatch { expected: 25, actual: 24 })
        );
    }

    #[test]
    // Purpose
    // -------
    // Check frame-time validation and the documented defaults.
    //
    // Given
    // -----
    // - Frame times `0.0`, `-1.0`, `NaN`, and `1e-3`.
    //
    // Expect
    // ------
    // - The first three fail with `InvalidFrameTime`.
    // - The last succeeds with binning (1, 1), ccf (0, 0), no bleach
    //   correction, window length 0, ITIR-FCS (2D), and OLS.
    fn options_validate_frame_time_and_apply_defaults() {
        // Arrange
        let scheme = MultiTau::new(16, 8).unwrap();

        // Act & Assert
        for bad in [0.0, -1.0, f64::NAN] {
            let err = CorrelatorOptions::new(scheme, bad).unwrap_err();
            assert!(matches!(err, CorrelationError::InvalidFrameTime { .. }), "got {err:?}");
        }

        let opts = CorrelatorOptions::new(scheme, 1e-3).unwrap();
        assert_eq!(opts.binning(), (1, 1));
        assert_eq!(opts.ccf_distance(), (0, 0));
        assert_eq!(opts.bleach_correction(), BleachCorrection::None);
        assert_eq!(opts.sliding_window_length(), 0);
        assert_eq!(opts.fit_model(), FitModel::ItirFcs2d);
        assert_eq!(opts.fit_strategy(), FitStrategy::Ols);
        assert!(!opts.uses_sliding_window());
    }

    #[test]
    // Purpose
    // -------
    // Ensure zero binning is rejected.
    //
    // Given
    // -----
    // - `with_binning(0, 2)`.
    //
    // Expect
    // ------
    // - `InvalidBinning { x: 0, y: 2 }`.
    fn with_binning_rejects_zero() {
        let opts = CorrelatorOptions::new(MultiTau::new(16, 8).unwrap(), 1e-3).unwrap();
        assert_eq!(opts.with_binning(0, 2), Err(CorrelationError::InvalidBinning { x: 0, y: 2 }));
    }

    #[test]
    // Purpose
    // -------
    // Verify that display names parse back to their variants, tolerating
    // case and separator differences.
    //
    // Given
    // -----
    // - Every variant's `as_str()` plus a few alternative spellings.
    //
    // Expect
    // ------
    // - Parsing returns the original variant; unknown names fail with
    //   `UnknownOption`.
    fn option_enums_parse_display_names() {
        for mode in [
            BleachCorrection::None,
            BleachCorrection::SlidingWindow,
            BleachCorrection::SingleExp,
            BleachCorrection::DoubleExp,
            BleachCorrection::Polynomial,
            BleachCorrection::LinSegment,
        ] {
            assert_eq!(mode.as_str().parse::<BleachCorrection>(), Ok(mode));
        }
        for model in
            [FitModel::DcFccs2d, FitModel::ItirFcs2d, FitModel::ItirFcs2dAlt, FitModel::SpimFcs3d]
        {
            assert_eq!(model.as_str().parse::<FitModel>(), Ok(model));
        }
        assert_eq!("sliding_window".parse::<BleachCorrection>(), Ok(BleachCorrection::SlidingWindow));
        assert_eq!("gls".parse::<FitStrategy>(), Ok(FitStrategy::Gls));

        let err = "Triple Exp".parse::<BleachCorrection>().unwrap_err();
        assert!(matches!(err, CorrelationError::UnknownOption { .. }));
    }
}
