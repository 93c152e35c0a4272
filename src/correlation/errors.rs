//! correlation::errors — error types for the FCS correlation pipeline.
//!
//! Purpose
//! -------
//! Provide a single error enum and result alias for every stage of the
//! correlation pipeline (settings validation, trace retrieval, multi-tau
//! correlation, block transformation, and covariance shrinkage), together
//! with a coarse [`ErrorKind`] classification callers can branch on.
//!
//! Key behaviors
//! -------------
//! - Define [`CorrelationResult`] and [`CorrelationError`] as the canonical
//!   result and error types of the crate.
//! - Attach human-readable `Display` messages that embed the offending value
//!   (channel index, monitor value, frame range, ...).
//! - Convert collaborator failures (`anyhow::Error` from frame sources and
//!   bleach correctors) into [`CorrelationError::TraceRetrieval`].
//! - Map all variants onto `ValueError` at the Python boundary when the
//!   `python-bindings` feature is enabled.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every failure is reported synchronously; nothing in this crate retries.
//! - A request that fails never leaves a partially populated pixel behind.
//!
//! Testing notes
//! -------------
//! - Unit tests verify payload embedding in `Display` messages and the
//!   variant → [`ErrorKind`] mapping.

#[cfg(feature = "python-bindings")]
use pyo3::{PyErr, exceptions::PyValueError};

pub type CorrelationResult<T> = Result<T, CorrelationError>;

/// ErrorKind — coarse classification of [`CorrelationError`] variants.
///
/// - `Degenerate`: the trace cannot support even one lag channel, or its
///   statistics would divide by zero.
/// - `InsufficientSamples`: the trace is valid but too short for the
///   requested multi-tau depth / blocking level.
/// - `InvalidSettings`: inconsistent correlator configuration or request.
/// - `Overlap`: cross-correlation regions overlap.
/// - `Retrieval`: a collaborator (frame source, bleach corrector) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Degenerate,
    InsufficientSamples,
    InvalidSettings,
    Overlap,
    Retrieval,
}

/// Unified error type for correlation requests.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrelationError {
    // ---- Degenerate traces ----
    /// Trace is shorter than the last lag of the schedule.
    TraceTooShort { len: usize, required: usize },

    /// The two traces of a cross-correlation differ in length.
    TraceLengthMismatch { first: usize, second: usize },

    /// An intensity sample is NaN or ±inf.
    NonFiniteIntensity { index: usize, value: f64 },

    /// Direct or delayed monitor is zero, negative, or non-finite.
    NonPositiveMonitor { channel: usize, direct: f64, delayed: f64 },

    /// Correlation value or variance of a channel overflowed to NaN or ±inf.
    NonFiniteCorrelation { channel: usize },

    // ---- Insufficient samples ----
    /// Too few samples for the requested multi-tau depth.
    InsufficientSamples { block_count: isize, required: usize },

    /// Blocking left fewer than two products per channel.
    TooFewProducts { channel: usize, available: usize, required: usize },

    // ---- Invalid settings ----
    /// Correlator p must be a positive multiple of four.
    InvalidCorrelatorP { p: usize },

    /// Correlator q must be at least one.
    InvalidCorrelatorQ { q: usize },

    /// Channel count does not match p/2·(q+1)+1.
    ChannelNumberMismatch { expected: usize, actual: usize },

    /// Frame time must be finite and strictly positive.
    InvalidFrameTime { value: f64 },

    /// Pixel binning must be at least 1×1.
    InvalidBinning { x: usize, y: usize },

    /// Frame range is empty or exceeds the stack.
    InvalidFrameRange { initial: usize, last: usize, available: usize },

    /// Requested pixel (including its binning window) is outside the image.
    PixelOutOfBounds { x: usize, y: usize, width: usize, height: usize },

    /// Sliding-window length leaves no full window in the frame range.
    NoSlidingWindow { num_frames: usize, window_length: usize },

    /// Restored layout does not match the grid it is loaded into.
    LayoutMismatch { reason: String },

    /// A named option (bleach correction, fit model, ...) was not recognised.
    UnknownOption { option: &'static str, value: String },

    // ---- Overlap ----
    /// DC-FCCS regions overlap for the configured CCF distance and binning.
    OverlappingRegions { ccf: (i64, i64), binning: (usize, usize) },

    // ---- Collaborators ----
    /// Frame source or bleach corrector failed.
    TraceRetrieval(String),
}

impl CorrelationError {
    /// Classify this error into one of the [`ErrorKind`] buckets.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CorrelationError::TraceTooShort { .. }
            | CorrelationError::TraceLengthMismatch { .. }
            | CorrelationError::NonFiniteIntensity { .. }
            | CorrelationError::NonPositiveMonitor { .. }
            | CorrelationError::NonFiniteCorrelation { .. } => ErrorKind::Degenerate,
            CorrelationError::InsufficientSamples { .. }
            | CorrelationError::TooFewProducts { .. } => ErrorKind::InsufficientSamples,
            CorrelationError::InvalidCorrelatorP { .. }
            | CorrelationError::InvalidCorrelatorQ { .. }
            | CorrelationError::ChannelNumberMismatch { .. }
            | CorrelationError::InvalidFrameTime { .. }
            | CorrelationError::InvalidBinning { .. }
            | CorrelationError::InvalidFrameRange { .. }
            | CorrelationError::PixelOutOfBounds { .. }
            | CorrelationError::NoSlidingWindow { .. }
            | CorrelationError::LayoutMismatch { .. }
            | CorrelationError::UnknownOption { .. } => ErrorKind::InvalidSettings,
            CorrelationError::OverlappingRegions { .. } => ErrorKind::Overlap,
            CorrelationError::TraceRetrieval(_) => ErrorKind::Retrieval,
        }
    }
}

impl std::error::Error for CorrelationError {}

impl std::fmt::Display for CorrelationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Degenerate traces ----
            CorrelationError::TraceTooShort { len, required } => write!(
                f,
                "Correlation Error: trace of {len} frames is too short; at least {required} \
                 frames are needed to form every lag channel"
            ),
            CorrelationError::TraceLengthMismatch { first, second } => write!(
                f,
                "Correlation Error: traces differ in length ({first} vs {second} frames)"
            ),
            CorrelationError::NonFiniteIntensity { index, value } => write!(
                f,
                "Correlation Error: intensity at frame {index} is {value}; must be finite"
            ),
            CorrelationError::NonPositiveMonitor { channel, direct, delayed } => write!(
                f,
                "Correlation Error: monitors at channel {channel} are not strictly positive \
                 (direct = {direct}, delayed = {delayed})"
            ),
            CorrelationError::NonFiniteCorrelation { channel } => write!(
                f,
                "Correlation Error: correlation at channel {channel} is not finite; \
                 intensities are too large"
            ),

            // ---- Insufficient samples ----
            CorrelationError::InsufficientSamples { block_count, required } => write!(
                f,
                "Correlation Error: block count {block_count} is too small; at least \
                 {required} blocking levels are required"
            ),
            CorrelationError::TooFewProducts { channel, available, required } => write!(
                f,
                "Correlation Error: channel {channel} has {available} products after \
                 blocking; {required} are required"
            ),

            // ---- Invalid settings ----
            CorrelationError::InvalidCorrelatorP { p } => write!(
                f,
                "Correlation Error: invalid correlator p = {p}; must be a positive multiple of 4"
            ),
            CorrelationError::InvalidCorrelatorQ { q } => {
                write!(f, "Correlation Error: invalid correlator q = {q}; must be at least 1")
            }
            CorrelationError::ChannelNumberMismatch { expected, actual } => write!(
                f,
                "Correlation Error: channel number {actual} does not match p/2·(q+1)+1 = {expected}"
            ),
            CorrelationError::InvalidFrameTime { value } => write!(
                f,
                "Correlation Error: invalid frame time {value}; must be finite and positive"
            ),
            CorrelationError::InvalidBinning { x, y } => {
                write!(f, "Correlation Error: invalid binning {x}x{y}; must be at least 1x1")
            }
            CorrelationError::InvalidFrameRange { initial, last, available } => write!(
                f,
                "Correlation Error: invalid frame range [{initial}, {last}] for a stack of \
                 {available} frames"
            ),
            CorrelationError::PixelOutOfBounds { x, y, width, height } => write!(
                f,
                "Correlation Error: pixel ({x}, {y}) is outside the {width}x{height} image"
            ),
            CorrelationError::NoSlidingWindow { num_frames, window_length } => write!(
                f,
                "Correlation Error: sliding window of {window_length} frames leaves no full \
                 window in {num_frames} frames"
            ),
            CorrelationError::LayoutMismatch { reason } => {
                write!(f, "Correlation Error: result layout mismatch ({reason})")
            }
            CorrelationError::UnknownOption { option, value } => {
                write!(f, "Correlation Error: unknown {option} '{value}'")
            }

            // ---- Overlap ----
            CorrelationError::OverlappingRegions { ccf, binning } => write!(
                f,
                "Correlation Error: cross-correlation areas overlap (ccf = {:?}, binning = {:?})",
                ccf, binning
            ),

            // ---- Collaborators ----
            CorrelationError::TraceRetrieval(msg) => {
                write!(f, "Correlation Error: trace retrieval failed: {msg}")
            }
        }
    }
}

impl From<anyhow::Error> for CorrelationError {
    fn from(err: anyhow::Error) -> Self {
        CorrelationError::TraceRetrieval(format!("{err:#}"))
    }
}

#[cfg(feature = "python-bindings")]
impl From<CorrelationError> for PyErr {
    fn from(err: CorrelationError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
