//! correlation::source — collaborator seams for intensity traces.
//!
//! Purpose
//! -------
//! Define what the correlator needs from the outside world: a
//! [`FrameSource`] that yields per-pixel intensity traces over a frame
//! range, and a [`BleachCorrector`] that pre-conditions each trace before it
//! reaches the correlation core. Both return `anyhow::Result`; failures are
//! surfaced to callers as `CorrelationError::TraceRetrieval`.
//!
//! Key behaviors
//! -------------
//! - [`TraceMode`] tells the source whether the trace is the first or second
//!   pixel of a pair, or the second color channel of a DC-FCCS request.
//! - [`ImageStack`] is an in-memory source over a `(frames, height, width)`
//!   array that sums the binning window per frame.
//! - [`NoBleachCorrection`] passes traces through unchanged.
//!
//! Conventions
//! -----------
//! - Pixel coordinates are `(x, y)` with `x` along the width.
//! - Frame ranges are inclusive: `[initial, last]`.

use anyhow::bail;
use ndarray::{Array1, Array3, Axis, s};

use crate::correlation::{
    errors::{CorrelationError, CorrelationResult},
    options::CorrelatorOptions,
};

/// Which trace of a request is being fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceMode {
    /// First (or only) pixel of a request.
    Direct,
    /// Second pixel of a cross-correlation.
    Cross,
    /// Second color channel of a DC-FCCS request.
    DualColor,
}

/// Provider of raw per-pixel intensity traces.
pub trait FrameSource {
    /// Image size as `(width, height)`.
    fn dimensions(&self) -> (usize, usize);

    /// Number of frames in the stack.
    fn num_frames(&self) -> usize;

    /// Intensity of the `binning` window anchored at `(x, y)` for every frame
    /// in `[initial, last]`.
    fn trace(
        &self, x: usize, y: usize, binning: (usize, usize), mode: TraceMode, initial: usize, last: usize,
    ) -> anyhow::Result<Array1<f64>>;
}

/// Pre-conditioning applied to every trace before correlation.
pub trait BleachCorrector {
    fn correct(&self, trace: Array1<f64>, options: &CorrelatorOptions) -> anyhow::Result<Array1<f64>>;
}

/// Identity corrector.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBleachCorrection;

impl BleachCorrector for NoBleachCorrection {
    fn correct(&self, trace: Array1<f64>, _options: &CorrelatorOptions) -> anyhow::Result<Array1<f64>> {
        Ok(trace)
    }
}

/// In-memory image stack laid out as `(frames, height, width)`.
///
/// The stack holds a single color channel, so [`TraceMode`] does not change
/// which samples are read.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageStack {
    frames: Array3<f64>,
}

impl ImageStack {
    /// Wrap a `(frames, height, width)` array.
    ///
    /// Errors
    /// ------
    /// - [`CorrelationError::LayoutMismatch`] if any axis is empty.
    ///
    /// Examples
    /// --------
    /// ```rust
    /// # use fcs_correlator::correlation::source::{FrameSource, ImageStack, TraceMode};
    /// # use ndarray::Array3;
    /// let stack = ImageStack::new(Array3::from_elem((10, 4, 6), 1.0)).unwrap();
    /// assert_eq!(stack.dimensions(), (6, 4));
    /// let trace = stack.trace(1, 1, (2, 2), TraceMode::Direct, 0, 9).unwrap();
    /// assert_eq!(trace.len(), 10);
    /// assert_eq!(trace[0], 4.0);
    /// ```
    pub fn new(frames: Array3<f64>) -> CorrelationResult<Self> {
        let (n, h, w) = frames.dim();
        if n == 0 || h == 0 || w == 0 {
            return Err(CorrelationError::LayoutMismatch {
                reason: format!("image stack has an empty axis ({n} frames, {h}x{w})"),
            });
        }
        Ok(ImageStack { frames })
    }

    pub fn frames(&self) -> &Array3<f64> {
        &self.frames
    }
}

impl FrameSource for ImageStack {
    fn dimensions(&self) -> (usize, usize) {
        let (_, h, w) = self.frames.dim();
        (w, h)
    }

    fn num_frames(&self) -> usize {
        self.frames.len_of(Axis(0))
    }

    fn trace(
        &self, x: usize, y: usize, binning: (usize, usize), _mode: TraceMode, initial: usize, last: usize,
    ) -> anyhow::Result<Array1<f64>> {
        let (width, height) = self.dimensions();
        if initial > last || last >= self.num_frames() {
            bail!("frame range [{initial}, {last}] outside stack of {} frames", self.num_frames());
        }
        if x + binning.0 > width || y + binning.1 > height {
            bail!("window at ({x}, {y}) with binning {binning:?} outside {width}x{height} image");
        }
        let window = self.frames.slice(s![initial..=last, y..y + binning.1, x..x + binning.0]);
        Ok(window.sum_axis(Axis(2)).sum_axis(Axis(1)))
    }
}
