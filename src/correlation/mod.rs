//! correlation — multi-tau correlation core for imaging FCS.
//!
//! Purpose
//! -------
//! Compute per-pixel auto- and cross-correlation functions from camera
//! intensity traces, estimate their statistical errors by block
//! transformation, and (for GLS fits) produce a shrinkage-regularized
//! covariance matrix between correlation channels. This is the entry point
//! for Rust callers and for the Python bindings.
//!
//! Key behaviors
//! -------------
//! - [`lag_schedule`]: multi-tau lag schedule (lags, lag times, sample times,
//!   sample counts) and a single-slot cache keyed on frame count and
//!   settings.
//! - [`products`]: rebinning and monitor-normalized correlation products.
//! - [`blocking`]: block-variance curve and the plateau-based choice of the
//!   blocking level.
//! - [`shrinkage`]: regularized lag covariance for GLS.
//! - [`context`]: the pure per-call pipeline returning a
//!   [`CorrelationContext`] next to each [`PixelModel`].
//! - [`correlator`]: request orchestration, sliding windows, region sweeps,
//!   and the pixel grid.
//! - [`source`] / [`layout`]: collaborator seams and the persisted
//!   six-sheet layout.
//!
//! Invariants & assumptions
//! ------------------------
//! - Multi-tau settings satisfy `p ≥ 4`, `p % 4 == 0`, `q ≥ 1`; the channel
//!   count is `p/2·(q+1)+1`.
//! - Nothing stored in a [`PixelModel`] is NaN or infinite; degenerate inputs
//!   are reported as [`CorrelationError`] and leave the grid untouched.
//! - Every correlation call owns its scratch state, so different pixels can
//!   be correlated on different threads.
//!
//! Conventions
//! -----------
//! - Pixel coordinates are `(x, y)`; grids are indexed `[x, y]`.
//! - Frame ranges are inclusive.
//! - Lag times are in seconds (`lag · frame_time`).
//!
//! Downstream usage
//! ----------------
//! - Typical flow:
//!   1. Build [`CorrelatorOptions`] from a validated [`MultiTau`] and the
//!      frame time, adding binning, fit model, and strategy.
//!   2. Create a [`Correlator`] and call [`Correlator::correlate`] with a
//!      [`FrameSource`], a [`BleachCorrector`], and a [`PixelRequest`].
//!   3. Read the stored [`PixelModel`], the lag times, and (GLS) the
//!      regularized covariance matrix.
//! - Callers that manage their own threading can call
//!   [`correlate_traces`] directly with a shared [`LagSchedule`].
//!
//! Testing notes
//! -------------
//! - Each submodule carries unit tests for its own arithmetic and edge
//!   cases; `tests/` exercises full requests on synthetic image stacks.

pub mod blocking;
pub mod context;
pub mod correlator;
pub mod errors;
pub mod lag_schedule;
pub mod layout;
pub mod options;
pub mod pixel;
pub mod products;
pub mod shrinkage;
pub mod source;
pub mod validation;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::blocking::{BlockVarianceCurve, BlockingOutcome};
pub use self::context::{CorrelationContext, correlate_traces};
pub use self::correlator::{Correlator, PixelRequest, PixelStatus, RegionReport};
pub use self::errors::{CorrelationError, CorrelationResult, ErrorKind};
pub use self::lag_schedule::{LagSchedule, LagScheduleCache};
pub use self::layout::{ResultSheets, Sheet};
pub use self::options::{BleachCorrection, CorrelatorOptions, FitModel, FitStrategy, MultiTau};
pub use self::pixel::{PixelGrid, PixelModel};
pub use self::shrinkage::ShrinkageOutcome;
pub use self::source::{BleachCorrector, FrameSource, ImageStack, NoBleachCorrection, TraceMode};

// ---- Optional convenience prelude for downstream crates -------------------
//
//     use fcs_correlator::correlation::prelude::*;

pub mod prelude {
    pub use super::{
        BleachCorrection, BleachCorrector, CorrelationContext, CorrelationError, CorrelationResult,
        Correlator, CorrelatorOptions, FitModel, FitStrategy, FrameSource, ImageStack, LagSchedule,
        MultiTau, NoBleachCorrection, PixelGrid, PixelModel, PixelRequest, TraceMode,
        correlate_traces,
    };
}
