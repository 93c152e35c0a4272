//! correlation::correlator — request orchestration and the pixel-result grid.
//!
//! Purpose
//! -------
//! Turn a pixel (or pixel-pair) request into a stored [`PixelModel`]: fetch
//! the intensity traces from a [`FrameSource`], pre-condition them with a
//! [`BleachCorrector`], run the pure correlation pipeline either once over
//! the full frame range or once per sliding window, and write the result into
//! the grid. The correlator also keeps the header arrays (lag and sample
//! times), the context of the most recent request, and the named DCCF maps.
//!
//! Key behaviors
//! -------------
//! - [`Correlator::correlate`] validates the request, reuses the cached lag
//!   schedule when the frame count and settings are unchanged, and stores the
//!   cell only after the whole request succeeded.
//! - Sliding-window mode (bleach correction "Sliding Window") correlates
//!   `num_frames / window_length` windows independently; a trailing partial
//!   window is dropped. Window results are averaged into one model.
//! - [`Correlator::correlate_region`] runs many requests on the rayon pool;
//!   each request owns its [`CorrelationContext`], cells are written serially
//!   once the sweep finishes, and a raised stop flag skips pixels that have
//!   not started yet.
//! - [`Correlator::export_sheets`] / [`Correlator::load_sheets`] round-trip
//!   the grid through [`ResultSheets`].
//!
//! Invariants & assumptions
//! ------------------------
//! - A failed request leaves the grid, the header, and the last context as
//!   they were.
//! - The grid is `width × height` of the most recent source and is indexed
//!   `[x, y]`.
//! - Changing the options invalidates the cached lag schedule.
//!
//! Conventions
//! -----------
//! - Frame ranges are inclusive `[initial, last]`.
//! - An autocorrelation request has `(x, y) == (x2, y2)`; its single trace is
//!   correlated against itself.
//!
//! Downstream usage
//! ----------------
//! - Fitters read `acf`, `standard_deviation_acf`, [`Correlator::lag_times`]
//!   and, for GLS, [`Correlator::regularized_covariance_matrix`] right after
//!   the request that produced them, and write fitted curves back through
//!   [`Correlator::pixel_model_mut`].

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use ndarray::{Array1, Array2};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::correlation::{
    context::{CorrelationContext, correlate_traces},
    errors::{CorrelationError, CorrelationResult},
    lag_schedule::{LagSchedule, LagScheduleCache},
    layout::ResultSheets,
    options::CorrelatorOptions,
    pixel::{PixelGrid, PixelModel},
    source::{BleachCorrector, FrameSource, TraceMode},
    validation::{check_dual_color_overlap, validate_frame_range, validate_pixel},
};

/// One correlation request: pixel `(x, y)` against `(x2, y2)` over the
/// inclusive frame range `[initial, last]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelRequest {
    pub x: usize,
    pub y: usize,
    pub x2: usize,
    pub y2: usize,
    pub initial: usize,
    pub last: usize,
}

impl PixelRequest {
    pub fn auto(x: usize, y: usize, initial: usize, last: usize) -> Self {
        PixelRequest { x, y, x2: x, y2: y, initial, last }
    }

    pub fn cross(x: usize, y: usize, x2: usize, y2: usize, initial: usize, last: usize) -> Self {
        PixelRequest { x, y, x2, y2, initial, last }
    }

    pub fn is_auto(&self) -> bool {
        self.x == self.x2 && self.y == self.y2
    }
}

/// Per-request result of a region sweep.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelStatus {
    Done,
    /// Not started because the stop flag was raised.
    Skipped,
    Failed(CorrelationError),
}

/// Statuses of a region sweep, in request order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegionReport {
    pub statuses: Vec<PixelStatus>,
}

impl RegionReport {
    pub fn completed(&self) -> usize {
        self.count(|s| matches!(s, PixelStatus::Done))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, PixelStatus::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, PixelStatus::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&PixelStatus) -> bool) -> usize {
        self.statuses.iter().filter(|s| pred(s)).count()
    }
}

/// Correlator — owns the settings, the lag-schedule cache, and the results.
#[derive(Debug, Clone)]
pub struct Correlator {
    options: CorrelatorOptions,
    schedules: LagScheduleCache,
    pixel_models: Option<PixelGrid>,
    lag_times: Option<Array1<f64>>,
    sample_times: Option<Array1<usize>>,
    last_context: Option<CorrelationContext>,
    dccf: HashMap<String, Array2<f64>>,
}

impl Correlator {
    pub fn new(options: CorrelatorOptions) -> Self {
        Correlator {
            options,
            schedules: LagScheduleCache::new(),
            pixel_models: None,
            lag_times: None,
            sample_times: None,
            last_context: None,
            dccf: HashMap::new(),
        }
    }

    pub fn options(&self) -> &CorrelatorOptions {
        &self.options
    }

    /// Replace the settings. Stored results are kept; the schedule is rebuilt
    /// on the next request.
    pub fn set_options(&mut self, options: CorrelatorOptions) {
        self.options = options;
        self.schedules.invalidate();
    }

    // ---- Correlation requests ----

    /// Correlate one request and store the result at `(request.x, request.y)`.
    ///
    /// Parameters
    /// ----------
    /// - `source`: provides traces and the image dimensions.
    /// - `corrector`: applied to every fetched trace.
    /// - `request`: pixel pair and inclusive frame range.
    ///
    /// Returns
    /// -------
    /// The stored model.
    ///
    /// Errors
    /// ------
    /// - [`CorrelationError::InvalidFrameRange`],
    ///   [`CorrelationError::PixelOutOfBounds`],
    ///   [`CorrelationError::NoSlidingWindow`] for invalid requests.
    /// - [`CorrelationError::OverlappingRegions`] for overlapping DC-FCCS
    ///   regions.
    /// - [`CorrelationError::TraceRetrieval`] when a collaborator fails.
    /// - Any error of the correlation pipeline.
    ///
    /// Examples
    /// --------
    /// ```rust
    /// # use fcs_correlator::correlation::prelude::*;
    /// # use ndarray::Array3;
    /// let frames = Array3::from_shape_fn((512, 2, 2), |(t, _, _)| 100.0 + ((t * 7919) % 13) as f64);
    /// let stack = ImageStack::new(frames).unwrap();
    /// let options = CorrelatorOptions::new(MultiTau::new(8, 2).unwrap(), 1e-3).unwrap();
    /// let mut correlator = Correlator::new(options);
    ///
    /// let model = correlator
    ///     .correlate(&stack, &NoBleachCorrection, PixelRequest::auto(1, 0, 0, 511))
    ///     .unwrap();
    /// assert_eq!(model.acf().len(), 13);
    /// assert!(correlator.pixel_model(1, 0).is_some());
    /// assert!(correlator.pixel_model(0, 0).is_none());
    /// ```
    pub fn correlate<S, B>(
        &mut self, source: &S, corrector: &B, request: PixelRequest,
    ) -> CorrelationResult<&PixelModel>
    where
        S: FrameSource + ?Sized,
        B: BleachCorrector + ?Sized,
    {
        let plan = plan_request(&self.options, source, &request)?;
        let multi_tau = self.options.multi_tau();
        let schedule =
            self.schedules.get_or_build(&multi_tau, self.options.frame_time(), plan.schedule_frames)?;

        debug!(
            x = request.x,
            y = request.y,
            x2 = request.x2,
            y2 = request.y2,
            frames = plan.num_frames,
            windows = plan.windows,
            "correlation request started"
        );
        let (model, context) = run_request(&self.options, source, corrector, &request, &plan, schedule)?;
        debug!(x = request.x, y = request.y, block_index = context.block_index(), "correlation request finished");

        self.store_header(&context.schedule);
        self.last_context = Some(context);
        let grid = self.grid_for(source.dimensions());
        Ok(&*grid[[request.x, request.y]].insert(model))
    }

    /// Autocorrelation of `(x, y)` over `[initial, last]`.
    pub fn correlate_auto<S, B>(
        &mut self, source: &S, corrector: &B, x: usize, y: usize, initial: usize, last: usize,
    ) -> CorrelationResult<&PixelModel>
    where
        S: FrameSource + ?Sized,
        B: BleachCorrector + ?Sized,
    {
        self.correlate(source, corrector, PixelRequest::auto(x, y, initial, last))
    }

    /// Correlate many requests in parallel.
    ///
    /// Requests that have not started when `stop` is raised are reported as
    /// [`PixelStatus::Skipped`]. Failed requests leave their cells untouched.
    /// When several requests succeed, the last successful one in request
    /// order supplies the header and the last context.
    pub fn correlate_region<S, B>(
        &mut self, source: &S, corrector: &B, requests: &[PixelRequest], stop: &AtomicBool,
    ) -> RegionReport
    where
        S: FrameSource + Sync + ?Sized,
        B: BleachCorrector + Sync + ?Sized,
    {
        let options = &self.options;
        let plans: Vec<CorrelationResult<RequestPlan>> =
            requests.iter().map(|request| plan_request(options, source, request)).collect();

        let mut schedules: HashMap<usize, CorrelationResult<Arc<LagSchedule>>> = HashMap::new();
        for plan in plans.iter().flatten() {
            schedules.entry(plan.schedule_frames).or_insert_with(|| {
                LagSchedule::new(&options.multi_tau(), options.frame_time(), plan.schedule_frames)
                    .map(Arc::new)
            });
        }

        let outcomes: Vec<Option<CorrelationResult<(PixelModel, CorrelationContext)>>> = requests
            .par_iter()
            .zip(plans.par_iter())
            .map(|(request, plan)| {
                if stop.load(Ordering::Relaxed) {
                    return None;
                }
                let result = plan.as_ref().map_err(Clone::clone).and_then(|plan| {
                    let schedule = match schedules.get(&plan.schedule_frames) {
                        Some(built) => built.clone()?,
                        None => Arc::new(LagSchedule::new(
                            &options.multi_tau(),
                            options.frame_time(),
                            plan.schedule_frames,
                        )?),
                    };
                    run_request(options, source, corrector, request, plan, schedule)
                });
                Some(result)
            })
            .collect();

        let mut report = RegionReport { statuses: Vec::with_capacity(requests.len()) };
        for (request, outcome) in requests.iter().zip(outcomes) {
            let status = match outcome {
                None => PixelStatus::Skipped,
                Some(Err(err)) => PixelStatus::Failed(err),
                Some(Ok((model, context))) => {
                    self.store_header(&context.schedule);
                    self.last_context = Some(context);
                    self.grid_for(source.dimensions())[[request.x, request.y]] = Some(model);
                    PixelStatus::Done
                }
            };
            report.statuses.push(status);
        }

        info!(
            requested = requests.len(),
            completed = report.completed(),
            failed = report.failed(),
            skipped = report.skipped(),
            cancelled = stop.load(Ordering::Relaxed),
            "region sweep finished"
        );
        report
    }

    // ---- Results ----

    pub fn pixel_model(&self, x: usize, y: usize) -> Option<&PixelModel> {
        self.pixel_models.as_ref()?.get([x, y])?.as_ref()
    }

    /// Mutable access for fitter write-back.
    pub fn pixel_model_mut(&mut self, x: usize, y: usize) -> Option<&mut PixelModel> {
        self.pixel_models.as_mut()?.get_mut([x, y])?.as_mut()
    }

    pub fn pixel_models(&self) -> Option<&PixelGrid> {
        self.pixel_models.as_ref()
    }

    /// Replace the whole grid (bulk restore).
    pub fn set_pixel_models(&mut self, grid: PixelGrid) {
        self.pixel_models = Some(grid);
    }

    pub fn lag_times(&self) -> Option<&Array1<f64>> {
        self.lag_times.as_ref()
    }

    pub fn sample_times(&self) -> Option<&Array1<usize>> {
        self.sample_times.as_ref()
    }

    /// Block-variance curve of the last request as rows
    /// `[block_times, values, errors]`.
    pub fn variance_blocks(&self) -> Option<Array2<f64>> {
        self.last_context.as_ref().map(|ctx| ctx.blocking.curve.to_rows())
    }

    pub fn block_index(&self) -> Option<usize> {
        self.last_context.as_ref().map(CorrelationContext::block_index)
    }

    /// Regularized covariance of the last request; `None` unless it ran
    /// with a GLS fit strategy.
    pub fn regularized_covariance_matrix(&self) -> Option<&Array2<f64>> {
        self.last_context.as_ref()?.regularized_covariance()
    }

    pub fn last_context(&self) -> Option<&CorrelationContext> {
        self.last_context.as_ref()
    }

    pub fn dccf(&self, direction: &str) -> Option<&Array2<f64>> {
        self.dccf.get(direction)
    }

    pub fn set_dccf(&mut self, direction: impl Into<String>, map: Array2<f64>) {
        self.dccf.insert(direction.into(), map);
    }

    /// Drop the grid and the last context.
    pub fn reset_results(&mut self) {
        self.pixel_models = None;
        self.last_context = None;
    }

    // ---- Persisted layout ----

    /// Flatten the grid and header into [`ResultSheets`].
    ///
    /// Errors
    /// ------
    /// - [`CorrelationError::LayoutMismatch`] if there is nothing to export.
    pub fn export_sheets(&self) -> CorrelationResult<ResultSheets> {
        let (Some(grid), Some(lag_times), Some(sample_times)) =
            (&self.pixel_models, &self.lag_times, &self.sample_times)
        else {
            return Err(CorrelationError::LayoutMismatch { reason: "no correlation results to export".to_string() });
        };
        ResultSheets::from_grid(grid, lag_times.clone(), sample_times.clone())
    }

    /// Restore a `width × height` grid and its header from `sheets`.
    ///
    /// The last context is cleared since the restored results did not come
    /// from a request.
    pub fn load_sheets(&mut self, sheets: &ResultSheets, dimensions: (usize, usize)) -> CorrelationResult<()> {
        let grid = sheets.to_grid(dimensions.0, dimensions.1)?;
        self.pixel_models = Some(grid);
        self.lag_times = Some(sheets.lag_times.clone());
        self.sample_times = Some(sheets.sample_times.clone());
        self.last_context = None;
        Ok(())
    }

    // ---- Helper methods ----

    #[inline]
    fn store_header(&mut self, schedule: &LagSchedule) {
        self.lag_times = Some(schedule.lag_times().clone());
        self.sample_times = Some(schedule.sample_times().clone());
    }

    fn grid_for(&mut self, dimensions: (usize, usize)) -> &mut PixelGrid {
        let grid = self.pixel_models.get_or_insert_with(|| Array2::from_elem(dimensions, None));
        if grid.dim() != dimensions {
            *grid = Array2::from_elem(dimensions, None);
        }
        grid
    }
}

/// Frame bookkeeping for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequestPlan {
    num_frames: usize,
    /// Frames per correlation run: the window length, or `num_frames`.
    schedule_frames: usize,
    /// Sliding windows, or 0 for a full-trace run.
    windows: usize,
}

fn plan_request<S>(
    options: &CorrelatorOptions, source: &S, request: &PixelRequest,
) -> CorrelationResult<RequestPlan>
where
    S: FrameSource + ?Sized,
{
    let num_frames = validate_frame_range(request.initial, request.last, source.num_frames())?;
    let dimensions = source.dimensions();
    validate_pixel(request.x, request.y, options.binning(), dimensions)?;
    validate_pixel(request.x2, request.y2, options.binning(), dimensions)?;
    check_dual_color_overlap(options)?;

    if !options.uses_sliding_window() {
        return Ok(RequestPlan { num_frames, schedule_frames: num_frames, windows: 0 });
    }
    let window_length = options.sliding_window_length();
    let windows = num_frames.checked_div(window_length).unwrap_or(0);
    if windows == 0 {
        return Err(CorrelationError::NoSlidingWindow { num_frames, window_length });
    }
    Ok(RequestPlan { num_frames, schedule_frames: window_length, windows })
}

fn run_request<S, B>(
    options: &CorrelatorOptions, source: &S, corrector: &B, request: &PixelRequest, plan: &RequestPlan,
    schedule: Arc<LagSchedule>,
) -> CorrelationResult<(PixelModel, CorrelationContext)>
where
    S: FrameSource + ?Sized,
    B: BleachCorrector + ?Sized,
{
    if plan.windows == 0 {
        return correlate_range(options, source, corrector, request, request.initial, request.last, schedule);
    }

    let mut model = PixelModel::default();
    let mut context = None;
    for window in 0..plan.windows {
        let start = request.initial + window * plan.schedule_frames;
        let end = start + plan.schedule_frames - 1;
        let (window_model, window_context) =
            correlate_range(options, source, corrector, request, start, end, Arc::clone(&schedule))?;
        model.add_sliding_window(&window_model)?;
        context = Some(window_context);
    }
    model.average_sliding_windows();
    let context = context.ok_or(CorrelationError::NoSlidingWindow {
        num_frames: plan.num_frames,
        window_length: plan.schedule_frames,
    })?;
    Ok((model, context))
}

fn correlate_range<S, B>(
    options: &CorrelatorOptions, source: &S, corrector: &B, request: &PixelRequest, initial: usize,
    last: usize, schedule: Arc<LagSchedule>,
) -> CorrelationResult<(PixelModel, CorrelationContext)>
where
    S: FrameSource + ?Sized,
    B: BleachCorrector + ?Sized,
{
    let binning = options.binning();
    let direct = source.trace(request.x, request.y, binning, TraceMode::Direct, initial, last)?;
    let direct = corrector.correct(direct, options)?;

    let delayed = match second_trace_mode(options, request) {
        Some(mode) => {
            let trace = source.trace(request.x2, request.y2, binning, mode, initial, last)?;
            Some(corrector.correct(trace, options)?)
        }
        None => None,
    };
    let delayed_view = delayed.as_ref().map_or_else(|| direct.view(), |trace| trace.view());
    correlate_traces(direct.view(), delayed_view, schedule, options)
}

/// How to fetch the second trace; `None` reuses the first (autocorrelation).
#[inline]
fn second_trace_mode(options: &CorrelatorOptions, request: &PixelRequest) -> Option<TraceMode> {
    if options.fit_model().is_dual_color() {
        Some(TraceMode::DualColor)
    } else if request.is_auto() {
        None
    } else {
        Some(TraceMode::Cross)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::{
        layout::Sheet,
        options::{BleachCorrection, FitModel, FitStrategy, MultiTau},
        source::{ImageStack, NoBleachCorrection},
    };
    use anyhow::bail;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Storing a successful request and leaving failed cells unset,
    //   including requests whose products overflow.
    // - Header, block index, and covariance getters.
    // - Sliding-window runs and their error path.
    // - DC-FCCS overlap rejection and trace-mode selection.
    // - Region sweeps with and without a raised stop flag.
    // - Export/load round trip, reset, and DCCF storage.
    //
    // They intentionally DO NOT cover:
    // - Numerical properties of the ACF (see `context.rs` and `tests/`).
    // -------------------------------------------------------------------------

    /// Pseudo-random positive stack around 100 with a per-pixel stream.
    fn noise_stack(frames: usize, height: usize, width: usize) -> ImageStack {
        ImageStack::new(Array3::from_shape_fn((frames, height, width), |(t, y, x)| {
            let seed = (t as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
                ^ ((y * width + x) as u64 + 1).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            let mut state = (seed ^ (seed >> 31)).wrapping_mul(0x94D0_49BB_1331_11EB);
            state ^= state >> 29;
            100.0 + ((state >> 11) as f64 / (1u64 << 53) as f64 - 0.5) * 20.0
        }))
        .unwrap()
    }

    fn options() -> CorrelatorOptions {
        CorrelatorOptions::new(MultiTau::new(8, 2).unwrap(), 1e-3).unwrap()
    }

    /// Source that records the modes it was asked for.
    struct RecordingSource {
        stack: ImageStack,
        modes: std::sync::Mutex<Vec<TraceMode>>,
        fail: bool,
    }

    impl FrameSource for RecordingSource {
        fn dimensions(&self) -> (usize, usize) {
            self.stack.dimensions()
        }

        fn num_frames(&self) -> usize {
            self.stack.num_frames()
        }

        fn trace(
            &self, x: usize, y: usize, binning: (usize, usize), mode: TraceMode, initial: usize, last: usize,
        ) -> anyhow::Result<Array1<f64>> {
            if self.fail {
                bail!("camera disconnected");
            }
            if let Ok(mut modes) = self.modes.lock() {
                modes.push(mode);
            }
            self.stack.trace(x, y, binning, mode, initial, last)
        }
    }

    fn recording(stack: ImageStack, fail: bool) -> RecordingSource {
        RecordingSource { stack, modes: std::sync::Mutex::new(Vec::new()), fail }
    }

    #[test]
    // Purpose
    // -------
    // Verify that a successful request populates the cell and the getters.
    //
    // Given
    // -----
    // - A 1024-frame 3×2 noise stack and `(8, 2)` with OLS.
    //
    // Expect
    // ------
    // - Only cell (2, 1) is set; 13 channels; header matches the schedule.
    // - A block index is reported; no regularized covariance without GLS.
    fn correlate_stores_cell_and_header() {
        // Arrange
        let stack = noise_stack(1024, 2, 3);
        let mut correlator = Correlator::new(options());

        // Act
        let channels = correlator.correlate_auto(&stack, &NoBleachCorrection, 2, 1, 0, 1023).unwrap().acf().len();

        // Assert
        assert_eq!(channels, 13);
        assert!(correlator.pixel_model(2, 1).is_some());
        assert!(correlator.pixel_model(0, 0).is_none());
        assert_eq!(correlator.pixel_models().map(|g| g.dim()), Some((3, 2)));
        assert_eq!(correlator.lag_times().map(|l| l.len()), Some(13));
        assert_relative_eq!(correlator.lag_times().unwrap()[12], 16.0 * 1e-3);
        assert_eq!(correlator.sample_times().unwrap()[12], 2);
        assert!(correlator.block_index().is_some());
        assert_eq!(correlator.variance_blocks().map(|rows| rows.nrows()), Some(3));
        assert!(correlator.regularized_covariance_matrix().is_none());
    }

    #[test]
    // Purpose
    // -------
    // Ensure failures leave the grid and the last context untouched.
    //
    // Given
    // -----
    // - A stack whose pixel (0, 0) is all zeros (zero monitors); a range past
    //   the end of the stack; a source that fails.
    //
    // Expect
    // ------
    // - `NonPositiveMonitor`, `InvalidFrameRange`, `TraceRetrieval`; no cell
    //   set and no block index afterwards.
    fn failed_requests_leave_grid_unset() {
        // Arrange
        let mut frames = Array3::from_elem((512, 1, 2), 50.0);
        frames.slice_mut(ndarray::s![.., 0, 0]).fill(0.0);
        let stack = ImageStack::new(frames).unwrap();
        let failing = recording(noise_stack(512, 1, 2), true);
        let mut correlator = Correlator::new(options());

        // Act
        let zero = correlator.correlate_auto(&stack, &NoBleachCorrection, 0, 0, 0, 511).unwrap_err();
        let range = correlator.correlate_auto(&stack, &NoBleachCorrection, 1, 0, 0, 512).unwrap_err();
        let retrieval = correlator.correlate_auto(&failing, &NoBleachCorrection, 1, 0, 0, 511).unwrap_err();

        // Assert
        assert!(matches!(zero, CorrelationError::NonPositiveMonitor { .. }));
        assert!(matches!(range, CorrelationError::InvalidFrameRange { .. }));
        assert!(matches!(retrieval, CorrelationError::TraceRetrieval(ref msg) if msg.contains("camera")));
        assert!(correlator.pixel_models().is_none());
        assert!(correlator.block_index().is_none());
    }

    #[test]
    // Purpose
    // -------
    // Ensure products that overflow to NaN are reported instead of stored.
    //
    // Given
    // -----
    // - A 1024-frame 1×1 noise stack scaled to intensities around 1e160, so
    //   every product `a·b` overflows to infinity.
    //
    // Expect
    // ------
    // - `NonFiniteCorrelation` of the Degenerate kind; no cell is set.
    fn overflowing_intensities_leave_grid_unset() {
        // Arrange
        let scaled = noise_stack(1024, 1, 1).frames().mapv(|v| v * 1e158);
        let stack = ImageStack::new(scaled).unwrap();
        let mut correlator = Correlator::new(options());

        // Act
        let err = correlator.correlate_auto(&stack, &NoBleachCorrection, 0, 0, 0, 1023).unwrap_err();

        // Assert
        assert!(matches!(err, CorrelationError::NonFiniteCorrelation { .. }), "got {err:?}");
        assert_eq!(err.kind(), crate::correlation::errors::ErrorKind::Degenerate);
        assert!(correlator.pixel_models().is_none());
        assert!(correlator.block_index().is_none());
    }

    #[test]
    // Purpose
    // -------
    // Check sliding-window requests average the windows and use a
    // window-length schedule.
    //
    // Given
    // -----
    // - 1100 frames with a 256-frame window (4 full windows, 76 dropped).
    //
    // Expect
    // ------
    // - `sliding_windows() == 4`; the last context's schedule covers 256
    //   frames; finite ACF.
    fn sliding_window_averages_full_windows() {
        // Arrange
        let stack = noise_stack(1100, 1, 1);
        let opts = options().with_bleach_correction(BleachCorrection::SlidingWindow).with_sliding_window_length(256);
        let mut correlator = Correlator::new(opts);

        // Act
        let model = correlator.correlate_auto(&stack, &NoBleachCorrection, 0, 0, 0, 1099).unwrap().clone();

        // Assert
        assert_eq!(model.sliding_windows(), 4);
        assert!(model.acf().iter().all(|v| v.is_finite()));
        assert_eq!(correlator.last_context().map(|ctx| ctx.schedule.num_frames()), Some(256));
    }

    #[test]
    // Purpose
    // -------
    // Ensure a window longer than the frame range is rejected.
    //
    // Given
    // -----
    // - 300 frames with a 512-frame window, and a zero window length.
    //
    // Expect
    // ------
    // - `NoSlidingWindow` in both cases.
    fn sliding_window_without_full_window_fails() {
        let stack = noise_stack(300, 1, 1);
        let opts = options().with_bleach_correction(BleachCorrection::SlidingWindow);
        let mut correlator = Correlator::new(opts.clone().with_sliding_window_length(512));
        let err = correlator.correlate_auto(&stack, &NoBleachCorrection, 0, 0, 0, 299).unwrap_err();
        assert_eq!(err, CorrelationError::NoSlidingWindow { num_frames: 300, window_length: 512 });

        correlator.set_options(opts);
        let err = correlator.correlate_auto(&stack, &NoBleachCorrection, 0, 0, 0, 299).unwrap_err();
        assert_eq!(err, CorrelationError::NoSlidingWindow { num_frames: 300, window_length: 0 });
    }

    #[test]
    // Purpose
    // -------
    // Verify trace-mode selection and DC-FCCS overlap rejection.
    //
    // Given
    // -----
    // - A cross request, an auto request, and a DC-FCCS request with a
    //   non-overlapping offset; then DC-FCCS with binning 2×2 and offset (1, 0).
    //
    // Expect
    // ------
    // - Modes `[Direct, Cross]`, `[Direct]`, `[Direct, DualColor]`.
    // - `OverlappingRegions` for the overlapping configuration.
    fn trace_modes_and_dual_color_overlap() {
        // Arrange
        let source = recording(noise_stack(512, 2, 4), false);
        let mut correlator = Correlator::new(options());
        let take_modes = || source.modes.lock().map(|mut m| std::mem::take(&mut *m)).unwrap();

        // Act / Assert
        correlator.correlate(&source, &NoBleachCorrection, PixelRequest::cross(0, 0, 1, 0, 0, 511)).unwrap();
        assert_eq!(take_modes(), vec![TraceMode::Direct, TraceMode::Cross]);

        correlator.correlate_auto(&source, &NoBleachCorrection, 0, 1, 0, 511).unwrap();
        assert_eq!(take_modes(), vec![TraceMode::Direct]);

        correlator.set_options(options().with_fit_model(FitModel::DcFccs2d).with_ccf_distance(2, 0));
        correlator.correlate(&source, &NoBleachCorrection, PixelRequest::cross(0, 0, 2, 0, 0, 511)).unwrap();
        assert_eq!(take_modes(), vec![TraceMode::Direct, TraceMode::DualColor]);

        let overlapping = options().with_fit_model(FitModel::DcFccs2d).with_ccf_distance(1, 0).with_binning(2, 2);
        correlator.set_options(overlapping.unwrap());
        let err = correlator.correlate_auto(&source, &NoBleachCorrection, 0, 0, 0, 511).unwrap_err();
        assert!(matches!(err, CorrelationError::OverlappingRegions { ccf: (1, 0), binning: (2, 2) }));
    }

    #[test]
    // Purpose
    // -------
    // Check region sweeps store every successful pixel and honor the stop flag.
    //
    // Given
    // -----
    // - A 1024-frame 2×2 stack, four auto requests plus one out-of-bounds
    //   request; then the same requests with the stop flag already raised.
    //
    // Expect
    // ------
    // - 4 completed, 1 failed, all four cells set.
    // - With the stop flag: every request skipped and no new cells.
    fn region_sweep_reports_per_request() {
        // Arrange
        let stack = noise_stack(1024, 2, 2);
        let mut requests: Vec<PixelRequest> =
            (0..2).flat_map(|x| (0..2).map(move |y| PixelRequest::auto(x, y, 0, 1023))).collect();
        requests.push(PixelRequest::auto(5, 0, 0, 1023));
        let mut correlator = Correlator::new(options().with_fit_strategy(FitStrategy::Gls));

        // Act
        let report = correlator.correlate_region(&stack, &NoBleachCorrection, &requests, &AtomicBool::new(false));

        // Assert
        assert_eq!(report.completed(), 4);
        assert_eq!(report.failed(), 1);
        assert!(matches!(report.statuses[4], PixelStatus::Failed(CorrelationError::PixelOutOfBounds { .. })));
        for request in &requests[..4] {
            assert!(correlator.pixel_model(request.x, request.y).is_some());
        }
        assert_eq!(correlator.regularized_covariance_matrix().map(|m| m.dim()), Some((12, 12)));

        // Act (stopped)
        correlator.reset_results();
        let report = correlator.correlate_region(&stack, &NoBleachCorrection, &requests, &AtomicBool::new(true));

        // Assert (stopped)
        assert_eq!(report.skipped(), 5);
        assert!(correlator.pixel_models().is_none());
    }

    #[test]
    // Purpose
    // -------
    // Verify export/load round trip, reset, and DCCF storage.
    //
    // Given
    // -----
    // - One correlated pixel with a fitted curve written back.
    //
    // Expect
    // ------
    // - Exported sheets restore the same ACF and fitted curve into a fresh
    //   correlator with the same header; no block index after loading.
    // - Exporting after `reset_results` fails.
    // - DCCF maps are stored by name.
    fn export_load_reset_and_dccf() {
        // Arrange
        let stack = noise_stack(1024, 1, 2);
        let mut correlator = Correlator::new(options());
        correlator.correlate_auto(&stack, &NoBleachCorrection, 1, 0, 0, 1023).unwrap();
        let fitted = Array1::linspace(1.0, 0.0, 13);
        correlator.pixel_model_mut(1, 0).unwrap().set_fitted_acf(Some(fitted.clone()));

        // Act
        let sheets = correlator.export_sheets().unwrap();
        let mut restored = Correlator::new(options());
        restored.load_sheets(&sheets, (2, 1)).unwrap();

        // Assert
        assert_eq!(sheets.sheet(Sheet::Acf).map(|rows| rows.len()), Some(1));
        let original = correlator.pixel_model(1, 0).unwrap();
        let back = restored.pixel_model(1, 0).unwrap();
        assert_eq!(back.acf(), original.acf());
        assert_eq!(back.fitted_acf(), Some(&fitted));
        assert_eq!(restored.lag_times(), correlator.lag_times());
        assert!(restored.block_index().is_none());

        correlator.reset_results();
        assert!(correlator.export_sheets().is_err());

        correlator.set_dccf("horizontal", Array2::ones((2, 1)));
        assert_eq!(correlator.dccf("horizontal").map(|m| m.dim()), Some((2, 1)));
        assert!(correlator.dccf("vertical").is_none());
    }
}
