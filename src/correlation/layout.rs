//! correlation::layout — tabular layout of correlation results for round-trips.
//!
//! Purpose
//! -------
//! Describe the pixel grid as the six parallel sheets an external serializer
//! writes and reads back ("ACF", "Standard Deviation", "Fit Functions",
//! "Residuals", "MSD", "Fit Parameters") plus the "Lag time" header carrying
//! lag times and sample times. This module owns only the in-memory shape;
//! file formats live with the serializer.
//!
//! Key behaviors
//! -------------
//! - [`ResultSheets::from_grid`] flattens a grid into per-sheet rows keyed by
//!   pixel coordinate; unset cells and absent optional arrays are skipped.
//! - [`ResultSheets::to_grid`] rebuilds a grid of a given size. Missing sheets
//!   leave the corresponding field unset.
//! - [`position_label`] / [`parse_position`] convert between `(x, y)` and the
//!   `"(x, y)"` row label.
//!
//! Invariants & assumptions
//! ------------------------
//! - `lag_times` and `sample_times` have the same length.
//! - Every coordinate in a sheet lies inside the grid it is restored into.

use std::{collections::BTreeMap, fmt, str::FromStr};

use ndarray::{Array1, Array2};

use crate::correlation::{
    errors::{CorrelationError, CorrelationResult},
    pixel::{PixelGrid, PixelModel},
};

/// Header sheet name for lag and sample times.
pub const LAG_TIME_SHEET: &str = "Lag time";

/// Per-pixel array sheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sheet {
    Acf,
    StandardDeviation,
    FitFunctions,
    Residuals,
    Msd,
    FitParameters,
}

impl Sheet {
    pub const ALL: [Sheet; 6] = [
        Sheet::Acf,
        Sheet::StandardDeviation,
        Sheet::FitFunctions,
        Sheet::Residuals,
        Sheet::Msd,
        Sheet::FitParameters,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Sheet::Acf => "ACF",
            Sheet::StandardDeviation => "Standard Deviation",
            Sheet::FitFunctions => "Fit Functions",
            Sheet::Residuals => "Residuals",
            Sheet::Msd => "MSD",
            Sheet::FitParameters => "Fit Parameters",
        }
    }
}

impl fmt::Display for Sheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Sheet {
    type Err = CorrelationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sheet::ALL
            .into_iter()
            .find(|sheet| sheet.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CorrelationError::UnknownOption { option: "sheet", value: s.to_string() })
    }
}

pub type Position = (usize, usize);

/// The six result sheets plus the lag-time header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSheets {
    pub lag_times: Array1<f64>,
    pub sample_times: Array1<usize>,
    /// Array sheets (every [`Sheet`] except `FitParameters`).
    pub series: BTreeMap<Sheet, BTreeMap<Position, Array1<f64>>>,
    pub fit_parameters: BTreeMap<Position, BTreeMap<String, f64>>,
}

impl ResultSheets {
    /// Flatten `grid` into sheets.
    ///
    /// Errors
    /// ------
    /// - [`CorrelationError::LayoutMismatch`] if `lag_times` and
    ///   `sample_times` differ in length.
    pub fn from_grid(
        grid: &PixelGrid, lag_times: Array1<f64>, sample_times: Array1<usize>,
    ) -> CorrelationResult<Self> {
        check_header(&lag_times, &sample_times)?;
        let mut sheets = ResultSheets { lag_times, sample_times, ..ResultSheets::default() };

        for ((x, y), cell) in grid.indexed_iter() {
            let Some(model) = cell else { continue };
            let position = (x, y);
            sheets.insert(Sheet::Acf, position, Some(model.acf()));
            sheets.insert(Sheet::StandardDeviation, position, Some(model.standard_deviation_acf()));
            sheets.insert(Sheet::FitFunctions, position, model.fitted_acf());
            sheets.insert(Sheet::Residuals, position, model.residuals());
            sheets.insert(Sheet::Msd, position, model.msd());
            if let Some(parameters) = model.fit_parameters() {
                sheets.fit_parameters.insert(position, parameters.clone());
            }
        }
        Ok(sheets)
    }

    /// Rebuild a `width × height` grid from the sheets.
    ///
    /// A cell is created for every position that appears in any sheet.
    ///
    /// Errors
    /// ------
    /// - [`CorrelationError::LayoutMismatch`] for a ragged header or a
    ///   position outside the grid.
    pub fn to_grid(&self, width: usize, height: usize) -> CorrelationResult<PixelGrid> {
        check_header(&self.lag_times, &self.sample_times)?;
        let mut grid: PixelGrid = Array2::from_elem((width, height), None);

        for (&sheet, rows) in &self.series {
            for (&position, values) in rows {
                let model = cell_mut(&mut grid, position)?;
                let values = values.clone();
                match sheet {
                    Sheet::Acf => model.set_acf(values),
                    Sheet::StandardDeviation => model.set_standard_deviation_acf(values),
                    Sheet::FitFunctions => model.set_fitted_acf(Some(values)),
                    Sheet::Residuals => model.set_residuals(Some(values)),
                    Sheet::Msd => model.set_msd(Some(values)),
                    Sheet::FitParameters => {
                        return Err(CorrelationError::LayoutMismatch {
                            reason: "fit parameters stored as an array sheet".to_string(),
                        });
                    }
                }
            }
        }
        for (&position, parameters) in &self.fit_parameters {
            cell_mut(&mut grid, position)?.set_fit_parameters(Some(parameters.clone()));
        }
        Ok(grid)
    }

    pub fn sheet(&self, sheet: Sheet) -> Option<&BTreeMap<Position, Array1<f64>>> {
        self.series.get(&sheet)
    }

    fn insert(&mut self, sheet: Sheet, position: Position, values: Option<&Array1<f64>>) {
        if let Some(values) = values {
            self.series.entry(sheet).or_default().insert(position, values.clone());
        }
    }
}

/// Row label for a pixel, `"(x, y)"`.
pub fn position_label(position: Position) -> String {
    format!("({}, {})", position.0, position.1)
}

/// Parse a `"(x, y)"` row label.
///
/// Errors
/// ------
/// - [`CorrelationError::LayoutMismatch`] if the label is not two
///   comma-separated integers, optionally in parentheses.
///
/// Examples
/// --------
/// ```rust
/// # use fcs_correlator::correlation::layout::{parse_position, position_label};
/// assert_eq!(parse_position(&position_label((3, 14))).unwrap(), (3, 14));
/// assert_eq!(parse_position(" 7,2 ").unwrap(), (7, 2));
/// assert!(parse_position("(1; 2)").is_err());
/// ```
pub fn parse_position(label: &str) -> CorrelationResult<Position> {
    let invalid = || CorrelationError::LayoutMismatch { reason: format!("invalid position format: {label}") };
    let inner: String = label.chars().filter(|c| *c != '(' && *c != ')').collect();
    let mut parts = inner.split(',');
    let (Some(x), Some(y), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let x = x.trim().parse::<usize>().map_err(|_| invalid())?;
    let y = y.trim().parse::<usize>().map_err(|_| invalid())?;
    Ok((x, y))
}

// ---- Helper methods ----

#[inline]
fn check_header(lag_times: &Array1<f64>, sample_times: &Array1<usize>) -> CorrelationResult<()> {
    if lag_times.len() != sample_times.len() {
        return Err(CorrelationError::LayoutMismatch {
            reason: format!(
                "{} lag times but {} sample times",
                lag_times.len(),
                sample_times.len()
            ),
        });
    }
    Ok(())
}

fn cell_mut(grid: &mut PixelGrid, position: Position) -> CorrelationResult<&mut PixelModel> {
    let (width, height) = grid.dim();
    let cell = grid.get_mut([position.0, position.1]).ok_or_else(|| CorrelationError::LayoutMismatch {
        reason: format!("position {} outside {width}x{height} grid", position_label(position)),
    })?;
    Ok(cell.get_or_insert_with(PixelModel::default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Grid → sheets → grid round trip including optional fitter outputs.
    // - Missing optional sheets leaving fields unset.
    // - Out-of-grid positions and ragged headers.
    // - Position label parsing.
    // -------------------------------------------------------------------------

    fn sample_grid() -> PixelGrid {
        let mut grid: PixelGrid = Array2::from_elem((3, 2), None);
        let mut fitted = PixelModel::new(array![0.0, 0.5, 0.25], array![0.01, 0.04, 0.09]).unwrap();
        fitted.set_fitted_acf(Some(array![0.0, 0.49, 0.26]));
        fitted.set_residuals(Some(array![0.0, 0.01, -0.01]));
        fitted.set_fit_parameters(Some(BTreeMap::from([("D".to_string(), 1.5), ("N".to_string(), 12.0)])));
        grid[[2, 1]] = Some(fitted);
        grid[[0, 0]] = Some(PixelModel::new(array![0.0, 0.1, 0.05], array![0.0, 0.01, 0.01]).unwrap());
        grid
    }

    #[test]
    // Purpose
    // -------
    // Verify that a grid survives a round trip through the sheets.
    //
    // Given
    // -----
    // - A 3×2 grid with one fitted pixel at (2, 1) and one plain pixel at (0, 0).
    //
    // Expect
    // ------
    // - Sheets hold two ACF rows, one fit-function row, no MSD sheet.
    // - The rebuilt grid reproduces acf, standard deviation, fitted curve,
    //   residuals, and parameters; unset cells stay `None`.
    fn grid_round_trips_through_sheets() {
        // Arrange
        let grid = sample_grid();
        let lag_times = array![0.0, 0.001, 0.002];
        let sample_times = array![1, 1, 1];

        // Act
        let sheets = ResultSheets::from_grid(&grid, lag_times.clone(), sample_times.clone()).unwrap();
        let restored = sheets.to_grid(3, 2).unwrap();

        // Assert
        assert_eq!(sheets.sheet(Sheet::Acf).map(BTreeMap::len), Some(2));
        assert_eq!(sheets.sheet(Sheet::FitFunctions).map(BTreeMap::len), Some(1));
        assert!(sheets.sheet(Sheet::Msd).is_none());
        assert_eq!(sheets.lag_times, lag_times);

        let original = grid[[2, 1]].as_ref().unwrap();
        let back = restored[[2, 1]].as_ref().unwrap();
        assert_eq!(back.acf(), original.acf());
        assert_eq!(back.standard_deviation_acf(), original.standard_deviation_acf());
        assert_eq!(back.fitted_acf(), original.fitted_acf());
        assert_eq!(back.residuals(), original.residuals());
        assert_eq!(back.fit_parameters(), original.fit_parameters());
        assert!(back.msd().is_none());
        assert!(restored[[1, 0]].is_none());
    }

    #[test]
    // Purpose
    // -------
    // Ensure restoring into a smaller grid or with a ragged header fails.
    //
    // Given
    // -----
    // - Sheets containing (2, 1) restored into a 2×2 grid; a 3 vs 2 header.
    //
    // Expect
    // ------
    // - `LayoutMismatch` in both cases.
    fn restore_rejects_out_of_grid_and_ragged_header() {
        let sheets = ResultSheets::from_grid(&sample_grid(), array![0.0, 1.0, 2.0], array![1, 1, 1]).unwrap();
        assert!(matches!(sheets.to_grid(2, 2), Err(CorrelationError::LayoutMismatch { .. })));

        let ragged = ResultSheets::from_grid(&sample_grid(), array![0.0, 1.0, 2.0], array![1, 1]);
        assert!(matches!(ragged, Err(CorrelationError::LayoutMismatch { .. })));
    }

    #[test]
    // Purpose
    // -------
    // Check sheet names parse back to their variants.
    //
    // Given
    // -----
    // - Every sheet's display name, and "Variance".
    //
    // Expect
    // ------
    // - Round trip for the six names; `UnknownOption` for "Variance".
    fn sheet_names_parse() {
        for sheet in Sheet::ALL {
            assert_eq!(sheet.name().parse::<Sheet>(), Ok(sheet));
        }
        assert!("Variance".parse::<Sheet>().is_err());
    }
}
