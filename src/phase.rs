// Phase folding of time series and observation loading

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::debug;
use ndarray::{Array1, Array2, ArrayView2};

use crate::error::{LightCurveError, Result};
use crate::table::read_columns;

/// Column selection of an observation file: time, magnitude, error.
pub type ObservationColumns = [usize; 3];

pub const DEFAULT_OBSERVATION_COLUMNS: ObservationColumns = [0, 1, 2];

/// Phase of `time` within a cycle of length `period`, shifted back by `offset`.
///
/// Always lies in [0, 1).
pub fn get_phase(time: f64, period: f64, offset: f64) -> f64 {
    let phase = ((time / period).fract() - offset).rem_euclid(1.0);
    // rem_euclid rounds tiny negative values up to exactly 1.0
    if phase >= 1.0 {
        0.0
    } else {
        phase
    }
}

/// Returns a copy of `data` whose column `col` is replaced by its phase.
pub fn rephase(data: ArrayView2<f64>, period: f64, col: usize) -> Array2<f64> {
    let mut rephased = data.to_owned();
    rephased
        .column_mut(col)
        .mapv_inplace(|t| get_phase(t, period, 0.0));
    rephased
}

/// Evenly spaced phases `i / n` for `i` in `0..n`.
pub fn phase_grid(n: usize) -> Array1<f64> {
    Array1::from_shape_fn(n, |i| i as f64 / n as f64)
}

/// Loads `<dir>/<star><extension>` and folds it by `period`.
///
/// The returned (n_obs, 3) matrix holds phase, magnitude and error. Phases
/// are shifted so that maximum light (the smallest magnitude) sits at 0.
///
/// # Errors
/// I/O errors, `MalformedTable` for unreadable rows, `InvalidInput` when the
/// file holds no observations.
pub fn load_observations(
    dir: &Path,
    star: &str,
    extension: &str,
    usecols: ObservationColumns,
    period: f64,
) -> Result<Array2<f64>> {
    let path = dir.join(format!("{}{}", star, extension));
    let file = File::open(&path)?;
    let raw = read_columns(BufReader::new(file), &usecols)?;
    if raw.nrows() == 0 {
        return Err(LightCurveError::invalid_input(format!(
            "no observations in {}",
            path.display()
        )));
    }

    let mut data = rephase(raw.view(), period, 0);
    let arg_max_light = data
        .column(1)
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let offset = data[[arg_max_light, 0]];
    data.column_mut(0)
        .mapv_inplace(|p| get_phase(p, 1.0, offset));
    debug!(
        "Loaded {} observations for {} (max light at row {})",
        data.nrows(),
        star,
        arg_max_light
    );
    Ok(data)
}
