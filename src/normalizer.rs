// Per-row min/max normalization

use std::fmt;
use std::str::FromStr;

use log::debug;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{LightCurveError, Result};
use crate::pipeline::Transformer;
use crate::vector_ops::colvec;

/// Which extremum of each row anchors the normalization shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shifter {
    /// Rows are mapped onto [0, 1].
    #[default]
    Min,
    /// Rows are mapped onto [-1, 0].
    Max,
}

impl FromStr for Shifter {
    type Err = LightCurveError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "min" => Ok(Shifter::Min),
            "max" => Ok(Shifter::Max),
            other => Err(LightCurveError::configuration(format!(
                "shifter must be either 'min' or 'max', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Shifter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shifter::Min => write!(f, "min"),
            Shifter::Max => write!(f, "max"),
        }
    }
}

/// Configuration of the [`Normalizer`] stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NormalizerConfig {
    pub shifter: Shifter,
}

impl NormalizerConfig {
    #[must_use]
    pub fn with_shifter(mut self, shifter: Shifter) -> Self {
        self.shifter = shifter;
        self
    }
}

/// Rescales every row (one light curve) by its own dynamic range.
///
/// `transform(X) = (X - shift) / range` where, per row, `range = max - min`
/// and `shift` is the row minimum or maximum depending on the [`Shifter`].
/// The fitted statistics are stored as (n_samples, 1) column vectors, so a
/// fitted normalizer only applies to matrices with the same number of rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Normalizer {
    config: NormalizerConfig,
    /// Per-row max - min. Shape: (n_samples, 1)
    range: Option<Array2<f64>>,
    /// Per-row min (or max). Shape: (n_samples, 1)
    shift: Option<Array2<f64>>,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self {
            config,
            range: None,
            shift: None,
        }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Replaces the configuration. Fitted statistics are kept until the next `fit`.
    pub fn set_config(&mut self, config: NormalizerConfig) {
        self.config = config;
    }

    /// Per-row dynamic range, shape (n_samples, 1), if fitted.
    pub fn range(&self) -> Option<&Array2<f64>> {
        self.range.as_ref()
    }

    /// Per-row shift, shape (n_samples, 1), if fitted.
    pub fn shift(&self) -> Option<&Array2<f64>> {
        self.shift.as_ref()
    }

    fn fitted(&self) -> Result<(&Array2<f64>, &Array2<f64>)> {
        match (&self.range, &self.shift) {
            (Some(range), Some(shift)) => Ok((range, shift)),
            _ => Err(LightCurveError::NotFitted("Normalizer")),
        }
    }

    fn check_rows(&self, x: &ArrayView2<f64>, range: &Array2<f64>) -> Result<()> {
        if x.nrows() != range.nrows() {
            return Err(LightCurveError::ShapeMismatch {
                context: "Normalizer rows",
                expected: range.nrows(),
                actual: x.nrows(),
            });
        }
        Ok(())
    }
}

impl Transformer for Normalizer {
    fn fit(&mut self, x: ArrayView2<f64>) -> Result<()> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(LightCurveError::invalid_input(
                "Normalizer input has zero rows or zero columns.",
            ));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(LightCurveError::invalid_input(
                "Normalizer input contains non-finite values.",
            ));
        }

        let row_min: Array1<f64> =
            x.map_axis(Axis(1), |row| row.fold(f64::INFINITY, |a, &b| a.min(b)));
        let row_max: Array1<f64> =
            x.map_axis(Axis(1), |row| row.fold(f64::NEG_INFINITY, |a, &b| a.max(b)));
        let range = &row_max - &row_min;

        if let Some(row) = range.iter().position(|&r| r == 0.0) {
            return Err(LightCurveError::DegenerateInput { row });
        }

        let shift = match self.config.shifter {
            Shifter::Min => row_min,
            Shifter::Max => row_max,
        };
        debug!(
            "Fitted Normalizer ({} shifter) on {} rows",
            self.config.shifter,
            x.nrows()
        );
        self.range = Some(colvec(&range));
        self.shift = Some(colvec(&shift));
        Ok(())
    }

    fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (range, shift) = self.fitted()?;
        self.check_rows(&x, range)?;
        Ok((&x - shift) / range)
    }

    fn inverse_transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (range, shift) = self.fitted()?;
        self.check_rows(&x, range)?;
        Ok(&x * range + shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_min_shifter_maps_rows_to_unit_interval() {
        let x = array![[1.0, 2.0, 3.0, 5.0], [10.0, 8.0, 6.0, 2.0]];
        let mut normalizer = Normalizer::default();
        let y = normalizer.fit_transform(x.view()).unwrap();

        assert_eq!(y, array![[0.0, 0.25, 0.5, 1.0], [1.0, 0.75, 0.5, 0.0]]);
        assert_eq!(normalizer.range().unwrap().dim(), (2, 1));
        assert_eq!(normalizer.shift().unwrap(), &array![[1.0], [2.0]]);
    }

    #[test]
    fn test_max_shifter_maps_rows_to_negative_unit_interval() {
        let x = array![[1.0, 3.0, 5.0]];
        let mut normalizer =
            Normalizer::new(NormalizerConfig::default().with_shifter(Shifter::Max));
        let y = normalizer.fit_transform(x.view()).unwrap();
        assert_eq!(y, array![[-1.0, -0.5, 0.0]]);
    }

    #[test]
    fn test_round_trip() {
        let x = array![
            [12.31, 12.55, 12.90, 12.42, 12.10],
            [9.80, 9.95, 10.40, 10.02, 9.71],
            [14.2, 14.0, 13.8, 14.6, 14.9]
        ];
        for shifter in [Shifter::Min, Shifter::Max] {
            let mut normalizer = Normalizer::new(NormalizerConfig { shifter });
            let y = normalizer.fit_transform(x.view()).unwrap();
            let back = normalizer.inverse_transform(y.view()).unwrap();
            for (a, b) in back.iter().zip(x.iter()) {
                assert_abs_diff_eq!(a, b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_transform_does_not_touch_input() {
        let x = array![[1.0, 2.0], [3.0, 5.0]];
        let copy = x.clone();
        let mut normalizer = Normalizer::default();
        let _ = normalizer.fit_transform(x.view()).unwrap();
        assert_eq!(x, copy);
    }

    #[test]
    fn test_zero_range_row_is_degenerate() {
        let x = array![[1.0, 2.0, 3.0], [7.5, 7.5, 7.5]];
        let mut normalizer = Normalizer::default();
        match normalizer.fit(x.view()) {
            Err(LightCurveError::DegenerateInput { row }) => assert_eq!(row, 1),
            other => panic!("expected DegenerateInput, got {:?}", other),
        }
        assert!(normalizer.range().is_none());
    }

    #[test]
    fn test_unknown_shifter_is_configuration_error() {
        assert_eq!("max".parse::<Shifter>().unwrap(), Shifter::Max);
        assert!(matches!(
            "median".parse::<Shifter>(),
            Err(LightCurveError::Configuration(_))
        ));
    }

    #[test]
    fn test_transform_before_fit_fails() {
        let normalizer = Normalizer::default();
        let x = array![[1.0, 2.0]];
        assert!(matches!(
            normalizer.transform(x.view()),
            Err(LightCurveError::NotFitted(_))
        ));
    }

    #[test]
    fn test_row_count_mismatch_is_rejected() {
        let mut normalizer = Normalizer::default();
        normalizer.fit(array![[1.0, 2.0], [3.0, 4.0]].view()).unwrap();
        let err = normalizer.transform(array![[1.0, 2.0]].view()).unwrap_err();
        assert!(matches!(err, LightCurveError::ShapeMismatch { .. }));
    }
}
