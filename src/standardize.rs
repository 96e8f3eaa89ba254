// Per-column standardization

use log::debug;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{LightCurveError, Result};
use crate::pipeline::Transformer;
use crate::vector_ops::rowvec;

/// Standard deviations below this are treated as zero and replaced by 1.0.
const SCALE_SANITIZATION_THRESHOLD: f64 = 1e-9;

/// Configuration of the [`StandardizeStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardizeConfig {
    /// Subtract the column mean.
    pub with_mean: bool,
    /// Divide by the column standard deviation.
    pub with_std: bool,
}

impl Default for StandardizeConfig {
    fn default() -> Self {
        Self {
            with_mean: true,
            with_std: true,
        }
    }
}

impl StandardizeConfig {
    #[must_use]
    pub fn with_mean(mut self, with_mean: bool) -> Self {
        self.with_mean = with_mean;
        self
    }

    #[must_use]
    pub fn with_std(mut self, with_std: bool) -> Self {
        self.with_std = with_std;
        self
    }
}

/// Scales each column (one phase sample) to zero mean and unit variance.
///
/// The fitted `mean` and `std` are (1, n_features) row vectors. `std` is the
/// population standard deviation, sanitized so that constant columns are
/// scaled by 1.0 instead of producing a division by zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardizeStep {
    config: StandardizeConfig,
    mean: Option<Array2<f64>>,
    std: Option<Array2<f64>>,
}

impl StandardizeStep {
    pub fn new(config: StandardizeConfig) -> Self {
        Self {
            config,
            mean: None,
            std: None,
        }
    }

    pub fn config(&self) -> &StandardizeConfig {
        &self.config
    }

    /// Replaces the configuration. Fitted statistics are kept until the next `fit`.
    pub fn set_config(&mut self, config: StandardizeConfig) {
        self.config = config;
    }

    /// Fitted column means, shape (1, n_features).
    pub fn mean(&self) -> Option<&Array2<f64>> {
        self.mean.as_ref()
    }

    /// Fitted (sanitized) column standard deviations, shape (1, n_features).
    pub fn std(&self) -> Option<&Array2<f64>> {
        self.std.as_ref()
    }

    fn fitted(&self, x: &ArrayView2<f64>) -> Result<(&Array2<f64>, &Array2<f64>)> {
        let (mean, std) = match (&self.mean, &self.std) {
            (Some(mean), Some(std)) => (mean, std),
            _ => return Err(LightCurveError::NotFitted("StandardizeStep")),
        };
        if x.ncols() != mean.ncols() {
            return Err(LightCurveError::ShapeMismatch {
                context: "StandardizeStep columns",
                expected: mean.ncols(),
                actual: x.ncols(),
            });
        }
        Ok((mean, std))
    }
}

impl Transformer for StandardizeStep {
    fn fit(&mut self, x: ArrayView2<f64>) -> Result<()> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(LightCurveError::invalid_input(
                "StandardizeStep input has zero rows or zero columns.",
            ));
        }

        let mean_vector = if self.config.with_mean {
            x.mean_axis(Axis(0))
                .ok_or_else(|| LightCurveError::invalid_input("Failed to compute column means."))?
        } else {
            ndarray::Array1::zeros(x.ncols())
        };
        let std_vector = if self.config.with_std {
            x.std_axis(Axis(0), 0.0).mapv(|val| {
                if val.is_finite() && val > SCALE_SANITIZATION_THRESHOLD {
                    val
                } else {
                    1.0
                }
            })
        } else {
            ndarray::Array1::ones(x.ncols())
        };

        debug!("Fitted StandardizeStep on {} columns", x.ncols());
        self.mean = Some(rowvec(&mean_vector));
        self.std = Some(rowvec(&std_vector));
        Ok(())
    }

    fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (mean, std) = self.fitted(&x)?;
        Ok((&x - mean) / std)
    }

    fn inverse_transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (mean, std) = self.fitted(&x)?;
        Ok(&x * std + mean)
    }
}
