// Principal component analysis (PCA) step

use log::{debug, trace};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{LightCurveError, Result};
use crate::linalg_backends::{BackendEigh, BackendSVD, FaerLinAlgBackend};
use crate::pipeline::Transformer;

/// How many principal components the PCA step retains.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ComponentCount {
    /// Keep `min(n_samples, n_features)` components.
    #[default]
    All,
    /// Keep exactly this many components.
    Fixed(usize),
    /// Keep the fewest components whose cumulative explained-variance ratio
    /// exceeds this fraction. Must lie strictly between 0 and 1.
    VarianceFraction(f64),
}

impl ComponentCount {
    /// Interprets a command-line style value: values in (0, 1) select a
    /// variance fraction, whole numbers >= 1 a fixed count.
    pub fn from_f64(value: f64) -> Result<Self> {
        if value > 0.0 && value < 1.0 {
            Ok(ComponentCount::VarianceFraction(value))
        } else if value >= 1.0 && value.fract() == 0.0 && value.is_finite() {
            Ok(ComponentCount::Fixed(value as usize))
        } else {
            Err(LightCurveError::configuration(format!(
                "number of components must be a fraction in (0, 1) or a whole number >= 1, got {}",
                value
            )))
        }
    }
}

/// Decomposition routine used to find the principal axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PcaSolver {
    /// Thin SVD of the centered data matrix.
    #[default]
    Svd,
    /// Eigendecomposition of the covariance matrix (n_features <= n_samples)
    /// or of the Gram matrix (n_features > n_samples).
    Covariance,
}

/// Configuration of the [`PcaStep`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PcaConfig {
    pub n_components: ComponentCount,
    /// Scale projections to unit variance.
    pub whiten: bool,
    pub solver: PcaSolver,
}

impl PcaConfig {
    #[must_use]
    pub fn with_n_components(mut self, n_components: ComponentCount) -> Self {
        self.n_components = n_components;
        self
    }

    #[must_use]
    pub fn with_whiten(mut self, whiten: bool) -> Self {
        self.whiten = whiten;
        self
    }

    #[must_use]
    pub fn with_solver(mut self, solver: PcaSolver) -> Self {
        self.solver = solver;
        self
    }
}

/// Principal component analysis stage.
///
/// Holds the principal axes found by the last `fit`, the column mean removed
/// before decomposition, and the variance carried by each retained axis.
/// Every `fit` recomputes the full decomposition from scratch; changing the
/// retained component count never truncates a previous fit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PcaStep {
    config: PcaConfig,
    /// Principal axes as rows. Shape: (k_components, n_features)
    components: Option<Array2<f64>>,
    /// Column mean of the fitted data. Shape: (n_features)
    mean: Option<Array1<f64>>,
    /// Variance along each retained axis (eigenvalues of the covariance matrix).
    /// Shape: (k_components)
    explained_variance: Option<Array1<f64>>,
    /// Fraction of the total variance carried by each retained axis.
    explained_variance_ratio: Option<Array1<f64>>,
    /// Singular values of the centered data for each retained axis.
    singular_values: Option<Array1<f64>>,
    n_samples_seen: usize,
}

/// Full, untruncated decomposition: axes sorted by decreasing variance.
struct Decomposition {
    /// Shape: (min(n_samples, n_features), n_features)
    axes: Array2<f64>,
    /// Shape: (min(n_samples, n_features))
    variances: Array1<f64>,
}

impl PcaStep {
    pub fn new(config: PcaConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &PcaConfig {
        &self.config
    }

    /// Replaces the configuration. The fitted axes stay untouched until the next `fit`.
    pub fn set_config(&mut self, config: PcaConfig) {
        self.config = config;
    }

    /// Changes only the retained component count.
    pub fn set_n_components(&mut self, n_components: ComponentCount) {
        self.config.n_components = n_components;
    }

    /// Returns the principal axes (eigenvectors), shape (k_components, n_features).
    pub fn components(&self) -> Option<&Array2<f64>> {
        self.components.as_ref()
    }

    /// Returns the column mean removed before decomposition.
    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.mean.as_ref()
    }

    /// Returns the variance along each retained axis, largest first.
    pub fn explained_variance(&self) -> Option<&Array1<f64>> {
        self.explained_variance.as_ref()
    }

    /// Returns the share of the total variance carried by each retained axis.
    pub fn explained_variance_ratio(&self) -> Option<&Array1<f64>> {
        self.explained_variance_ratio.as_ref()
    }

    /// Returns the singular values associated with each retained axis.
    pub fn singular_values(&self) -> Option<&Array1<f64>> {
        self.singular_values.as_ref()
    }

    /// Number of retained components after the last fit.
    pub fn n_components(&self) -> Option<usize> {
        self.components.as_ref().map(|c| c.nrows())
    }

    pub fn n_samples_seen(&self) -> usize {
        self.n_samples_seen
    }

    /// Fits the model and returns the projections of `x` onto the retained axes.
    ///
    /// * `x` - Input data, shape (n_samples, n_features). Not modified.
    ///
    /// # Errors
    /// Returns an error if `x` has fewer than 2 samples, zero features or
    /// non-finite values, if the configured component count is out of range,
    /// or if the decomposition backend fails.
    pub fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples == 0 || n_features == 0 {
            return Err(LightCurveError::invalid_input(
                "PCA input has zero samples or zero features.",
            ));
        }
        if n_samples < 2 {
            return Err(LightCurveError::invalid_input(
                "PCA input must have at least 2 samples.",
            ));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(LightCurveError::invalid_input(
                "PCA input contains non-finite values.",
            ));
        }

        let max_components = n_samples.min(n_features);
        // Fixed counts are validated before any decomposition work.
        if let ComponentCount::Fixed(k) = self.config.n_components {
            if k == 0 || k > max_components {
                return Err(LightCurveError::invalid_component_count(k, max_components));
            }
        }
        if let ComponentCount::VarianceFraction(f) = self.config.n_components {
            if !(f > 0.0 && f < 1.0) {
                return Err(LightCurveError::configuration(format!(
                    "variance fraction must lie strictly between 0 and 1, got {}",
                    f
                )));
            }
        }

        let mean_vector = x
            .mean_axis(Axis(0))
            .ok_or_else(|| LightCurveError::invalid_input("Failed to compute mean of the data."))?;
        let centered = &x - &mean_vector;

        let decomposition = match self.config.solver {
            PcaSolver::Svd => decompose_svd(&centered, &FaerLinAlgBackend)?,
            PcaSolver::Covariance => decompose_covariance(&centered, &FaerLinAlgBackend)?,
        };

        let total_variance: f64 = decomposition.variances.sum();
        let ratio = if total_variance > 0.0 {
            decomposition.variances.mapv(|v| v / total_variance)
        } else {
            Array1::zeros(decomposition.variances.len())
        };

        let k = match self.config.n_components {
            ComponentCount::All => max_components,
            ComponentCount::Fixed(k) => k,
            ComponentCount::VarianceFraction(f) => components_for_fraction(&ratio, f),
        };
        trace!(
            "PCA keeps {} of {} components ({:?})",
            k,
            max_components,
            self.config.n_components
        );

        let components = decomposition.axes.slice(s![..k, ..]).to_owned();
        let explained_variance = decomposition.variances.slice(s![..k]).to_owned();
        let denom = (n_samples - 1) as f64;
        let singular_values = explained_variance.mapv(|v| (v * denom).sqrt());

        self.components = Some(components);
        self.mean = Some(mean_vector);
        self.explained_variance = Some(explained_variance);
        self.explained_variance_ratio = Some(ratio.slice(s![..k]).to_owned());
        self.singular_values = Some(singular_values);
        self.n_samples_seen = n_samples;
        debug!(
            "Fitted PCA on {}x{} data with {} components",
            n_samples, n_features, k
        );

        self.transform(x)
    }

    /// Keeps only the leading `k` axes of the current fit.
    ///
    /// This is the cheap alternative to refitting with `Fixed(k)`; on
    /// well-separated spectra both give the same axes.
    pub fn truncated(&self, k: usize) -> Result<PcaStep> {
        let components = self
            .components
            .as_ref()
            .ok_or(LightCurveError::NotFitted("PcaStep"))?;
        if k == 0 || k > components.nrows() {
            return Err(LightCurveError::invalid_component_count(
                k,
                components.nrows(),
            ));
        }
        let slice1 = |v: &Option<Array1<f64>>| v.as_ref().map(|a| a.slice(s![..k]).to_owned());
        Ok(PcaStep {
            config: self.config.with_n_components(ComponentCount::Fixed(k)),
            components: Some(components.slice(s![..k, ..]).to_owned()),
            mean: self.mean.clone(),
            explained_variance: slice1(&self.explained_variance),
            explained_variance_ratio: slice1(&self.explained_variance_ratio),
            singular_values: slice1(&self.singular_values),
            n_samples_seen: self.n_samples_seen,
        })
    }

    fn fitted(&self) -> Result<(&Array2<f64>, &Array1<f64>, &Array1<f64>)> {
        match (&self.components, &self.mean, &self.explained_variance) {
            (Some(c), Some(m), Some(v)) => Ok((c, m, v)),
            _ => Err(LightCurveError::NotFitted("PcaStep")),
        }
    }
}

impl Transformer for PcaStep {
    fn fit(&mut self, x: ArrayView2<f64>) -> Result<()> {
        self.fit_transform(x).map(|_| ())
    }

    fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        PcaStep::fit_transform(self, x)
    }

    /// Projects `x` onto the retained axes, dividing by the per-axis standard
    /// deviation when whitening.
    fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (components, mean, variance) = self.fitted()?;
        if x.ncols() != mean.len() {
            return Err(LightCurveError::ShapeMismatch {
                context: "PcaStep features",
                expected: mean.len(),
                actual: x.ncols(),
            });
        }
        let mut projected = (&x - mean).dot(&components.t());
        if self.config.whiten {
            projected /= &whitening_scale(variance);
        }
        Ok(projected)
    }

    /// Maps projections back to feature space using only the retained axes.
    fn inverse_transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (components, mean, variance) = self.fitted()?;
        if x.ncols() != components.nrows() {
            return Err(LightCurveError::ShapeMismatch {
                context: "PcaStep components",
                expected: components.nrows(),
                actual: x.ncols(),
            });
        }
        let scores = if self.config.whiten {
            &x * &whitening_scale(variance)
        } else {
            x.to_owned()
        };
        Ok(scores.dot(components) + mean)
    }
}

fn whitening_scale(variance: &Array1<f64>) -> Array1<f64> {
    variance.mapv(|v| if v > 1e-12 { v.sqrt() } else { 1.0 })
}

/// Smallest k whose cumulative variance ratio exceeds `fraction`.
fn components_for_fraction(ratio: &Array1<f64>, fraction: f64) -> usize {
    let mut cumulative = 0.0;
    for (i, r) in ratio.iter().enumerate() {
        cumulative += r;
        if cumulative > fraction {
            return i + 1;
        }
    }
    ratio.len().max(1)
}

/// Flips each axis so that its largest-magnitude entry is positive.
fn flip_signs(axes: &mut Array2<f64>) {
    for mut axis in axes.rows_mut() {
        let pivot = axis
            .iter()
            .copied()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            axis.mapv_inplace(|v| -v);
        }
    }
}

fn decompose_svd(centered: &Array2<f64>, backend: &impl BackendSVD) -> Result<Decomposition> {
    let n_samples = centered.nrows();
    let svd = backend.thin_svd(centered)?;
    let mut axes = svd.vt;
    flip_signs(&mut axes);
    let variances = svd.s.mapv(|s_val| s_val.powi(2) / ((n_samples - 1) as f64));
    Ok(Decomposition { axes, variances })
}

fn decompose_covariance(
    centered: &Array2<f64>,
    backend: &impl BackendEigh,
) -> Result<Decomposition> {
    let n_samples = centered.nrows();
    let n_features = centered.ncols();
    let max_components = n_samples.min(n_features);
    let denom = (n_samples - 1) as f64;

    if n_features <= n_samples {
        let mut cov_matrix = centered.t().dot(centered);
        cov_matrix /= denom;

        let eig = backend.eigh_lower(&cov_matrix)?;
        let mut eig_pairs: Vec<(f64, Array1<f64>)> = eig
            .eigenvalues
            .iter()
            .copied()
            .zip(eig.eigenvectors.columns().into_iter().map(|col| col.to_owned()))
            .collect();
        eig_pairs.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let mut axes = Array2::<f64>::zeros((max_components, n_features));
        let mut variances = Array1::<f64>::zeros(max_components);
        for (i, (eig_val, eig_vec)) in eig_pairs.into_iter().take(max_components).enumerate() {
            variances[i] = eig_val.max(0.0);
            let norm = eig_vec.dot(&eig_vec).sqrt();
            if norm > 1e-9 {
                axes.row_mut(i).assign(&(eig_vec / norm));
            }
        }
        flip_signs(&mut axes);
        Ok(Decomposition { axes, variances })
    } else {
        // Gram trick path
        let mut gram_matrix = centered.dot(&centered.t());
        gram_matrix /= denom;

        let eig = backend.eigh_lower(&gram_matrix)?;
        let mut eig_pairs: Vec<(f64, Array1<f64>)> = eig
            .eigenvalues
            .iter()
            .copied()
            .zip(eig.eigenvectors.columns().into_iter().map(|col| col.to_owned()))
            .collect();
        eig_pairs.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let mut axes = Array2::<f64>::zeros((max_components, n_features));
        let mut variances = Array1::<f64>::zeros(max_components);
        for (i, (eigval, u_col)) in eig_pairs.into_iter().take(max_components).enumerate() {
            variances[i] = eigval.max(0.0);
            // V_k = X^T u_k / sqrt(eigval_k * (N-1)), re-normalized to unit length.
            let mut axis_i = centered.t().dot(&u_col);
            let norm_val = axis_i.dot(&axis_i).sqrt();
            if eigval > 1e-12 && norm_val > 1e-9 {
                axis_i.mapv_inplace(|x| x / norm_val);
                axes.row_mut(i).assign(&axis_i);
            }
            // A null direction of the Gram matrix has no feature-space axis; it stays zero.
        }
        flip_signs(&mut axes);
        Ok(Decomposition { axes, variances })
    }
}
