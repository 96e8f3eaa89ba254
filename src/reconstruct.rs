// Order-truncated reconstruction of light curves

use log::{debug, info};
use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{LightCurveError, Result};
use crate::pca::ComponentCount;
use crate::pipeline::Pipeline;

/// How the reduced-order reconstructions are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReconstructionMode {
    /// Refit the whole pipeline with `Fixed(n)` components for every order.
    #[default]
    Refit,
    /// Fit once at full rank and keep the leading `n` axes for every order.
    Truncate,
}

/// Output of [`reconstruct`].
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// Principal components of the baseline fit. Shape: (n_stars, k)
    pub components: Array2<f64>,
    /// Eigenvectors of the baseline fit. Shape: (k, n_phase_samples)
    pub eigenvectors: Array2<f64>,
    /// Explained variance ("eigenvalues") of the baseline fit. Shape: (k)
    pub explained_variance: Array1<f64>,
    /// Reconstructed light curves in magnitudes, one slab per requested order.
    /// Shape: (n_stars, n_orders, n_phase_samples)
    pub reconstructions: Array3<f64>,
}

/// Runs the baseline fit and one reconstruction per truncation order.
///
/// * `pipeline` - Pipeline whose PCA component count is varied. Its original
///   PCA configuration and the baseline fit are restored before returning.
/// * `x` - Light curves, shape (n_stars, n_phase_samples).
/// * `orders` - Truncation orders. Duplicates are allowed; the output keeps
///   this exact order along its second axis.
/// * `mode` - Refit per order (default) or truncate a single full fit.
///
/// # Errors
/// Every order is checked against `[1, min(n_stars, n_phase_samples)]`
/// before any fitting; a violation returns `InvalidComponentCount` and the
/// pipeline is left untouched. Stage failures are propagated as is.
pub fn reconstruct(
    pipeline: &mut Pipeline,
    x: ArrayView2<f64>,
    orders: &[usize],
    mode: ReconstructionMode,
) -> Result<Reconstruction> {
    let (n_stars, n_features) = x.dim();
    let max_order = n_stars.min(n_features);
    if let Some(&bad) = orders.iter().find(|&&n| n == 0 || n > max_order) {
        return Err(LightCurveError::invalid_component_count(bad, max_order));
    }

    let original_pca_config = *pipeline.pca().config();

    let components = pipeline.fit_transform(x)?;
    let baseline_pca = pipeline.pca().clone();
    let eigenvectors = baseline_pca
        .components()
        .cloned()
        .ok_or(LightCurveError::NotFitted("PcaStep"))?;
    let explained_variance = baseline_pca
        .explained_variance()
        .cloned()
        .ok_or(LightCurveError::NotFitted("PcaStep"))?;
    info!(
        "Baseline fit: {} stars, {} components; reconstructing orders {:?} ({:?})",
        n_stars,
        components.ncols(),
        orders,
        mode
    );

    let mut reconstructions = Array3::<f64>::zeros((n_stars, orders.len(), n_features));
    let result = match mode {
        ReconstructionMode::Refit => refit_orders(pipeline, x, orders, &mut reconstructions),
        ReconstructionMode::Truncate => {
            truncate_orders(pipeline, x, orders, &mut reconstructions)
        }
    };

    pipeline.replace_pca(baseline_pca);
    debug_assert_eq!(*pipeline.pca().config(), original_pca_config);
    result?;

    Ok(Reconstruction {
        components,
        eigenvectors,
        explained_variance,
        reconstructions,
    })
}

fn refit_orders(
    pipeline: &mut Pipeline,
    x: ArrayView2<f64>,
    orders: &[usize],
    out: &mut Array3<f64>,
) -> Result<()> {
    for (i, &n) in orders.iter().enumerate() {
        pipeline.set_pca_components(ComponentCount::Fixed(n));
        let comps = pipeline.fit_transform(x)?;
        let rec = pipeline.inverse_transform(comps.view())?;
        out.slice_mut(s![.., i, ..]).assign(&rec);
        debug!("Reconstructed order {} (refit)", n);
    }
    Ok(())
}

fn truncate_orders(
    pipeline: &mut Pipeline,
    x: ArrayView2<f64>,
    orders: &[usize],
    out: &mut Array3<f64>,
) -> Result<()> {
    pipeline.set_pca_components(ComponentCount::All);
    let full_scores = pipeline.fit_transform(x)?;
    let full_pca = pipeline.pca().clone();
    for (i, &n) in orders.iter().enumerate() {
        pipeline.replace_pca(full_pca.truncated(n)?);
        let rec = pipeline.inverse_transform(full_scores.slice(s![.., ..n]))?;
        out.slice_mut(s![.., i, ..]).assign(&rec);
        debug!("Reconstructed order {} (truncate)", n);
    }
    Ok(())
}

/// Squared reconstruction error of every star at every order.
///
/// Returns shape (n_stars, n_orders); entry `[i, j]` is the sum of squared
/// differences between star `i` of `x` and its reconstruction at order `j`.
pub fn star_reconstruction_errors(
    x: ArrayView2<f64>,
    reconstructions: &Array3<f64>,
) -> Array2<f64> {
    let (n_stars, n_orders, _) = reconstructions.dim();
    Array2::from_shape_fn((n_stars, n_orders), |(i, j)| {
        let rec = reconstructions.slice(s![i, j, ..]);
        rec.iter()
            .zip(x.row(i))
            .map(|(r, o)| (r - o) * (r - o))
            .sum()
    })
}

/// Sum of squared differences between each reconstruction slab and `x`.
///
/// Returns one value per order, in the same order as the reconstructions.
pub fn reconstruction_errors(x: ArrayView2<f64>, reconstructions: &Array3<f64>) -> Array1<f64> {
    star_reconstruction_errors(x, reconstructions).sum_axis(Axis(0))
}
