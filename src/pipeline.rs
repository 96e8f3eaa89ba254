// Normalize -> Standardize -> PCA pipeline

use log::{debug, info};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::normalizer::{Normalizer, NormalizerConfig};
use crate::pca::{ComponentCount, PcaConfig, PcaStep};
use crate::standardize::{StandardizeConfig, StandardizeStep};

/// A fittable, invertible matrix transformation.
///
/// Every stage accepts an (n_samples, n_features) view and never modifies it.
pub trait Transformer {
    /// Learns the stage statistics from `x`.
    fn fit(&mut self, x: ArrayView2<f64>) -> Result<()>;

    /// Applies the fitted transformation.
    fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>>;

    /// Undoes [`Transformer::transform`].
    fn inverse_transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>>;

    fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }
}

/// Parameters of all three stages.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub normalizer: NormalizerConfig,
    pub standardize: StandardizeConfig,
    pub pca: PcaConfig,
}

/// New parameters for a single stage, applied by [`Pipeline::set_params`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageParams {
    Normalize(NormalizerConfig),
    Standardize(StandardizeConfig),
    Pca(PcaConfig),
}

/// The three-stage light-curve pipeline.
///
/// `fit_transform` runs Normalize, Standardize and PCA in that order, each
/// stage fitted on the output of the previous one. `inverse_transform`
/// undoes them in reverse order, so its output is in the original
/// magnitude units.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    normalizer: Normalizer,
    standardizer: StandardizeStep,
    pca: PcaStep,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            normalizer: Normalizer::new(config.normalizer),
            standardizer: StandardizeStep::new(config.standardize),
            pca: PcaStep::new(config.pca),
        }
    }

    /// Current parameters of all stages.
    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            normalizer: *self.normalizer.config(),
            standardize: *self.standardizer.config(),
            pca: *self.pca.config(),
        }
    }

    /// Replaces one stage's parameters. Takes effect on the next fit.
    pub fn set_params(&mut self, params: StageParams) {
        debug!("Pipeline set_params: {:?}", params);
        match params {
            StageParams::Normalize(config) => self.normalizer.set_config(config),
            StageParams::Standardize(config) => self.standardizer.set_config(config),
            StageParams::Pca(config) => self.pca.set_config(config),
        }
    }

    /// Shorthand for changing only the PCA component count.
    pub fn set_pca_components(&mut self, n_components: ComponentCount) {
        self.pca.set_n_components(n_components);
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn standardizer(&self) -> &StandardizeStep {
        &self.standardizer
    }

    pub fn pca(&self) -> &PcaStep {
        &self.pca
    }

    pub(crate) fn replace_pca(&mut self, pca: PcaStep) {
        self.pca = pca;
    }

    /// Fits all stages on `x` and returns its principal components.
    ///
    /// * `x` - Light curves as rows, shape (n_stars, n_phase_samples). Not modified.
    ///
    /// # Errors
    /// Propagates the first stage failure, e.g. a row with zero dynamic range
    /// or an out-of-range component count.
    pub fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let normalized = self.normalizer.fit_transform(x)?;
        let standardized = self.standardizer.fit_transform(normalized.view())?;
        let components = self.pca.fit_transform(standardized.view())?;
        info!(
            "Pipeline fitted on {}x{} light curves, {} components kept",
            x.nrows(),
            x.ncols(),
            components.ncols()
        );
        Ok(components)
    }

    /// Maps principal components back to magnitudes.
    pub fn inverse_transform(&self, components: ArrayView2<f64>) -> Result<Array2<f64>> {
        let standardized = self.pca.inverse_transform(components)?;
        let normalized = self.standardizer.inverse_transform(standardized.view())?;
        self.normalizer.inverse_transform(normalized.view())
    }
}

impl Transformer for Pipeline {
    fn fit(&mut self, x: ArrayView2<f64>) -> Result<()> {
        Pipeline::fit_transform(self, x).map(|_| ())
    }

    fn fit_transform(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        Pipeline::fit_transform(self, x)
    }

    fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let normalized = self.normalizer.transform(x)?;
        let standardized = self.standardizer.transform(normalized.view())?;
        self.pca.transform(standardized.view())
    }

    fn inverse_transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        Pipeline::inverse_transform(self, x)
    }
}
