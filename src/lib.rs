//! Principal component analysis of periodic variable-star light curves.
//!
//! Light curves (one star per row, magnitudes sampled over one pulsation
//! cycle) go through a three-stage [`Pipeline`]: per-row min/max
//! [`Normalizer`], per-column [`StandardizeStep`], and [`PcaStep`].
//! [`reconstruct`] then rebuilds every curve from a truncated number of
//! principal components, once per requested order.
//!
//! ```
//! use lightcurve_pca::{reconstruct, Pipeline, ReconstructionMode};
//! use ndarray::array;
//!
//! let x = array![[1.0, 2.0, 3.0, 4.0], [4.0, 3.0, 2.0, 1.0]];
//! let mut pipeline = Pipeline::default();
//! let out = reconstruct(&mut pipeline, x.view(), &[1, 2], ReconstructionMode::Refit).unwrap();
//! assert_eq!(out.components.dim(), (2, 2));
//! assert_eq!(out.eigenvectors.dim(), (2, 4));
//! assert_eq!(out.reconstructions.dim(), (2, 2, 4));
//! ```

pub mod error;
pub mod linalg_backends;
pub mod normalizer;
pub mod pca;
pub mod phase;
pub mod pipeline;
pub mod reconstruct;
pub mod report;
pub mod standardize;
pub mod table;
pub mod vector_ops;


pub use error::{LightCurveError, Result};
pub use normalizer::{Normalizer, NormalizerConfig, Shifter};
pub use pca::{ComponentCount, PcaConfig, PcaSolver, PcaStep};
pub use pipeline::{Pipeline, PipelineConfig, StageParams, Transformer};
pub use reconstruct::{
    reconstruct, reconstruction_errors, star_reconstruction_errors, Reconstruction,
    ReconstructionMode,
};
pub use standardize::{StandardizeConfig, StandardizeStep};
