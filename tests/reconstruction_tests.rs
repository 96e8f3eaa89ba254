use approx::assert_abs_diff_eq;
use lightcurve_pca::{
    reconstruct, reconstruction_errors, star_reconstruction_errors, ComponentCount, LightCurveError, PcaConfig, Pipeline,
    PipelineConfig, ReconstructionMode, StageParams, Transformer,
};
use ndarray::{s, Array2, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Synthetic pulsating-star light curves: a few Fourier harmonics with
/// star-dependent amplitudes and phases, plus a little noise.
fn synthetic_lightcurves(n_stars: usize, n_phases: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut curves = Array2::<f64>::zeros((n_stars, n_phases));
    for mut row in curves.rows_mut() {
        let mean_mag = rng.gen_range(10.0..16.0);
        let harmonics: Vec<(f64, f64)> = (1..=4)
            .map(|k| {
                (
                    rng.gen_range(0.05..0.5) / k as f64,
                    rng.gen_range(0.0..std::f64::consts::TAU),
                )
            })
            .collect();
        for (j, value) in row.iter_mut().enumerate() {
            let phase = j as f64 / n_phases as f64;
            let signal: f64 = harmonics
                .iter()
                .enumerate()
                .map(|(k, (amp, phi))| {
                    amp * (std::f64::consts::TAU * (k + 1) as f64 * phase + phi).sin()
                })
                .sum();
            *value = mean_mag + signal + rng.gen_range(-0.01..0.01);
        }
    }
    curves
}

#[test]
fn two_star_example() {
    let x = ndarray::array![[1.0, 2.0, 3.0, 4.0], [4.0, 3.0, 2.0, 1.0]];
    let mut pipeline = Pipeline::default();
    let out = reconstruct(&mut pipeline, x.view(), &[1, 2], ReconstructionMode::Refit).unwrap();

    assert_eq!(out.components.dim(), (2, 2));
    assert_eq!(out.eigenvectors.dim(), (2, 4));
    assert_eq!(out.reconstructions.dim(), (2, 2, 4));

    // Two anti-correlated curves are fully described by one component.
    for order in 0..2 {
        let slab = out.reconstructions.slice(s![.., order, ..]);
        for (a, b) in slab.iter().zip(x.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }
}

#[test]
fn order_axis_preserves_request_order() {
    let x = synthetic_lightcurves(30, 24, 1);
    let orders = [7, 1, 10, 3];
    let mut pipeline = Pipeline::default();
    let out = reconstruct(&mut pipeline, x.view(), &orders, ReconstructionMode::Refit).unwrap();
    assert_eq!(out.reconstructions.dim(), (30, 4, 24));

    for (i, &n) in orders.iter().enumerate() {
        let mut single = Pipeline::default();
        single.set_pca_components(ComponentCount::Fixed(n));
        let comps = single.fit_transform(x.view()).unwrap();
        let expected = single.inverse_transform(comps.view()).unwrap();
        let got = out.reconstructions.slice(s![.., i, ..]);
        for (a, b) in got.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }
}

#[test]
fn duplicate_orders_are_allowed() {
    let x = synthetic_lightcurves(12, 10, 2);
    let mut pipeline = Pipeline::default();
    let out = reconstruct(&mut pipeline, x.view(), &[2, 2], ReconstructionMode::Refit).unwrap();
    let a = out.reconstructions.slice(s![.., 0, ..]);
    let b = out.reconstructions.slice(s![.., 1, ..]);
    for (p, q) in a.iter().zip(b.iter()) {
        assert_abs_diff_eq!(*p, *q, epsilon = 1e-12);
    }
}

/// Maps raw magnitudes into the standardized space the PCA step works in.
fn standardized(pipeline: &Pipeline, x: ArrayView2<f64>) -> Array2<f64> {
    let normalized = pipeline.normalizer().transform(x).unwrap();
    pipeline.standardizer().transform(normalized.view()).unwrap()
}

#[test]
fn error_does_not_increase_with_order() {
    let x = synthetic_lightcurves(40, 32, 3);
    let orders: Vec<usize> = (1..=12).collect();
    let mut pipeline = Pipeline::default();
    let out = reconstruct(&mut pipeline, x.view(), &orders, ReconstructionMode::Refit).unwrap();

    let target = standardized(&pipeline, x.view());
    let mut in_pca_space = out.reconstructions.clone();
    for i in 0..orders.len() {
        let slab = standardized(&pipeline, out.reconstructions.slice(s![.., i, ..]));
        in_pca_space.slice_mut(s![.., i, ..]).assign(&slab);
    }
    let errors = reconstruction_errors(target.view(), &in_pca_space);

    for pair in errors.as_slice().unwrap().windows(2) {
        assert!(
            pair[1] <= pair[0] + 1e-9,
            "error increased from {} to {}",
            pair[0],
            pair[1]
        );
    }
}

#[test]
fn each_star_error_does_not_increase_with_order() {
    let orders: Vec<usize> = (1..=12).collect();
    for seed in 0..20 {
        let x = synthetic_lightcurves(15, 12, 100 + seed);
        let mut pipeline = Pipeline::default();
        let out = reconstruct(&mut pipeline, x.view(), &orders, ReconstructionMode::Refit).unwrap();

        let target = standardized(&pipeline, x.view());
        let mut in_pca_space = out.reconstructions.clone();
        for i in 0..orders.len() {
            let slab = standardized(&pipeline, out.reconstructions.slice(s![.., i, ..]));
            in_pca_space.slice_mut(s![.., i, ..]).assign(&slab);
        }
        let errors = star_reconstruction_errors(target.view(), &in_pca_space);
        assert_eq!(errors.dim(), (15, orders.len()));

        for (star, row) in errors.rows().into_iter().enumerate() {
            for j in 1..row.len() {
                assert!(
                    row[j] <= row[j - 1] + 1e-9,
                    "seed {} star {}: error increased from {} to {} at order {}",
                    seed,
                    star,
                    row[j - 1],
                    row[j],
                    orders[j]
                );
            }
        }
    }
}

#[test]
fn full_rank_reconstruction_reproduces_input() {
    let x = synthetic_lightcurves(8, 20, 4);
    let mut pipeline = Pipeline::default();
    let out = reconstruct(&mut pipeline, x.view(), &[8], ReconstructionMode::Refit).unwrap();
    for (a, b) in out.reconstructions.slice(s![.., 0, ..]).iter().zip(x.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-8);
    }
}

#[test]
fn invalid_orders_produce_no_output() {
    let x = synthetic_lightcurves(5, 6, 5);
    let mut pipeline = Pipeline::default();
    for orders in [vec![0], vec![1, 6], vec![3, 1, 0]] {
        let err = reconstruct(&mut pipeline, x.view(), &orders, ReconstructionMode::Refit)
            .unwrap_err();
        assert!(matches!(
            err,
            LightCurveError::InvalidComponentCount { max: 5, .. }
        ));
    }
    assert!(pipeline.pca().components().is_none());
}

#[test]
fn refit_and_truncate_modes_agree() {
    let x = synthetic_lightcurves(25, 16, 6);
    let orders = [1, 4, 2, 9];
    let mut a = Pipeline::default();
    let mut b = Pipeline::default();
    let refit = reconstruct(&mut a, x.view(), &orders, ReconstructionMode::Refit).unwrap();
    let truncate = reconstruct(&mut b, x.view(), &orders, ReconstructionMode::Truncate).unwrap();

    for (p, q) in refit.reconstructions.iter().zip(truncate.reconstructions.iter()) {
        assert_abs_diff_eq!(*p, *q, epsilon = 1e-8);
    }
}

#[test]
fn baseline_fit_and_config_are_restored() {
    let x = synthetic_lightcurves(20, 12, 7);
    let config = PipelineConfig {
        pca: PcaConfig::default().with_n_components(ComponentCount::Fixed(5)),
        ..PipelineConfig::default()
    };
    let mut pipeline = Pipeline::new(config);
    let out = reconstruct(&mut pipeline, x.view(), &[1, 2, 3], ReconstructionMode::Refit).unwrap();

    assert_eq!(pipeline.config(), config);
    assert_eq!(out.components.ncols(), 5);
    assert_eq!(out.eigenvectors.dim(), (5, 12));
    assert_eq!(pipeline.pca().components(), Some(&out.eigenvectors));
    assert_eq!(out.explained_variance.len(), 5);

    // The restored pipeline maps the baseline components back consistently.
    let again = pipeline.transform(x.view()).unwrap();
    for (p, q) in again.iter().zip(out.components.iter()) {
        assert_abs_diff_eq!(*p, *q, epsilon = 1e-9);
    }
}

#[test]
fn whitened_pipeline_reconstructs() {
    let x = synthetic_lightcurves(15, 10, 8);
    let mut pipeline = Pipeline::default();
    pipeline.set_params(StageParams::Pca(PcaConfig::default().with_whiten(true)));
    let out = reconstruct(&mut pipeline, x.view(), &[10], ReconstructionMode::Refit).unwrap();
    for (a, b) in out.reconstructions.slice(s![.., 0, ..]).iter().zip(x.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-8);
    }
}
