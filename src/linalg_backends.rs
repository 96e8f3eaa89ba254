// src/linalg_backends.rs

use ndarray::{Array1, Array2};

use crate::error::{LightCurveError, Result};

/// Output of a symmetric eigendecomposition.
#[derive(Debug)]
pub struct EighOutput {
    /// Eigenvalues, sorted in ascending order.
    pub eigenvalues: Array1<f64>,
    /// Eigenvectors as columns of the matrix.
    /// eigenvectors.column(i) corresponds to eigenvalues[i].
    pub eigenvectors: Array2<f64>,
}

/// Trait for symmetric eigendecomposition.
/// Implementers read only the lower triangle of `matrix`.
pub trait BackendEigh {
    fn eigh_lower(&self, matrix: &Array2<f64>) -> Result<EighOutput>;
}

/// Output of a thin Singular Value Decomposition of an (m, n) matrix.
/// With k = min(m, n): `u` is (m, k), `s` has length k, `vt` is (k, n).
#[derive(Debug)]
pub struct SVDOutput {
    pub u: Array2<f64>,
    /// Singular values in non-increasing order.
    pub s: Array1<f64>,
    pub vt: Array2<f64>,
}

/// Trait for thin Singular Value Decomposition.
pub trait BackendSVD {
    fn thin_svd(&self, matrix: &Array2<f64>) -> Result<SVDOutput>;
}

/// Pure-Rust decomposition backend built on `faer`.
#[derive(Debug, Default, Copy, Clone)]
pub struct FaerLinAlgBackend;

fn faer_mat_to_ndarray(faer_mat: faer::MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((faer_mat.nrows(), faer_mat.ncols()), |(i, j)| {
        *faer_mat.get(i, j)
    })
}

fn faer_col_to_ndarray_vec(faer_col: faer::ColRef<'_, f64>) -> Array1<f64> {
    Array1::from_shape_fn(faer_col.nrows(), |i| *faer_col.get(i))
}

// faer::MatRef needs a contiguous slice; a standard-layout copy is made only
// when the input is not already C-contiguous.
fn with_faer_view<T>(
    matrix: &Array2<f64>,
    f: impl FnOnce(faer::MatRef<'_, f64>) -> Result<T>,
) -> Result<T> {
    let (nrows, ncols) = matrix.dim();
    let standard = matrix.as_standard_layout();
    let slice = standard.as_slice().ok_or_else(|| {
        LightCurveError::linalg(format!(
            "Failed to get slice from row-major ndarray matrix ({}x{})",
            nrows, ncols
        ))
    })?;
    f(faer::MatRef::from_row_major_slice(slice, nrows, ncols))
}

impl BackendEigh for FaerLinAlgBackend {
    fn eigh_lower(&self, matrix: &Array2<f64>) -> Result<EighOutput> {
        if matrix.nrows() != matrix.ncols() {
            return Err(LightCurveError::linalg(
                "Matrix must be square for eigendecomposition.",
            ));
        }
        if matrix.is_empty() {
            return Ok(EighOutput {
                eigenvalues: Array1::zeros(0),
                eigenvectors: Array2::zeros((0, 0)),
            });
        }
        with_faer_view(matrix, |view| {
            let eig = faer::linalg::solvers::SelfAdjointEigen::new(view, faer::Side::Lower)
                .map_err(|e| {
                    LightCurveError::linalg(format!("Faer eigendecomposition failed: {:?}", e))
                })?;
            Ok(EighOutput {
                eigenvalues: faer_col_to_ndarray_vec(eig.S().column_vector()),
                eigenvectors: faer_mat_to_ndarray(eig.U()),
            })
        })
    }
}

impl BackendSVD for FaerLinAlgBackend {
    fn thin_svd(&self, matrix: &Array2<f64>) -> Result<SVDOutput> {
        let (nrows, ncols) = matrix.dim();
        if matrix.is_empty() {
            let k_dim = nrows.min(ncols);
            return Ok(SVDOutput {
                u: Array2::zeros((nrows, k_dim)),
                s: Array1::zeros(k_dim),
                vt: Array2::zeros((k_dim, ncols)),
            });
        }
        with_faer_view(matrix, |view| {
            let svd = faer::linalg::solvers::Svd::new_thin(view).map_err(|e| {
                LightCurveError::linalg(format!("Faer SVD computation failed: {:?}", e))
            })?;
            let v = faer_mat_to_ndarray(svd.V());
            Ok(SVDOutput {
                u: faer_mat_to_ndarray(svd.U()),
                s: faer_col_to_ndarray_vec(svd.S().column_vector()),
                vt: v.t().into_owned(),
            })
        })
    }
}
