// Column/row vector reshaping helpers

use ndarray::{Array2, ArrayBase, Data, Ix1};

/// Reshapes a 1-D array into a column vector of shape (n, 1).
///
/// Used to broadcast per-row statistics against an (n, m) matrix.
pub fn colvec<S>(values: &ArrayBase<S, Ix1>) -> Array2<f64>
where
    S: Data<Elem = f64>,
{
    values.to_owned().insert_axis(ndarray::Axis(1))
}

/// Reshapes a 1-D array into a row vector of shape (1, n).
pub fn rowvec<S>(values: &ArrayBase<S, Ix1>) -> Array2<f64>
where
    S: Data<Elem = f64>,
{
    values.to_owned().insert_axis(ndarray::Axis(0))
}
