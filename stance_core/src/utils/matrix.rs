// stance_core/src/utils/matrix.rs

use nalgebra::{DMatrix, DVector, Matrix3};

/// Relative tolerance used when checking symmetry of caller-supplied matrices.
pub const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Replaces `m` with `(m + m^T) / 2`.
pub fn symmetrize(m: &mut DMatrix<f64>) {
    let transposed = m.transpose();
    *m += transposed;
    *m *= 0.5;
}

pub fn all_finite_matrix(m: &DMatrix<f64>) -> bool {
    m.iter().all(|v| v.is_finite())
}

pub fn all_finite_vector(v: &DVector<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// True when `m` is square and `||m - m^T||_max` is within tolerance relative
/// to its largest entry.
pub fn is_symmetric(m: &DMatrix<f64>) -> bool {
    if m.nrows() != m.ncols() {
        return false;
    }
    let scale = m.amax().max(1.0);
    (m - m.transpose()).amax() <= SYMMETRY_TOLERANCE * scale
}

/// True when `m + eps I` has a Cholesky factor, with `eps` scaled by the
/// largest entry. Admits singular covariances, rejects indefinite ones.
pub fn is_positive_semidefinite(m: &DMatrix<f64>) -> bool {
    if m.nrows() != m.ncols() {
        return false;
    }
    let n = m.nrows();
    let eps = SYMMETRY_TOLERANCE * m.amax().max(1.0);
    let mut shifted = m + DMatrix::identity(n, n) * eps;
    symmetrize(&mut shifted);
    shifted.cholesky().is_some()
}

/// True when the 3x3 matrix is finite, symmetric and has a Cholesky factor.
pub fn is_positive_definite3(m: &Matrix3<f64>) -> bool {
    if m.iter().any(|v| !v.is_finite()) {
        return false;
    }
    let scale = m.amax().max(f64::MIN_POSITIVE);
    if (m - m.transpose()).amax() > SYMMETRY_TOLERANCE * scale {
        return false;
    }
    m.cholesky().is_some()
}

/// Copies `block` into `target` with its top-left corner at `(row, col)`.
pub fn set_block3(target: &mut DMatrix<f64>, row: usize, col: usize, block: &Matrix3<f64>) {
    target.fixed_view_mut::<3, 3>(row, col).copy_from(block);
}

/// Adds `block` into `target` with its top-left corner at `(row, col)`.
pub fn add_block3(target: &mut DMatrix<f64>, row: usize, col: usize, block: &Matrix3<f64>) {
    let mut view = target.fixed_view_mut::<3, 3>(row, col);
    view += block;
}
