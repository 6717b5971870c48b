//! Shared shape validation.
//!
//! Every backend calls these routines before computing or allocating
//! anything, so shape failures look the same no matter which backend
//! raised them.

use crate::error::{OpKind, ShapeError};
use crate::matrix::Matrix;

/// Checks that `a` and `b` have identical shapes (elementwise ops).
pub fn check_same_shape<T>(op: OpKind, a: &Matrix<T>, b: &Matrix<T>) -> Result<(), ShapeError> {
    if a.rows() != b.rows() || a.columns() != b.columns() {
        return Err(mismatch(op, a, b));
    }
    Ok(())
}

/// Checks that `a.columns() == b.rows()` (matrix multiplication).
///
/// Multiplication does not require equal shapes, only a matching inner
/// dimension.
pub fn check_multipliable<T>(a: &Matrix<T>, b: &Matrix<T>) -> Result<(), ShapeError> {
    if a.columns() != b.rows() {
        return Err(mismatch(OpKind::Multiply, a, b));
    }
    Ok(())
}

fn mismatch<T>(op: OpKind, a: &Matrix<T>, b: &Matrix<T>) -> ShapeError {
    ShapeError::Mismatch {
        op,
        a_rows: a.rows(),
        a_cols: a.columns(),
        b_rows: b.rows(),
        b_cols: b.columns(),
    }
}
