//! Single-threaded host backend.
//!
//! Plain nested loops over the operand data. This is the reference
//! backend: the parallel and GPU backends are required to reproduce its
//! results exactly for exact element types, and up to summation-order
//! tolerance for floating multiplication.

use crate::element::ElementOps;
use crate::error::{OpKind, ShapeError};
use crate::matrix::Matrix;
use crate::ops::{CpuOperator, shape};

/// Runs every operation on the calling thread.
///
/// # Example
///
/// ```rust
/// use densemat::matrix::Matrix;
/// use densemat::ops::CpuOperator;
/// use densemat::ops::single::SingleThreadedOperator;
///
/// let a = Matrix::from_rows(&[vec![1, 2], vec![3, 4]]).unwrap();
/// let t = SingleThreadedOperator.transpose(&a);
/// assert_eq!(t[(0, 1)], 3);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleThreadedOperator;

impl<T: ElementOps> CpuOperator<T> for SingleThreadedOperator {
    fn add(&self, a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>, ShapeError> {
        shape::check_same_shape(OpKind::Add, a, b)?;
        let data = a
            .as_slice()
            .iter()
            .zip(b.as_slice())
            .map(|(&x, &y)| x.add(y))
            .collect();
        Ok(Matrix::from_raw(a.rows(), a.columns(), data))
    }

    fn subtract(&self, a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>, ShapeError> {
        shape::check_same_shape(OpKind::Subtract, a, b)?;
        let data = a
            .as_slice()
            .iter()
            .zip(b.as_slice())
            .map(|(&x, &y)| x.sub(y))
            .collect();
        Ok(Matrix::from_raw(a.rows(), a.columns(), data))
    }

    fn multiply(&self, a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>, ShapeError> {
        shape::check_multipliable(a, b)?;
        let (rows, inner, cols) = (a.rows(), a.columns(), b.columns());
        if inner == 0 {
            // Dot products over an empty inner dimension have no terms.
            return Ok(Matrix::from_raw(rows, cols, vec![T::default(); rows * cols]));
        }
        let lhs = a.as_slice();
        let rhs = b.as_slice();
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                // Seed from the first term so T needs no additive identity.
                let mut sum = lhs[i * inner].mul(rhs[j]);
                for k in 1..inner {
                    sum = sum.add(lhs[i * inner + k].mul(rhs[k * cols + j]));
                }
                data.push(sum);
            }
        }
        Ok(Matrix::from_raw(rows, cols, data))
    }

    fn transpose(&self, a: &Matrix<T>) -> Matrix<T> {
        let (rows, cols) = (a.rows(), a.columns());
        let src = a.as_slice();
        let mut data = Vec::with_capacity(src.len());
        for j in 0..cols {
            for i in 0..rows {
                data.push(src[i * cols + j]);
            }
        }
        Matrix::from_raw(cols, rows, data)
    }
}
