//! Multi-threaded host backend.
//!
//! The same loops as [`crate::ops::single`], with the outer row loop
//! handed to the rayon pool. Output rows are disjoint slices handed out by
//! `par_chunks_mut`, so the parallel region shares no mutable state and
//! needs no locks. Per-cell accumulation order is unchanged from the
//! single-threaded loops, so results are bit-identical for the same
//! inputs, floating point included.

use rayon::prelude::*;

use crate::element::ElementOps;
use crate::error::{OpKind, ShapeError};
use crate::matrix::Matrix;
use crate::ops::{CpuOperator, shape};

/// Runs every operation across the rayon worker pool, partitioned by
/// output row.
///
/// Worth reaching for on large matrices; for small ones the pool overhead
/// can outweigh the loop itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelOperator;

impl<T: ElementOps + Send + Sync> CpuOperator<T> for ParallelOperator {
    fn add(&self, a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>, ShapeError> {
        shape::check_same_shape(OpKind::Add, a, b)?;
        Ok(elementwise(a, b, |x, y| x.add(y)))
    }

    fn subtract(&self, a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>, ShapeError> {
        shape::check_same_shape(OpKind::Subtract, a, b)?;
        Ok(elementwise(a, b, |x, y| x.sub(y)))
    }

    fn multiply(&self, a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>, ShapeError> {
        shape::check_multipliable(a, b)?;
        let (rows, inner, cols) = (a.rows(), a.columns(), b.columns());
        if rows == 0 || cols == 0 {
            return Ok(Matrix::from_raw(rows, cols, Vec::new()));
        }
        if inner == 0 {
            return Ok(Matrix::from_raw(rows, cols, vec![T::default(); rows * cols]));
        }
        let lhs = a.as_slice();
        let rhs = b.as_slice();
        let mut data = vec![T::default(); rows * cols];
        data.par_chunks_mut(cols).enumerate().for_each(|(i, row)| {
            for (j, cell) in row.iter_mut().enumerate() {
                let mut sum = lhs[i * inner].mul(rhs[j]);
                for k in 1..inner {
                    sum = sum.add(lhs[i * inner + k].mul(rhs[k * cols + j]));
                }
                *cell = sum;
            }
        });
        Ok(Matrix::from_raw(rows, cols, data))
    }

    fn transpose(&self, a: &Matrix<T>) -> Matrix<T> {
        let (rows, cols) = (a.rows(), a.columns());
        if rows == 0 || cols == 0 {
            return Matrix::from_raw(cols, rows, Vec::new());
        }
        let src = a.as_slice();
        let mut data = vec![T::default(); src.len()];
        // Each output row j is column j of the source.
        data.par_chunks_mut(rows).enumerate().for_each(|(j, row)| {
            for (i, cell) in row.iter_mut().enumerate() {
                *cell = src[i * cols + j];
            }
        });
        Matrix::from_raw(cols, rows, data)
    }
}

fn elementwise<T, F>(a: &Matrix<T>, b: &Matrix<T>, op: F) -> Matrix<T>
where
    T: ElementOps + Send + Sync,
    F: Fn(T, T) -> T + Send + Sync,
{
    let (rows, cols) = (a.rows(), a.columns());
    if rows == 0 || cols == 0 {
        return Matrix::from_raw(rows, cols, Vec::new());
    }
    let lhs = a.as_slice();
    let rhs = b.as_slice();
    let mut data = vec![T::default(); lhs.len()];
    data.par_chunks_mut(cols).enumerate().for_each(|(i, row)| {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = op(lhs[i * cols + j], rhs[i * cols + j]);
        }
    });
    Matrix::from_raw(rows, cols, data)
}
