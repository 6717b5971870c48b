//! Backend operators and operation dispatch.
//!
//! This module contains the three execution backends and the machinery
//! shared between them.
//!
//! ## Submodules
//!
//! - [`single`] — Single-threaded host loops.
//! - [`parallel`] — Multi-threaded host loops on the rayon pool.
//! - [`wgpu`] *(feature `wgpu`)* — GPU compute backend.
//! - [`shape`] — The one shape-validation routine every backend calls.
//! - [`dispatch`] — Routed entry points switched by the global backend.
//!
//! ## Contract
//!
//! All backends implement the same four operations with identical
//! observable semantics:
//!
//! - `add` / `subtract` require equal shapes and work elementwise.
//! - `multiply` requires `a.columns() == b.rows()` and computes plain
//!   row-by-column dot products, accumulated in row-major order per
//!   output cell on every backend.
//! - `transpose` maps `a[i, j]` to `result[j, i]`.
//!
//! Shape violations fail with [`ShapeError::Mismatch`] before any result
//! is allocated. The parallel backend partitions work by disjoint output
//! rows and keeps the per-cell accumulation order of the single-threaded
//! loops, so the two produce bit-identical results, floats included.

use crate::element::ElementOps;
use crate::error::ShapeError;
use crate::matrix::Matrix;

pub mod dispatch;
pub mod parallel;
pub mod shape;
pub mod single;
#[cfg(feature = "wgpu")]
pub mod wgpu;

/// The operation contract shared by the host backends.
///
/// The GPU backend exposes the same four operations over device-resident
/// matrices; see [`wgpu::GpuOperator`].
pub trait CpuOperator<T: ElementOps> {
    /// Adds two matrices elementwise, returning a new matrix.
    fn add(&self, a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>, ShapeError>;

    /// Subtracts `b` from `a` elementwise, returning a new matrix.
    fn subtract(&self, a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>, ShapeError>;

    /// Multiplies two matrices, returning a new `(a.rows, b.columns)` matrix.
    fn multiply(&self, a: &Matrix<T>, b: &Matrix<T>) -> Result<Matrix<T>, ShapeError>;

    /// Transposes a matrix, returning a new `(a.columns, a.rows)` matrix.
    fn transpose(&self, a: &Matrix<T>) -> Matrix<T>;
}
